//! Forgiving `Date` header parsing.
//!
//! Accepts the loose form `[Day,] D Mon YYYY HH:MM[:SS] [+-HHMM]` that phone
//! gateways and old clients emit. Anything chrono's strict RFC 2822 parser
//! would reject for a cosmetic reason (missing seconds, bogus zone) still
//! yields a timestamp here.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tracing::warn;

use crate::model::message::MessageHeaders;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Timestamp of a message, from its `Date` header.
///
/// A missing or empty header means "now". A header that cannot be read at
/// all also falls back to now, with a warning.
pub fn message_date(headers: &MessageHeaders) -> DateTime<Utc> {
    message_date_at(headers, Utc::now())
}

/// [`message_date`] with an explicit clock.
pub fn message_date_at(headers: &MessageHeaders, now: DateTime<Utc>) -> DateTime<Utc> {
    let raw = headers.date().trim();
    if raw.is_empty() {
        return now;
    }
    parse_date(raw).unwrap_or_else(|| {
        warn!(date = raw, "Could not parse Date header, using current time");
        now
    })
}

/// Parse a `Date` value to UTC.
///
/// `"Fri, 27 Mar 2015 01:40:04 +0000"` is epoch `1427420404`. Seconds default
/// to 0, a missing or malformed zone offset counts as `+0000`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    // Drop the weekday: everything up to the first comma.
    let value = match value.split_once(',') {
        Some((_, rest)) => rest,
        None => value,
    };

    let mut pieces = value.split_whitespace();
    let day: u32 = pieces.next()?.parse().ok()?;
    let month = month_number(pieces.next()?)?;
    let year = full_year(pieces.next()?.parse().ok()?);
    let (hour, minute, second) = parse_time(pieces.next().unwrap_or("0:0"))?;
    let offset = pieces.next().map(parse_offset).unwrap_or(0);

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    // Dates at the edge of the representable range overflow once shifted.
    naive.and_utc().checked_sub_signed(TimeDelta::seconds(offset))
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_ascii_lowercase();
    let abbrev = name.get(..3)?;
    MONTHS
        .iter()
        .position(|m| *m == abbrev)
        .and_then(|i| u32::try_from(i + 1).ok())
}

/// Two-digit years: `00`-`69` are 2000s, `70`-`99` 1900s.
fn full_year(year: i32) -> i32 {
    match year {
        0..=69 => year + 2000,
        70..=99 => year + 1900,
        _ => year,
    }
}

fn parse_time(time: &str) -> Option<(u32, u32, u32)> {
    let mut parts = time.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next().unwrap_or("0").parse().ok()?;
    let second = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    Some((hour, minute, second))
}

/// `+HHMM` / `-HHMM` to signed seconds east of UTC. Anything else is 0.
fn parse_offset(zone: &str) -> i64 {
    let (sign, digits) = match zone.as_bytes().first() {
        Some(b'+') => (1, &zone[1..]),
        Some(b'-') => (-1, &zone[1..]),
        _ => return 0,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    let hours: i64 = digits[..2].parse().unwrap_or(0);
    let minutes: i64 = digits[2..].parse().unwrap_or(0);
    sign * (hours * 3600 + minutes * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(value: &str) -> i64 {
        parse_date(value).map(|d| d.timestamp()).unwrap_or(-1)
    }

    #[test]
    fn test_parse_date_full() {
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04 +0000"), 1427420404);
    }

    #[test]
    fn test_parse_date_without_weekday() {
        assert_eq!(epoch("27 Mar 2015 01:40:04 +0000"), 1427420404);
    }

    #[test]
    fn test_parse_date_without_seconds() {
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40 +0000"), 1427420400);
    }

    #[test]
    fn test_parse_date_without_zone() {
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04"), 1427420404);
    }

    #[test]
    fn test_parse_date_offset_subtracted() {
        // 01:40:04 at UTC+2 is 23:40:04 UTC the day before.
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04 +0200"), 1427420404 - 7200);
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04 -0530"), 1427420404 + 19800);
    }

    #[test]
    fn test_malformed_offset_is_zero() {
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04 GMT"), 1427420404);
        assert_eq!(epoch("Fri, 27 Mar 2015 01:40:04 +02"), 1427420404);
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(epoch("27 Mar 15 01:40:04 +0000"), 1427420404);
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_date("yesterday afternoon").is_none());
        assert!(parse_date("31 Feb 2015 00:00:00").is_none());
    }

    #[test]
    fn test_empty_header_is_now() {
        let now = Utc::now();
        let headers = MessageHeaders::default();
        assert_eq!(message_date_at(&headers, now), now);
    }

    #[test]
    fn test_header_value_used() {
        let headers = MessageHeaders::from_pairs([("Date", "Fri, 27 Mar 2015 01:40:04 +0000")]);
        assert_eq!(message_date(&headers).timestamp(), 1427420404);
    }

    #[test]
    fn test_out_of_range_shift_is_none() {
        assert!(parse_date("31 Dec 262142 23:59:59 -2359").is_none());
        assert!(parse_date("1 Jan -262143 00:00:00 +2359").is_none());
    }

    #[test]
    fn test_out_of_range_header_falls_back_to_now() {
        let now = Utc::now();
        let headers = MessageHeaders::from_pairs([("Date", "1 Jan -262143 00:00:00 +2359")]);
        assert_eq!(message_date_at(&headers, now), now);
    }
}

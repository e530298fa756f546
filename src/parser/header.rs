//! RFC 5322 header block handling: splitting, unfolding and RFC 2047
//! encoded-word decoding, plus the transfer-encoding decoders shared with
//! the body path.

use tracing::warn;

use crate::model::message::MessageHeaders;

/// Split a raw message into its header block and its body.
///
/// The separator (`\n\n` or `\r\n\r\n`) belongs to neither half. A message
/// without a blank line is all headers.
pub fn split_message(raw: &[u8]) -> (&[u8], &[u8]) {
    let raw = strip_bom(raw);
    for (i, window) in raw.windows(2).enumerate() {
        if window == b"\n\n" {
            return (&raw[..i], &raw[i + 2..]);
        }
        if window == b"\r\n" && raw[i + 2..].starts_with(b"\r\n") {
            return (&raw[..i], &raw[i + 4..]);
        }
    }
    (raw, &[])
}

/// Parse a header block into decoded [`MessageHeaders`].
///
/// Folded lines are joined and encoded-words in every value are resolved.
/// Bytes that are not UTF-8 are read as Windows-1252.
pub fn parse_headers(raw: &[u8]) -> MessageHeaders {
    let text = header_text(raw);
    MessageHeaders::from_pairs(
        unfold_headers(&text)
            .into_iter()
            .map(|(name, value)| (name, decode_encoded_words(&value))),
    )
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn header_text(bytes: &[u8]) -> String {
    let bytes = strip_bom(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join continuation lines onto the header they continue.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = out.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            out.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    out
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` becomes `"Hola mundo"`.
/// Tokens that fail to decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let gap = &rest[..start];
        // Whitespace between two adjacent encoded-words is dropped (§6.2).
        if !after_word || !gap.trim().is_empty() {
            out.push_str(gap);
        }

        match decode_word(&rest[start + 2..]) {
            Some((text, used)) => {
                out.push_str(&text);
                rest = &rest[start + 2 + used..];
                after_word = true;
            }
            None => {
                out.push_str("=?");
                rest = &rest[start + 2..];
                after_word = false;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode one `charset?enc?text?=` word (the leading `=?` already consumed).
/// Returns the text and the number of bytes used.
fn decode_word(s: &str) -> Option<(String, usize)> {
    let mut fields = s.splitn(3, '?');
    let charset = fields.next()?;
    let encoding = fields.next()?;
    let tail = fields.next()?;
    let end = tail.find("?=")?;
    let payload = &tail[..end];

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()),
        "Q" | "q" => decode_q(payload),
        _ => return None,
    };

    // RFC 2231 language suffix: `utf-8*en`.
    let charset = charset.split('*').next().unwrap_or(charset);
    let used = charset_len(s) + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), used))
}

fn charset_len(s: &str) -> usize {
    s.find('?').unwrap_or(s.len())
}

/// Q encoding: `_` is a space, `=XX` a byte.
fn decode_q(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => match hex_pair(bytes.get(i + 1..i + 3)) {
                Some(b) => {
                    out.push(b);
                    i += 3;
                }
                None => {
                    out.push(b'=');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

fn hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    let s = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(s, 16).ok()
}

/// Decode base64, skipping whitespace and stopping at the first `=`.
///
/// Characters outside the alphabet are ignored, matching what mail clients
/// do with line noise in long attachment bodies.
pub fn decode_base64(input: &[u8]) -> Vec<u8> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' | b'-' => Some(62),
            b'/' | b'_' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &c in input {
        if c == b'=' {
            break;
        }
        let Some(v) = value(c) else { continue };
        acc = (acc << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    out
}

/// Decode a quoted-printable body (RFC 2045 §6.7).
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }
        // Soft line break.
        if input[i + 1..].starts_with(b"\r\n") {
            i += 3;
        } else if input[i + 1..].starts_with(b"\n") {
            i += 2;
        } else if let Some(b) = hex_pair(input.get(i + 1..i + 3)) {
            out.push(b);
            i += 3;
        } else {
            out.push(b'=');
            i += 1;
        }
    }
    out
}

/// Decode bytes in a named charset to UTF-8.
///
/// ISO-8859-1 is reinterpreted byte for byte (each byte is its own code
/// point); everything else goes through `encoding_rs`. Unknown labels fall
/// back to lossy UTF-8.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let label = charset.trim().trim_matches('"').to_ascii_lowercase();
    match label.as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => {
            bytes.iter().map(|&b| char::from(b)).collect()
        }
        _ => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            }
            None => {
                warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}

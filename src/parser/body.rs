//! Body normalization and the text transformations applied before a body
//! becomes post content.

use std::sync::OnceLock;

use regex::Regex;

use super::header::{decode_base64, decode_charset, decode_quoted_printable};
use crate::model::message::MessageBody;

/// Separates a phone-sent title from its payload.
pub const PHONE_DELIMITER: &str = "::";

/// Inline tags that survive body stripping.
pub const ALLOWED_TAGS: [&str; 14] = [
    "img", "p", "br", "i", "b", "u", "em", "strong", "strike", "font", "span", "div", "style", "a",
];

/// Turn a raw body part into a [`MessageBody`].
///
/// Undoes the transfer encoding (when `transfer_encoding` is given), converts
/// from `charset` to UTF-8, strips tags outside [`ALLOWED_TAGS`] and trims.
pub fn normalize_body(raw: &[u8], transfer_encoding: Option<&str>, charset: &str) -> MessageBody {
    let decoded = decode_transfer(raw, transfer_encoding);
    finish_text(&decode_charset(charset, &decoded), charset)
}

/// Build a [`MessageBody`] from text that is already UTF-8.
pub fn finish_text(text: &str, charset: &str) -> MessageBody {
    MessageBody {
        content: strip_tags(text).trim().to_string(),
        charset: if charset.is_empty() {
            "utf-8".to_string()
        } else {
            charset.to_ascii_lowercase()
        },
    }
}

/// Undo a `Content-Transfer-Encoding`. Identity encodings pass through.
pub fn decode_transfer(raw: &[u8], encoding: Option<&str>) -> Vec<u8> {
    match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
        Some("base64") => decode_base64(raw),
        Some("quoted-printable") => decode_quoted_printable(raw),
        _ => raw.to_vec(),
    }
}

/// Remove every tag whose name is not in [`ALLOWED_TAGS`].
///
/// Text between tags is kept; `<script>` blocks and comments go entirely.
pub fn strip_tags(html: &str) -> String {
    let html = remove_script_blocks(html);
    let mut out = String::with_capacity(html.len());
    let mut rest = html.as_str();

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        if let Some(after) = tail.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }

        let Some(close) = tail.find('>') else {
            // Unterminated tag: the rest is markup.
            rest = "";
            break;
        };
        let tag = &tail[..=close];
        if is_allowed(tag) {
            out.push_str(tag);
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

fn is_allowed(tag: &str) -> bool {
    let name: String = tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    ALLOWED_TAGS.contains(&name.as_str())
}

fn remove_script_blocks(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find("<script").map(|i| i + pos) {
        out.push_str(&html[pos..start]);
        match lower[start..].find("</script>") {
            Some(end) => pos = start + end + "</script>".len(),
            None => return out,
        }
    }

    out.push_str(&html[pos..]);
    out
}

/// The part of a subject before the first [`PHONE_DELIMITER`], trimmed.
pub fn split_subject(subject: &str) -> &str {
    subject
        .split(PHONE_DELIMITER)
        .next()
        .unwrap_or_default()
        .trim()
}

/// The payload of a body: the segment after the first [`PHONE_DELIMITER`]
/// when it is non-empty, else the whole text. Trimmed either way.
///
/// A second delimiter ends the payload, so `"title::body::signature"` gives
/// `"body"`.
pub fn split_body(content: &str) -> &str {
    match content.split(PHONE_DELIMITER).nth(1) {
        Some(payload) if !payload.is_empty() => payload.trim(),
        _ => content.trim(),
    }
}

/// Turn the HTML apostrophe and quote entities back into characters so
/// quoted shortcode arguments survive.
pub fn unescape_quotes(content: &str) -> String {
    content.replace("&#39;", "'").replace("&quot;", "\"")
}

/// A title embedded in the body as `<title>...</title>`, if any.
pub fn derive_title(content: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let pattern =
        TITLE.get_or_init(|| Regex::new(r"(?is)<title>(.+?)</title>").expect("valid title regex"));
    pattern
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_keeps_allowed() {
        let html = "<html><body><p>Hi <b>there</b><br/><table><tr><td>x</td></tr></table></p></body></html>";
        assert_eq!(strip_tags(html), "<p>Hi <b>there</b><br/>x</p>");
    }

    #[test]
    fn test_strip_tags_drops_scripts_and_comments() {
        let html = "a<script type=\"x\">alert(1)</script>b<!-- note -->c";
        assert_eq!(strip_tags(html), "abc");
    }

    #[test]
    fn test_strip_tags_keeps_attributes() {
        let html = "<a href=\"http://example.com\">link</a><IMG src=\"x.png\">";
        assert_eq!(strip_tags(html), html);
    }

    #[test]
    fn test_normalize_body_quoted_printable_latin1() {
        let body = normalize_body(b"  caf=E9\r\n", Some("quoted-printable"), "ISO-8859-1");
        assert_eq!(body.content, "café");
        assert_eq!(body.charset, "iso-8859-1");
    }

    #[test]
    fn test_normalize_body_base64() {
        let body = normalize_body(b"PHA+SGVsbG88L3A+", Some("base64"), "");
        assert_eq!(body.content, "<p>Hello</p>");
        assert_eq!(body.charset, "utf-8");
    }

    #[test]
    fn test_split_subject() {
        assert_eq!(split_subject("Hello::ignored"), "Hello");
        assert_eq!(split_subject(" Plain subject "), "Plain subject");
    }

    #[test]
    fn test_split_body() {
        assert_eq!(
            split_body("Hello::Post body here [category news]"),
            "Post body here [category news]"
        );
        assert_eq!(split_body("title::body::signature"), "body");
        assert_eq!(split_body("no delimiter"), "no delimiter");
        assert_eq!(split_body("trailing::"), "trailing::");
    }

    #[test]
    fn test_unescape_quotes() {
        assert_eq!(unescape_quotes("[tag &quot;a b&quot; it&#39;s]"), "[tag \"a b\" it's]");
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(
            derive_title("<title>My Trip</title>Photos").as_deref(),
            Some("My Trip")
        );
        assert_eq!(derive_title("Just a body"), None);
    }
}

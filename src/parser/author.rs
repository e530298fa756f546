//! Sender address extraction from the `From` header.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::address::{is_email, sanitize_email};
use crate::model::message::MessageHeaders;

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9_.\-]+@[A-Za-z0-9_.\-]+").expect("valid address regex")
    })
}

/// The sender's address, or `None` when `From` holds nothing usable.
///
/// `"Jane Doe <jane@example.com>"` and `"jane@example.com"` both give
/// `jane@example.com`. A candidate that still has a `<` after it sits inside
/// a display name (`"a@b.com <c@d.com>"`) and is passed over for the next one.
pub fn parse_author(headers: &MessageHeaders) -> Option<String> {
    let from = headers.from();
    let found = address_pattern()
        .find_iter(from)
        .find(|m| !from[m.end()..].contains('<'))?;

    let address = sanitize_email(found.as_str());
    is_email(&address).then_some(address)
}

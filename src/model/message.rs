//! Message identifiers, headers and bodies as handed out by a mailserver.

use std::fmt;

/// Server-assigned message identifier.
///
/// An IMAP UID or a POP3 sequence number; only meaningful within the
/// session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decoded message headers.
///
/// Names are matched case-insensitively. Values have RFC 2047 encoded-words
/// resolved but are otherwise raw: `From` still carries the display name and
/// `Date` is unparsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    /// `(lowercase_name, value)` pairs in message order.
    entries: Vec<(String, String)>,
}

impl MessageHeaders {
    /// Build from `(name, value)` pairs. Names are lowercased.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(n, v)| (n.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    /// First value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `Subject` header, empty when absent.
    pub fn subject(&self) -> &str {
        self.get("subject").unwrap_or_default()
    }

    /// The `From` header, empty when absent.
    pub fn from(&self) -> &str {
        self.get("from").unwrap_or_default()
    }

    /// The `Date` header, empty when absent.
    pub fn date(&self) -> &str {
        self.get("date").unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The body chosen to become the post content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    /// UTF-8 text, transfer encoding removed, tags outside the allow-list stripped.
    pub content: String,

    /// Charset the part declared (`"utf-8"` when it declared none).
    pub charset: String,
}

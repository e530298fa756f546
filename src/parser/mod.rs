//! Message parsing: header decoding, dates, sender addresses, body text and
//! MIME structure.

pub mod author;
pub mod body;
pub mod date;
pub mod header;
pub mod mime;

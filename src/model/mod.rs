//! Core data model: message ids, headers, attachments, posts and log entries.

pub mod address;
pub mod attachment;
pub mod log;
pub mod message;
pub mod post;

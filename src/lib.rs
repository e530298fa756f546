//! `mailpost`: turn the messages of an IMAP or POP3 mailbox into blog posts.
//!
//! This crate provides the mail-to-post pipeline: mailbox access over both
//! protocols, MIME parsing, shortcode extraction, post assembly and the
//! check cycle that ties them together.

pub mod check;
pub mod config;
pub mod error;
pub mod i18n;
pub mod mailserver;
pub mod model;
pub mod parser;
pub mod post;
pub mod shortcode;
pub mod site;

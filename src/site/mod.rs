//! The site a mailbox posts to.
//!
//! The check loop only talks to these traits. [`local`] implements all of
//! them on top of JSON files in the data directory.

pub mod local;

use std::path::Path;

use crate::error::Result;
use crate::model::log::{CheckState, LogEntry};
use crate::model::post::{AttachmentId, PostDraft, PostId, UserId};

/// A registered site user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// May publish posts without review.
    Publish,
}

pub trait UserDirectory {
    /// Exact, case-insensitive address match.
    fn lookup_by_email(&self, email: &str) -> Option<User>;
    fn has_capability(&self, user: &User, capability: Capability) -> bool;
    /// Author of posts from unknown senders.
    fn admin_user_id(&self) -> UserId;
}

pub trait PostStore {
    /// Create a post. Fails with [`crate::error::MailpostError::Validation`]
    /// when the store refuses it.
    fn insert_post(&mut self, draft: &PostDraft) -> Result<PostId>;
    fn post_content(&self, id: PostId) -> Result<String>;
    fn update_post_content(&mut self, id: PostId, content: &str) -> Result<()>;
    fn set_featured_image(&mut self, id: PostId, attachment: AttachmentId) -> Result<()>;
    fn set_terms(&mut self, id: PostId, taxonomy: &str, terms: &[String]) -> Result<()>;
    fn set_post_format(&mut self, id: PostId, format: &str) -> Result<()>;
    fn add_meta(&mut self, id: PostId, key: &str, value: &str) -> Result<()>;
}

pub trait MediaStore {
    /// Take ownership of the file at `source` as an attachment of `parent`.
    fn import_file(
        &mut self,
        source: &Path,
        filename: &str,
        mime_type: &str,
        parent: PostId,
    ) -> Result<AttachmentId>;
}

pub trait TaxonomyRegistry {
    fn resolve_category_by_slug(&self, slug: &str) -> Option<u64>;
    fn create_category(&mut self, name: &str) -> Result<u64>;
    /// Public custom taxonomies; each doubles as a shortcode name.
    fn registered_taxonomies(&self) -> Vec<String>;
}

/// Sends reply mails to senders.
pub trait Notifier {
    fn send_reply(&mut self, to: &str, subject: &str, html_body: &str, success: bool) -> Result<()>;
}

/// Cycle log and check state persistence.
pub trait StateStore {
    /// Prepend an entry; the log is newest first.
    fn append_log(&mut self, entry: LogEntry) -> Result<()>;
    fn log(&self) -> Result<Vec<LogEntry>>;
    fn state(&self) -> Result<CheckState>;
    fn save_state(&mut self, state: &CheckState) -> Result<()>;
}

/// Every collaborator of one site.
pub struct Site {
    pub users: Box<dyn UserDirectory>,
    pub posts: Box<dyn PostStore>,
    pub media: Box<dyn MediaStore>,
    pub taxonomies: Box<dyn TaxonomyRegistry>,
    /// `None` disables reply mails regardless of configuration.
    pub notifier: Option<Box<dyn Notifier>>,
    pub state: Box<dyn StateStore>,
}

//! The post record assembled from one message.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a created post.
pub type PostId = u64;
/// Identifier of an imported media file.
pub type AttachmentId = u64;
/// Identifier of a site user.
pub type UserId = u64;

/// Publication status of a new post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Pending,
    Draft,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Pending => "pending",
            Self::Draft => "draft",
        }
    }
}

/// Terms of one custom taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTerms {
    pub taxonomy: String,
    pub terms: Vec<String>,
}

/// A post ready to be handed to the post store.
///
/// Built once per message; afterwards only taxonomy terms and the gallery
/// marker for imported attachments are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    /// Message date in the site timezone.
    pub date_local: NaiveDateTime,
    pub date_utc: DateTime<Utc>,
    pub author_id: UserId,
    pub category_ids: Vec<u64>,
    pub tag_names: Vec<String>,
    pub status: PostStatus,
    /// From the `[post-format ...]` shortcode.
    pub post_format: Option<String>,
    /// From shortcodes named after registered custom taxonomies.
    pub taxonomy_terms: Vec<TaxonomyTerms>,
}

//! File-backed site.
//!
//! Layout under the data directory:
//!
//! ```text
//! posts.json        created posts
//! categories.json   category id/name/slug table
//! media/            imported attachment files
//! media.json        attachment records
//! outbox.jsonl      reply mails, one JSON object per line
//! log.json          cycle log, newest first
//! state.json        status, last check, rate-limit lease
//! ```
//!
//! Users and custom taxonomies come from the configuration file.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    Capability, MediaStore, Notifier, PostStore, Site, StateStore, TaxonomyRegistry, User,
    UserDirectory,
};
use crate::config::SiteConfig;
use crate::error::{MailpostError, Result};
use crate::model::log::{CheckState, LogEntry};
use crate::model::post::{AttachmentId, PostDraft, PostId, UserId};

/// Entries kept in `log.json`.
const LOG_LIMIT: usize = 200;

/// Build a [`Site`] over `data_dir`, creating the directory if needed.
pub fn open_site(site: &SiteConfig, data_dir: &Path) -> Result<Site> {
    std::fs::create_dir_all(data_dir).map_err(|e| MailpostError::io(data_dir, e))?;
    Ok(Site {
        users: Box::new(ConfigUsers::new(site)),
        posts: Box::new(LocalPosts::new(data_dir)),
        media: Box::new(LocalMedia::new(data_dir)),
        taxonomies: Box::new(LocalTaxonomies::new(data_dir, site.taxonomies.clone())),
        notifier: Some(Box::new(OutboxNotifier::new(data_dir))),
        state: Box::new(LocalState::new(data_dir)),
    })
}

// ── JSON files ──────────────────────────────────────────────────

/// Read a JSON file, or the default value when it does not exist yet.
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(MailpostError::io(path, e)),
    };
    serde_json::from_str(&text).map_err(|e| MailpostError::DataFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Replace a JSON file atomically: write a sibling temp file, then rename.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| MailpostError::io(dir, e))?;

    let json = serde_json::to_vec_pretty(value).map_err(|e| MailpostError::DataFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| MailpostError::io(dir, e))?;
    tmp.write_all(&json).map_err(|e| MailpostError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| MailpostError::io(path, e.error))?;
    Ok(())
}

// ── Users ───────────────────────────────────────────────────────

/// Users listed in the configuration file.
pub struct ConfigUsers {
    users: Vec<crate::config::UserConfig>,
}

impl ConfigUsers {
    pub fn new(site: &SiteConfig) -> Self {
        Self {
            users: site.users.clone(),
        }
    }
}

impl UserDirectory for ConfigUsers {
    fn lookup_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.trim().eq_ignore_ascii_case(email.trim()))
            .map(|u| User {
                id: u.id,
                email: u.email.clone(),
            })
    }

    fn has_capability(&self, user: &User, capability: Capability) -> bool {
        let Some(entry) = self.users.iter().find(|u| u.id == user.id) else {
            return false;
        };
        match capability {
            Capability::Publish => entry.can_publish || entry.admin,
        }
    }

    /// The first user flagged `admin`, else the lowest id, else 1.
    fn admin_user_id(&self) -> UserId {
        self.users
            .iter()
            .find(|u| u.admin)
            .or_else(|| self.users.iter().min_by_key(|u| u.id))
            .map_or(1, |u| u.id)
    }
}

// ── Posts ───────────────────────────────────────────────────────

/// A post as kept in `posts.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: PostId,
    #[serde(flatten)]
    pub draft: PostDraft,
    #[serde(default)]
    pub featured_image: Option<AttachmentId>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

pub struct LocalPosts {
    path: PathBuf,
}

impl LocalPosts {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("posts.json"),
        }
    }

    /// All stored posts, oldest first.
    pub fn all(&self) -> Result<Vec<StoredPost>> {
        read_json(&self.path)
    }

    fn update(&mut self, id: PostId, change: impl FnOnce(&mut StoredPost)) -> Result<()> {
        let mut posts = self.all()?;
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| MailpostError::Validation(format!("Invalid post ID {id}.")))?;
        change(post);
        write_json(&self.path, &posts)
    }
}

impl PostStore for LocalPosts {
    fn insert_post(&mut self, draft: &PostDraft) -> Result<PostId> {
        if draft.title.trim().is_empty() && draft.content.trim().is_empty() {
            return Err(MailpostError::Validation(
                "Content, title, and excerpt are empty.".into(),
            ));
        }

        let mut posts = self.all()?;
        let id = posts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        posts.push(StoredPost {
            id,
            draft: draft.clone(),
            featured_image: None,
            meta: BTreeMap::new(),
        });
        write_json(&self.path, &posts)?;
        info!(post = id, title = %draft.title, status = draft.status.as_str(), "Post created");
        Ok(id)
    }

    fn post_content(&self, id: PostId) -> Result<String> {
        self.all()?
            .into_iter()
            .find(|p| p.id == id)
            .map(|p| p.draft.content)
            .ok_or_else(|| MailpostError::Validation(format!("Invalid post ID {id}.")))
    }

    fn update_post_content(&mut self, id: PostId, content: &str) -> Result<()> {
        self.update(id, |p| p.draft.content = content.to_string())
    }

    fn set_featured_image(&mut self, id: PostId, attachment: AttachmentId) -> Result<()> {
        self.update(id, |p| p.featured_image = Some(attachment))
    }

    fn set_terms(&mut self, id: PostId, taxonomy: &str, terms: &[String]) -> Result<()> {
        self.update(id, |p| {
            let entry = crate::model::post::TaxonomyTerms {
                taxonomy: taxonomy.to_string(),
                terms: terms.to_vec(),
            };
            match p
                .draft
                .taxonomy_terms
                .iter_mut()
                .find(|t| t.taxonomy == taxonomy)
            {
                Some(existing) => *existing = entry,
                None => p.draft.taxonomy_terms.push(entry),
            }
        })
    }

    fn set_post_format(&mut self, id: PostId, format: &str) -> Result<()> {
        self.update(id, |p| p.draft.post_format = Some(format.to_string()))
    }

    fn add_meta(&mut self, id: PostId, key: &str, value: &str) -> Result<()> {
        self.update(id, |p| {
            p.meta.insert(key.to_string(), value.to_string());
        })
    }
}

// ── Media ───────────────────────────────────────────────────────

/// An imported file as kept in `media.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub id: AttachmentId,
    pub parent: PostId,
    pub file: PathBuf,
    pub mime_type: String,
}

pub struct LocalMedia {
    dir: PathBuf,
    index: PathBuf,
}

impl LocalMedia {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("media"),
            index: data_dir.join("media.json"),
        }
    }

    pub fn all(&self) -> Result<Vec<StoredMedia>> {
        read_json(&self.index)
    }
}

impl MediaStore for LocalMedia {
    fn import_file(
        &mut self,
        source: &Path,
        filename: &str,
        mime_type: &str,
        parent: PostId,
    ) -> Result<AttachmentId> {
        std::fs::create_dir_all(&self.dir).map_err(|e| MailpostError::io(&self.dir, e))?;
        let target = unique_path(&self.dir.join(sanitize_filename(filename, 100)));
        std::fs::copy(source, &target).map_err(|e| MailpostError::io(&target, e))?;

        let mut media = self.all()?;
        let id = media.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        media.push(StoredMedia {
            id,
            parent,
            file: target.clone(),
            mime_type: mime_type.to_string(),
        });
        write_json(&self.index, &media)?;
        debug!(attachment = id, file = %target.display(), "Media imported");
        Ok(id)
    }
}

/// Replace characters that do not belong in a file name and cap the length.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `path`, or `stem_N.ext` for the first free N.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or(Path::new("."));

    (1..)
        .map(|i| match ext {
            Some(ext) => parent.join(format!("{stem}_{i}.{ext}")),
            None => parent.join(format!("{stem}_{i}")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

// ── Categories and taxonomies ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoryTable {
    categories: Vec<Category>,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            categories: vec![Category {
                id: 1,
                name: "Uncategorized".into(),
                slug: "uncategorized".into(),
            }],
        }
    }
}

pub struct LocalTaxonomies {
    path: PathBuf,
    registered: Vec<String>,
}

impl LocalTaxonomies {
    pub fn new(data_dir: &Path, registered: Vec<String>) -> Self {
        Self {
            path: data_dir.join("categories.json"),
            registered,
        }
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        read_json::<CategoryTable>(&self.path).map(|t| t.categories)
    }
}

/// Lowercase, with runs of anything but letters and digits turned into `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

impl TaxonomyRegistry for LocalTaxonomies {
    fn resolve_category_by_slug(&self, slug: &str) -> Option<u64> {
        let slug = slugify(slug);
        match self.categories() {
            Ok(categories) => categories.iter().find(|c| c.slug == slug).map(|c| c.id),
            Err(e) => {
                tracing::warn!(error = %e, "Category table unreadable");
                None
            }
        }
    }

    fn create_category(&mut self, name: &str) -> Result<u64> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(MailpostError::Validation(format!(
                "A name is required for this term: '{name}'"
            )));
        }
        let mut table: CategoryTable = read_json(&self.path)?;
        if let Some(existing) = table.categories.iter().find(|c| c.slug == slug) {
            return Ok(existing.id);
        }
        let id = table.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        table.categories.push(Category {
            id,
            name: name.to_string(),
            slug,
        });
        write_json(&self.path, &table)?;
        info!(category = id, name, "Category created");
        Ok(id)
    }

    fn registered_taxonomies(&self) -> Vec<String> {
        self.registered.clone()
    }
}

// ── Replies ─────────────────────────────────────────────────────

/// A reply as written to `outbox.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub queued_at: DateTime<Utc>,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub success: bool,
}

/// Queues replies for an external mailer instead of sending them.
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("outbox.jsonl"),
        }
    }

    pub fn entries(&self) -> Result<Vec<OutboxEntry>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MailpostError::io(&self.path, e)),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| MailpostError::DataFile {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

impl Notifier for OutboxNotifier {
    fn send_reply(&mut self, to: &str, subject: &str, html_body: &str, success: bool) -> Result<()> {
        let entry = OutboxEntry {
            queued_at: Utc::now(),
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
            success,
        };
        let line = serde_json::to_string(&entry).map_err(|e| MailpostError::DataFile {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MailpostError::io(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| MailpostError::io(&self.path, e))?;
        debug!(to, subject, success, "Reply queued");
        Ok(())
    }
}

// ── Log and state ───────────────────────────────────────────────

pub struct LocalState {
    log: PathBuf,
    state: PathBuf,
}

impl LocalState {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            log: data_dir.join("log.json"),
            state: data_dir.join("state.json"),
        }
    }
}

impl StateStore for LocalState {
    fn append_log(&mut self, entry: LogEntry) -> Result<()> {
        let mut log: Vec<LogEntry> = read_json(&self.log)?;
        log.insert(0, entry);
        log.truncate(LOG_LIMIT);
        write_json(&self.log, &log)
    }

    fn log(&self) -> Result<Vec<LogEntry>> {
        read_json(&self.log)
    }

    fn state(&self) -> Result<CheckState> {
        read_json(&self.state)
    }

    fn save_state(&mut self, state: &CheckState) -> Result<()> {
        write_json(&self.state, state)
    }
}

//! Turning one fetched message into a post.
//!
//! The assembler owns the per-message policy: who the author is, whether
//! the PIN matches, which categories and tags apply. Refusals by policy are
//! [`Outcome::Skipped`]; only store failures are errors.

use std::io::Write;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::config::PluginOptions;
use crate::error::{MailpostError, Result};
use crate::i18n;
use crate::mailserver::Mailserver;
use crate::model::attachment::AttachmentDescriptor;
use crate::model::message::{MessageBody, MessageHeaders, MessageId};
use crate::model::post::{PostDraft, PostId, PostStatus, TaxonomyTerms, UserId};
use crate::parser::author::parse_author;
use crate::parser::body::{derive_title, split_body, split_subject, unescape_quotes};
use crate::parser::date::message_date;
use crate::shortcode::{self, ShortcodeSet};
use crate::site::{Capability, Site, TaxonomyRegistry, UserDirectory};

/// Meta key holding the sender address of a created post.
pub const ORIGINAL_AUTHOR_META: &str = "original_author";

/// Appended to posts that received attachments.
const GALLERY: &str = "[gallery]";

/// Who a message is posted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorship {
    Author { id: UserId, status: PostStatus },
    /// Unknown sender and unknown senders are discarded.
    Discard,
}

/// Map a sender to a user and a post status.
///
/// Known users publish when they may, else their posts wait for review;
/// `registered_pending` turns every known user's post into a draft. Unknown
/// senders post as the site administrator, pending review, unless
/// `discard_pending` is set.
pub fn resolve_author(
    users: &dyn UserDirectory,
    email: Option<&str>,
    options: &PluginOptions,
) -> Authorship {
    match email.and_then(|e| users.lookup_by_email(e)) {
        Some(user) => {
            let status = if options.registered_pending {
                PostStatus::Draft
            } else if users.has_capability(&user, Capability::Publish) {
                PostStatus::Publish
            } else {
                PostStatus::Pending
            };
            Authorship::Author {
                id: user.id,
                status,
            }
        }
        None if options.discard_pending => Authorship::Discard,
        None => Authorship::Author {
            id: users.admin_user_id(),
            status: PostStatus::Pending,
        },
    }
}

/// `true` when no PIN is required, or the `[pin ...]` shortcode carries
/// exactly one argument equal to the configured PIN.
pub fn validate_pin(required: Option<&str>, content: &str) -> bool {
    match required {
        None => true,
        Some(pin) => matches!(shortcode::find("pin", content).as_slice(), [token] if token == pin),
    }
}

/// Category ids for the `[category ...]` arguments.
///
/// Numeric tokens are ids, other tokens are slugs; unknown slugs become new
/// categories. Without arguments the default category applies.
pub fn resolve_categories(
    tokens: &[String],
    default_category: Option<u64>,
    registry: &mut dyn TaxonomyRegistry,
) -> Vec<u64> {
    if tokens.is_empty() {
        return default_category.into_iter().collect();
    }

    let mut ids = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Ok(id) = token.parse::<u64>() {
            ids.push(id);
        } else if let Some(id) = registry.resolve_category_by_slug(token) {
            ids.push(id);
        } else {
            match registry.create_category(token) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(category = %token, error = %e, "Could not create category"),
            }
        }
    }
    ids
}

/// Whether `content` already carries a gallery shortcode.
fn has_gallery(content: &str) -> bool {
    content
        .to_ascii_lowercase()
        .match_indices("[gallery")
        .any(|(pos, m)| {
            matches!(
                content.as_bytes().get(pos + m.len()),
                Some(b' ' | b']' | b'/' | b'\t' | b'\n' | b'\r')
            )
        })
}

/// A created post.
#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    pub id: PostId,
    pub draft: PostDraft,
    /// Subject before the phone delimiter.
    pub subject: String,
    pub author_email: Option<String>,
}

impl Posted {
    /// `Posted: <title>`, flagged when the post awaits review.
    pub fn log_line(&self) -> String {
        let title = if self.draft.title.trim().is_empty() {
            i18n::log_no_title()
        } else {
            self.draft.title.as_str()
        };
        let pending = if self.draft.status == PostStatus::Pending {
            i18n::log_pending()
        } else {
            ""
        };
        format!("{} {title}{pending}", i18n::log_posted())
    }
}

/// What became of one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Posted(Posted),
    /// Refused by policy; carries the log line.
    Skipped(String),
}

/// Builds posts for one check cycle.
pub struct PostAssembler<'a> {
    options: &'a PluginOptions,
    site: &'a mut Site,
}

impl<'a> PostAssembler<'a> {
    pub fn new(options: &'a PluginOptions, site: &'a mut Site) -> Self {
        Self { options, site }
    }

    /// Create the post for a message.
    ///
    /// Fails with [`MailpostError::Validation`] when the post store refuses
    /// the post, after the optional failure reply went out.
    pub fn create_post(&mut self, headers: &MessageHeaders, body: &MessageBody) -> Result<Outcome> {
        let subject = split_subject(headers.subject()).to_string();
        let author_email = parse_author(headers);

        let (author_id, status) =
            match resolve_author(self.site.users.as_ref(), author_email.as_deref(), self.options) {
                Authorship::Author { id, status } => (id, status),
                Authorship::Discard => {
                    let line = format!(
                        "{} {} ({}: {subject}); {}",
                        i18n::log_no_author_match(),
                        author_email.as_deref().unwrap_or_else(|| headers.from()),
                        i18n::log_subject(),
                        i18n::log_skipping(),
                    );
                    info!(from = headers.from(), "Unknown sender, message discarded");
                    self.send_response(false, &subject, &line, author_email.as_deref());
                    return Ok(Outcome::Skipped(line));
                }
            };

        let date_utc = message_date(headers);
        let date_local = Duration::try_seconds(self.options.gmt_offset_secs)
            .and_then(|offset| date_utc.checked_add_signed(offset))
            .unwrap_or(date_utc)
            .naive_utc();

        let content = unescape_quotes(split_body(&body.content));
        let title = derive_title(&content).unwrap_or_else(|| subject.clone());

        if !validate_pin(self.options.pin.as_deref(), &content) {
            let line = format!("\"{title}\" {}", i18n::log_failed_pin());
            info!(title = %title, "PIN mismatch, message discarded");
            self.send_response(false, &subject, &line, author_email.as_deref());
            return Ok(Outcome::Skipped(line));
        }

        let taxonomies = self.site.taxonomies.registered_taxonomies();
        let names = shortcode::known_names(&taxonomies);
        let found = ShortcodeSet::extract(&content, &names);
        if !found.is_empty() {
            let seen: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
            debug!(shortcodes = ?seen, "Shortcodes found");
        }

        let category_ids = resolve_categories(
            found.get("category"),
            self.options.default_category,
            self.site.taxonomies.as_mut(),
        );
        let tag_names = found.get("tag").to_vec();
        let stripped = shortcode::strip_known(&content, &names);

        let mut draft = PostDraft {
            title,
            content: stripped,
            date_local,
            date_utc,
            author_id,
            category_ids,
            tag_names,
            status,
            post_format: None,
            taxonomy_terms: Vec::new(),
        };

        let id = match self.site.posts.insert_post(&draft) {
            Ok(id) => id,
            Err(MailpostError::Validation(reason)) => {
                self.send_response(false, &subject, &reason, author_email.as_deref());
                return Err(MailpostError::Validation(reason));
            }
            Err(e) => return Err(e),
        };
        debug!(post = id, author = author_id, status = status.as_str(), "Post inserted");

        // The post exists from here on; later failures only cost metadata.
        if let Some(email) = &author_email {
            if let Err(e) = self.site.posts.add_meta(id, ORIGINAL_AUTHOR_META, email) {
                warn!(post = id, error = %e, "Could not store the original author");
            }
        }

        if let Some(format) = found.get("post-format").first() {
            match self.site.posts.set_post_format(id, format) {
                Ok(()) => draft.post_format = Some(format.clone()),
                Err(e) => warn!(post = id, error = %e, "Could not set the post format"),
            }
        }
        for taxonomy in taxonomies {
            let terms = found.get(&taxonomy).to_vec();
            if terms.is_empty() {
                continue;
            }
            match self.site.posts.set_terms(id, &taxonomy, &terms) {
                Ok(()) => draft.taxonomy_terms.push(TaxonomyTerms { taxonomy, terms }),
                Err(e) => warn!(post = id, taxonomy = %taxonomy, error = %e, "Could not set terms"),
            }
        }

        Ok(Outcome::Posted(Posted {
            id,
            draft,
            subject,
            author_email,
        }))
    }

    /// Import the message's attachments into the media store.
    ///
    /// The first imported JPEG, PNG or GIF becomes the featured image. When
    /// anything was imported and the post has no gallery yet, one is
    /// appended. Returns the number of imported files.
    pub fn import_attachments(
        &mut self,
        server: &mut dyn Mailserver,
        message: MessageId,
        post: &mut Posted,
    ) -> Result<usize> {
        let descriptors = server.attachments(message)?;

        let mut count = 0;
        let mut featured = false;
        for descriptor in descriptors.iter().filter(|d| d.is_importable()) {
            let attachment = match self.import_one(server, message, post.id, descriptor) {
                Ok(id) => id,
                Err(e) => {
                    warn!(uid = message.0, name = %descriptor.name, error = %e, "Attachment skipped");
                    continue;
                }
            };
            count += 1;

            if !featured && descriptor.is_featured_candidate() {
                self.site.posts.set_featured_image(post.id, attachment)?;
                featured = true;
            }
        }

        if count > 0 {
            let content = self.site.posts.post_content(post.id)?;
            if !has_gallery(&content) {
                let content = content + GALLERY;
                self.site.posts.update_post_content(post.id, &content)?;
                post.draft.content = content;
            }
        }
        Ok(count)
    }

    fn import_one(
        &mut self,
        server: &mut dyn Mailserver,
        message: MessageId,
        parent: PostId,
        descriptor: &AttachmentDescriptor,
    ) -> Result<u64> {
        let bytes = server.attachment(message, &descriptor.part_id)?;

        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(&bytes)
            .map_err(|e| MailpostError::io(tmp.path(), e))?;
        tmp.flush().map_err(|e| MailpostError::io(tmp.path(), e))?;

        let id = self
            .site
            .media
            .import_file(tmp.path(), &descriptor.name, &descriptor.mime_type, parent)?;
        debug!(attachment = id, name = %descriptor.name, bytes = bytes.len(), "Attachment imported");
        Ok(id)
    }

    /// Mail `message` back to the sender when replies are enabled.
    ///
    /// Failures to send are logged and otherwise ignored.
    pub fn send_response(&mut self, success: bool, subject: &str, message: &str, to: Option<&str>) {
        if !self.options.send_response {
            return;
        }
        let (Some(notifier), Some(to)) = (self.site.notifier.as_mut(), to) else {
            return;
        };
        let heading = if success {
            i18n::reply_success()
        } else {
            i18n::reply_failed()
        };
        let body = format!("<strong>{heading}</strong><br /><br />{message}");
        if let Err(e) = notifier.send_reply(to, &format!("Re: {subject}"), &body, success) {
            warn!(to, error = %e, "Reply not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Backend, ConnectionConfig, Protocol, SiteConfig, UserConfig,
    };
    use crate::site::local::{open_site, LocalPosts, LocalTaxonomies, OutboxNotifier};

    fn options() -> PluginOptions {
        PluginOptions {
            connection: ConnectionConfig {
                protocol: Protocol::Imap,
                host: "mail.test".into(),
                port: 993,
                username: "u".into(),
                password: "p".into(),
                secure: true,
            },
            backend: Backend::Mime,
            delete_messages: true,
            default_category: Some(1),
            pin: None,
            discard_pending: false,
            registered_pending: false,
            send_response: false,
            gmt_offset_secs: 0,
        }
    }

    fn site_config() -> SiteConfig {
        SiteConfig {
            users: vec![
                UserConfig { id: 1, email: "admin@blog.test".into(), can_publish: true, admin: true },
                UserConfig { id: 2, email: "editor@blog.test".into(), can_publish: true, admin: false },
                UserConfig { id: 3, email: "writer@blog.test".into(), can_publish: false, admin: false },
            ],
            taxonomies: vec!["genre".into()],
        }
    }

    fn headers(from: &str, subject: &str) -> MessageHeaders {
        MessageHeaders::from_pairs([
            ("From", from),
            ("Subject", subject),
            ("Date", "Fri, 27 Mar 2015 01:40:04 +0000"),
        ])
    }

    fn body(content: &str) -> MessageBody {
        MessageBody {
            content: content.into(),
            charset: "utf-8".into(),
        }
    }

    fn posted(outcome: Outcome) -> Posted {
        match outcome {
            Outcome::Posted(p) => p,
            Outcome::Skipped(line) => panic!("unexpected skip: {line}"),
        }
    }

    #[test]
    fn test_resolve_author_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let site = open_site(&site_config(), dir.path()).unwrap();
        let mut opts = options();

        assert_eq!(
            resolve_author(site.users.as_ref(), Some("editor@blog.test"), &opts),
            Authorship::Author { id: 2, status: PostStatus::Publish }
        );
        assert_eq!(
            resolve_author(site.users.as_ref(), Some("writer@blog.test"), &opts),
            Authorship::Author { id: 3, status: PostStatus::Pending }
        );
        assert_eq!(
            resolve_author(site.users.as_ref(), Some("stranger@else.test"), &opts),
            Authorship::Author { id: 1, status: PostStatus::Pending }
        );
        assert_eq!(
            resolve_author(site.users.as_ref(), None, &opts),
            Authorship::Author { id: 1, status: PostStatus::Pending }
        );

        opts.registered_pending = true;
        assert_eq!(
            resolve_author(site.users.as_ref(), Some("editor@blog.test"), &opts),
            Authorship::Author { id: 2, status: PostStatus::Draft }
        );

        opts.discard_pending = true;
        assert_eq!(
            resolve_author(site.users.as_ref(), Some("stranger@else.test"), &opts),
            Authorship::Discard
        );
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin(None, "anything"));
        assert!(validate_pin(Some("abc123"), "text [pin abc123] more"));
        assert!(!validate_pin(Some("abc123"), "text [pin wrong]"));
        assert!(!validate_pin(Some("abc123"), "no pin here"));
        // A split PIN is not the PIN.
        assert!(!validate_pin(Some("abc123"), "[pin abc 123]"));
        assert!(!validate_pin(Some("abc123"), "[pin abc123 abc123]"));
        assert!(!validate_pin(Some("abc123"), "[pin ]"));
    }

    #[test]
    fn test_extreme_offset_keeps_utc_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let mut opts = options();
        opts.gmt_offset_secs = i64::MAX;
        let mut assembler = PostAssembler::new(&opts, &mut site);
        let post = posted(
            assembler
                .create_post(&headers("editor@blog.test", "Hi"), &body("text"))
                .unwrap(),
        );
        assert_eq!(post.draft.date_local, post.draft.date_utc.naive_utc());
    }

    #[test]
    fn test_resolve_categories() {
        let dir = tempfile::tempdir().unwrap();
        let mut tax = LocalTaxonomies::new(dir.path(), vec![]);
        let news = tax.create_category("news").unwrap();

        let ids = resolve_categories(
            &["7".into(), "news".into(), "travel".into()],
            Some(1),
            &mut tax,
        );
        assert_eq!(ids[0], 7);
        assert_eq!(ids[1], news);
        assert_eq!(tax.resolve_category_by_slug("travel"), Some(ids[2]));

        assert_eq!(resolve_categories(&[], Some(4), &mut tax), vec![4]);
        assert!(resolve_categories(&[], None, &mut tax).is_empty());
    }

    #[test]
    fn test_create_post_from_delimited_body() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let opts = options();
        let mut assembler = PostAssembler::new(&opts, &mut site);

        let outcome = assembler
            .create_post(
                &headers("Ed <editor@blog.test>", "Hello::ignored"),
                &body("Hello::Post body here [category news] [tag a b] [genre jazz] [post-format aside]"),
            )
            .unwrap();
        let post = posted(outcome);

        assert_eq!(post.subject, "Hello");
        assert_eq!(post.draft.title, "Hello");
        assert_eq!(post.draft.content, "Post body here    ");
        assert_eq!(post.draft.tag_names, vec!["a", "b"]);
        assert_eq!(post.draft.status, PostStatus::Publish);
        assert_eq!(post.draft.author_id, 2);
        assert_eq!(post.draft.date_utc.timestamp(), 1_427_420_404);
        assert_eq!(post.draft.post_format.as_deref(), Some("aside"));
        assert_eq!(post.draft.taxonomy_terms[0].terms, vec!["jazz"]);

        let stored = LocalPosts::new(dir.path()).all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].meta[ORIGINAL_AUTHOR_META], "editor@blog.test");
        let news = LocalTaxonomies::new(dir.path(), vec![])
            .resolve_category_by_slug("news")
            .unwrap();
        assert_eq!(stored[0].draft.category_ids, vec![news]);
    }

    #[test]
    fn test_local_date_uses_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let mut opts = options();
        opts.gmt_offset_secs = 2 * 3600;
        let mut assembler = PostAssembler::new(&opts, &mut site);
        let post = posted(
            assembler
                .create_post(&headers("editor@blog.test", "Hi"), &body("text"))
                .unwrap(),
        );
        assert_eq!(post.draft.date_local.to_string(), "2015-03-27 03:40:04");
    }

    #[test]
    fn test_pin_mismatch_skips_and_replies() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let mut opts = options();
        opts.pin = Some("abc123".into());
        opts.send_response = true;
        let mut assembler = PostAssembler::new(&opts, &mut site);

        let outcome = assembler
            .create_post(&headers("writer@blog.test", "Trip"), &body("text [pin nope]"))
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped(ref line) if line.starts_with("\"Trip\"")));
        assert!(LocalPosts::new(dir.path()).all().unwrap().is_empty());

        let replies = OutboxNotifier::new(dir.path()).entries().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].to, "writer@blog.test");
        assert_eq!(replies[0].subject, "Re: Trip");
        assert!(!replies[0].success);
    }

    #[test]
    fn test_unknown_sender_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let mut opts = options();
        opts.discard_pending = true;
        let mut assembler = PostAssembler::new(&opts, &mut site);

        let outcome = assembler
            .create_post(&headers("stranger@else.test", "Spam"), &body("buy now"))
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped(ref line) if line.contains("stranger@else.test")));
        assert!(LocalPosts::new(dir.path()).all().unwrap().is_empty());
    }

    #[test]
    fn test_empty_post_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let opts = options();
        let mut assembler = PostAssembler::new(&opts, &mut site);

        let err = assembler
            .create_post(&headers("editor@blog.test", ""), &body("[tag only]"))
            .unwrap_err();
        assert!(matches!(err, MailpostError::Validation(_)));
    }

    #[test]
    fn test_log_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = open_site(&site_config(), dir.path()).unwrap();
        let opts = options();
        let mut assembler = PostAssembler::new(&opts, &mut site);
        let post = posted(
            assembler
                .create_post(&headers("writer@blog.test", "Notes"), &body("text"))
                .unwrap(),
        );
        let line = post.log_line();
        assert!(line.contains("Notes"));
        assert!(line.ends_with(i18n::log_pending()));
    }

    #[test]
    fn test_has_gallery() {
        assert!(has_gallery("pics [gallery]"));
        assert!(has_gallery("pics [Gallery columns=2]"));
        assert!(!has_gallery("pics [galleryx]"));
        assert!(!has_gallery("no shortcode"));
    }
}

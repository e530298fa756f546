//! End-to-end check cycles against an in-memory mailbox and a file-backed
//! site in a temporary directory.

use std::path::Path;

use mailpost::check::{Checker, CycleReport};
use mailpost::config::{Backend, Config, Protocol, SiteConfig, UserConfig};
use mailpost::mailserver::{factory, MemoryMailbox};
use mailpost::model::log::CheckStatus;
use mailpost::model::post::PostStatus;
use mailpost::post::ORIGINAL_AUTHOR_META;
use mailpost::site::local::{open_site, LocalMedia, LocalPosts, LocalTaxonomies, OutboxNotifier};
use mailpost::site::TaxonomyRegistry;

fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.general.data_dir = Some(dir.to_path_buf());
    cfg.mailserver.host = "imap.blog.test".into();
    cfg.mailserver.username = "posts@blog.test".into();
    cfg.mailserver.password = "secret".into();
    cfg.mailserver.delete_messages = false;
    cfg.posting.default_category = Some(1);
    cfg.site = SiteConfig {
        users: vec![
            UserConfig { id: 1, email: "admin@blog.test".into(), can_publish: true, admin: true },
            UserConfig { id: 5, email: "jose@blog.test".into(), can_publish: true, admin: false },
            UserConfig { id: 9, email: "writer@blog.test".into(), can_publish: false, admin: false },
        ],
        taxonomies: vec!["genre".into()],
    };
    cfg
}

fn checker(cfg: &Config, mailbox: &MemoryMailbox) -> Checker {
    let dir = cfg.general.data_dir.as_deref().unwrap();
    Checker::new(factory(mailbox.clone()), open_site(&cfg.site, dir).unwrap())
}

fn message(from: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nSubject: {subject}\r\nDate: Fri, 27 Mar 2015 01:40:04 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n"
    )
    .into_bytes()
}

// ─── Test 1: One delimited message becomes one post ─────────────────

#[test]
fn test_end_to_end_single_message() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    let id = mailbox.deliver(fixture("hello.eml"));

    let report = checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    assert!(matches!(report, CycleReport::Completed { found: 1, skipped: 0, failed: 0, .. }));

    let posts = LocalPosts::new(dir.path()).all().unwrap();
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post.draft.title, "Hello");
    assert_eq!(post.draft.content, "Post body here ");
    assert_eq!(post.draft.status, PostStatus::Publish);
    assert_eq!(post.draft.author_id, 1);
    assert_eq!(post.draft.date_utc.timestamp(), 1_427_420_404);
    assert_eq!(post.meta[ORIGINAL_AUTHOR_META], "admin@blog.test");

    let news = LocalTaxonomies::new(dir.path(), vec![])
        .resolve_category_by_slug("news")
        .expect("news category created");
    assert_eq!(post.draft.category_ids, vec![news]);

    assert!(mailbox.is_seen(id));
    assert!(mailbox.contains(id));
}

// ─── Test 2: Second call inside the interval touches nothing ────────

#[test]
fn test_rate_limited_second_call() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    let mut checker = checker(&cfg, &mailbox);

    checker.check_email(&cfg, false).unwrap();
    let operations = mailbox.operations();
    mailbox.deliver(fixture("hello.eml"));

    let report = checker.check_email(&cfg, false).unwrap();
    assert_eq!(report, CycleReport::RateLimited);
    assert_eq!(mailbox.operations(), operations);
    assert_eq!(mailbox.connections(), 1);

    let log = checker.site().state.log().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log[0].message.starts_with("Please wait 5 mins"));
    assert!(!log[0].is_error);
    assert!(LocalPosts::new(dir.path()).all().unwrap().is_empty());
}

// ─── Test 3: Debug mode skips the interval ──────────────────────────

#[test]
fn test_debug_mode_ignores_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.general.debug = true;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    let mut checker = checker(&cfg, &mailbox);

    assert_eq!(checker.check_email(&cfg, false).unwrap(), CycleReport::NoMail);
    assert_eq!(checker.check_email(&cfg, false).unwrap(), CycleReport::NoMail);
    assert_eq!(mailbox.connections(), 2);
}

// ─── Test 4: PIN policy ─────────────────────────────────────────────

#[test]
fn test_pin_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.posting.pin_required = true;
    cfg.posting.pin = "7391".into();
    cfg.general.debug = true;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    let good = mailbox.deliver(fixture("pin.eml"));
    let bad = mailbox.deliver(message("writer@blog.test", "Guess", "[pin 0000] text"));
    let missing = mailbox.deliver(message("writer@blog.test", "None", "text"));

    let report = checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    assert!(matches!(report, CycleReport::Completed { found: 3, skipped: 2, failed: 0, .. }));

    let posts = LocalPosts::new(dir.path()).all().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].draft.title, "Secret trip");
    assert_eq!(posts[0].draft.content, "Off to the mountains.  ");
    assert_eq!(posts[0].draft.tag_names, vec!["hiking"]);
    assert_eq!(posts[0].draft.status, PostStatus::Pending);

    // Rejected messages still count as processed.
    for id in [good, bad, missing] {
        assert!(mailbox.is_seen(id));
    }
    let log = checker(&cfg, &mailbox).site().state.log().unwrap();
    assert!(log[0].message.contains("\"Guess\" failed PIN authentication; discarding."));
}

// ─── Test 5: Unknown senders ────────────────────────────────────────

#[test]
fn test_unknown_sender_policies() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.general.debug = true;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(message("Stranger <who@else.test>", "Hi", "from outside"));

    checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    let posts = LocalPosts::new(dir.path()).all().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].draft.author_id, 1);
    assert_eq!(posts[0].draft.status, PostStatus::Pending);

    cfg.posting.discard_pending = true;
    mailbox.deliver(message("Stranger <who@else.test>", "Again", "from outside"));
    let report = checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    assert!(matches!(report, CycleReport::Completed { found: 1, skipped: 1, .. }));
    assert_eq!(LocalPosts::new(dir.path()).all().unwrap().len(), 1);
}

// ─── Test 6: Registered users as drafts ─────────────────────────────

#[test]
fn test_registered_pending_forces_draft() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.posting.registered_pending = true;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(fixture("hello.eml"));

    checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    let posts = LocalPosts::new(dir.path()).all().unwrap();
    assert_eq!(posts[0].draft.status, PostStatus::Draft);
}

// ─── Test 7: Attachments, featured image and gallery ────────────────

#[test]
fn test_attachments_imported() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(fixture("photo.eml"));

    let report = checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    let CycleReport::Completed { posted, .. } = report else {
        panic!("expected a completed cycle");
    };
    assert_eq!(posted.len(), 1);
    assert!(posted[0].draft.content.ends_with("[gallery]"));

    let posts = LocalPosts::new(dir.path()).all().unwrap();
    let post = &posts[0];
    assert_eq!(post.draft.title, "Café in Lisbon");
    assert_eq!(post.draft.content, "<p>Café con leche  </p>[gallery]");
    assert_eq!(post.draft.tag_names, vec!["lisbon", "coffee"]);
    assert_eq!(post.draft.author_id, 5);
    assert_eq!(post.draft.date_utc.timestamp(), 1_427_534_100);

    let media = LocalMedia::new(dir.path()).all().unwrap();
    assert_eq!(media.len(), 2);
    assert_eq!(media[0].mime_type, "image/jpeg");
    assert!(media[1].file.ends_with("inline-2.png"));
    assert_eq!(post.featured_image, Some(media[0].id));
    assert!(media.iter().all(|m| m.parent == post.id));
}

// ─── Test 8: Raw backend reads no attachments ───────────────────────

#[test]
fn test_raw_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.mailserver.backend = Backend::Raw;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(fixture("photo.eml"));

    checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    let posts = LocalPosts::new(dir.path()).all().unwrap();
    assert_eq!(posts[0].draft.content, "<p>Café con leche  </p>");
    assert!(LocalMedia::new(dir.path()).all().unwrap().is_empty());
}

// ─── Test 9: POP3 marking always deletes ────────────────────────────

#[test]
fn test_pop3_deletes_processed() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.mailserver.port = 995;
    let mailbox = MemoryMailbox::new(Protocol::Pop3);
    let id = mailbox.deliver(fixture("hello.eml"));

    checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    assert!(!mailbox.contains(id));
    assert_eq!(LocalPosts::new(dir.path()).all().unwrap().len(), 1);
}

// ─── Test 10: Listing failure aborts the cycle ──────────────────────

#[test]
fn test_listing_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(fixture("hello.eml"));
    mailbox.fail_listing("SEARCH failed");
    let mut checker = checker(&cfg, &mailbox);

    let report = checker.check_email(&cfg, false).unwrap();
    assert!(matches!(report, CycleReport::Failed(_)));
    let state = checker.site().state.state().unwrap();
    assert_eq!(state.status, CheckStatus::Error);
    assert!(state.lease_until.is_none());
    let log = checker.site().state.log().unwrap();
    assert!(log[0].is_error);
    assert!(log[0].message.starts_with("An error occurred:"));
    assert!(LocalPosts::new(dir.path()).all().unwrap().is_empty());

    // The cleared lease lets the next attempt run at once, and a good
    // cycle clears the status.
    let mailbox_ok = MemoryMailbox::new(Protocol::Imap);
    let mut retry = Checker::new(
        factory(mailbox_ok.clone()),
        open_site(&cfg.site, dir.path()).unwrap(),
    );
    assert_eq!(retry.check_email(&cfg, false).unwrap(), CycleReport::NoMail);
    assert_eq!(retry.site().state.state().unwrap().status, CheckStatus::Ok);
}

// ─── Test 11: Refused post is logged, cycle continues ───────────────

#[test]
fn test_refused_post_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    let empty = mailbox.deliver(message("admin@blog.test", "", "[tag only]"));
    let fine = mailbox.deliver(fixture("hello.eml"));
    let mut checker = checker(&cfg, &mailbox);

    let report = checker.check_email(&cfg, false).unwrap();
    assert!(matches!(report, CycleReport::Completed { found: 2, failed: 1, .. }));
    assert!(mailbox.is_seen(empty));
    assert!(mailbox.is_seen(fine));

    let log = checker.site().state.log().unwrap();
    assert!(log[0].is_error);
    assert!(log[0].message.contains("Content, title, and excerpt are empty."));
    assert_eq!(checker.site().state.state().unwrap().status, CheckStatus::Ok);
}

// ─── Test 12: Replies go to the sender ──────────────────────────────

#[test]
fn test_success_reply() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.posting.send_response = true;
    let mailbox = MemoryMailbox::new(Protocol::Imap);
    mailbox.deliver(fixture("hello.eml"));

    checker(&cfg, &mailbox).check_email(&cfg, false).unwrap();
    let replies = OutboxNotifier::new(dir.path()).entries().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].to, "admin@blog.test");
    assert_eq!(replies[0].subject, "Re: Hello");
    assert!(replies[0].success);
    assert!(replies[0].html_body.starts_with("<strong>Success!</strong><br /><br />Posted: Hello"));
}

//! One mailbox check: connect, post every new message, mark the batch,
//! disconnect.
//!
//! Only connection and listing failures end a cycle early. Anything that
//! goes wrong with a single message is written to the cycle log and the
//! loop moves on to the next one.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{MailpostError, Result};
use crate::i18n;
use crate::mailserver::{Mailserver, MailserverFactory};
use crate::model::log::{CheckStatus, LogEntry};
use crate::model::message::MessageId;
use crate::post::{Outcome, PostAssembler, Posted};
use crate::site::Site;

/// Summary of one call to [`Checker::check_email`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// A previous check is too recent.
    RateLimited,
    /// Settings are missing or unusable; nothing was contacted.
    Unconfigured(String),
    /// The mailbox could not be opened or listed.
    Failed(String),
    NoMail,
    Completed {
        found: usize,
        posted: Vec<Posted>,
        skipped: usize,
        failed: usize,
    },
}

/// Runs check cycles against one site.
pub struct Checker {
    factory: MailserverFactory,
    site: Site,
}

impl Checker {
    pub fn new(factory: MailserverFactory, site: Site) -> Self {
        Self { factory, site }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Run one cycle.
    ///
    /// `force` skips the minimum interval, as does `general.debug`. Errors
    /// are only returned when the log or the state cannot be persisted.
    pub fn check_email(&mut self, config: &Config, force: bool) -> Result<CycleReport> {
        let now = Utc::now();
        let interval_secs = config.general.check_interval_secs;
        let mut state = self.site.state.state()?;

        if !(force || config.general.debug) && state.lease_until.is_some_and(|until| until > now) {
            let line = format!(
                "{} {} {}",
                i18n::log_please_wait(),
                i18n::human_interval(interval_secs),
                i18n::log_to_check_again()
            );
            debug!(lease_until = ?state.lease_until, "Check skipped");
            self.site.state.append_log(LogEntry::info(now, line))?;
            return Ok(CycleReport::RateLimited);
        }

        let interval = Duration::seconds(i64::from(u32::try_from(interval_secs).unwrap_or(u32::MAX)));
        state.lease_until = now.checked_add_signed(interval);
        self.site.state.save_state(&state)?;

        let options = match config.plugin_options() {
            Ok(options) => options,
            Err(e) if e.is_fatal() => {
                if matches!(e, MailpostError::InvalidConfig(_)) {
                    warn!(error = %e, "Check skipped");
                } else {
                    debug!(error = %e, "Check skipped");
                }
                return Ok(CycleReport::Unconfigured(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        state.last_checked = Some(now);
        state.status = CheckStatus::Ok;
        self.site.state.save_state(&state)?;

        let mut server = (self.factory)(options.backend);
        let ids = match server
            .open(&options.connection)
            .and_then(|()| server.list_new())
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(host = %options.connection.host, error = %e, "Check failed");
                let line = format!("{} {e}", i18n::log_error_occurred());
                self.save_error(now, line.clone())?;
                return Ok(CycleReport::Failed(line));
            }
        };

        if ids.is_empty() {
            self.site
                .state
                .append_log(LogEntry::info(now, i18n::log_no_new_mail()))?;
            server.close();
            return Ok(CycleReport::NoMail);
        }

        info!(count = ids.len(), "New messages");
        let mut cycle = Cycle::new(ids.len());
        {
            let mut assembler = PostAssembler::new(&options, &mut self.site);
            for &id in &ids {
                cycle.process(server.as_mut(), &mut assembler, id);
            }
        }

        let summary = cycle.lines.join("\n");
        if cycle.fetch_failed {
            self.save_error(now, summary)?;
        } else if cycle.failed > 0 {
            self.site.state.append_log(LogEntry::error(now, summary))?;
        } else {
            self.site.state.append_log(LogEntry::info(now, summary))?;
        }

        if let Err(e) = server.mark_as_read(&cycle.processed, options.delete_messages) {
            warn!(error = %e, "Marking failed");
            let line = format!("{} {e}", i18n::log_mark_failed());
            self.site.state.append_log(LogEntry::error(Utc::now(), line))?;
        }
        server.close();

        Ok(CycleReport::Completed {
            found: ids.len(),
            posted: cycle.posted,
            skipped: cycle.skipped,
            failed: cycle.failed,
        })
    }

    /// Log `message` as an error, flag the status and drop the lease so the
    /// next check can run at once.
    fn save_error(&mut self, now: DateTime<Utc>, message: String) -> Result<()> {
        self.site.state.append_log(LogEntry::error(now, message))?;
        let mut state = self.site.state.state()?;
        state.status = CheckStatus::Error;
        state.lease_until = None;
        self.site.state.save_state(&state)
    }
}

/// Bookkeeping for the messages of one cycle.
struct Cycle {
    lines: Vec<String>,
    processed: Vec<MessageId>,
    posted: Vec<Posted>,
    skipped: usize,
    failed: usize,
    fetch_failed: bool,
}

impl Cycle {
    fn new(found: usize) -> Self {
        let header = if found == 1 {
            i18n::log_found_one().to_string()
        } else {
            format!("{} {found} {}", i18n::log_found(), i18n::log_new_messages())
        };
        Self {
            lines: vec![header],
            processed: Vec::with_capacity(found),
            posted: Vec::new(),
            skipped: 0,
            failed: 0,
            fetch_failed: false,
        }
    }

    fn process(&mut self, server: &mut dyn Mailserver, assembler: &mut PostAssembler<'_>, id: MessageId) {
        let fetched = server
            .headers(id)
            .and_then(|headers| server.body(id).map(|body| (headers, body)));
        let (headers, body) = match fetched {
            Ok(fetched) => fetched,
            Err(e @ MailpostError::Mime(_)) => {
                // Refetching cannot help; mark it and move on.
                warn!(uid = id.0, error = %e, "Message unreadable");
                self.lines.push(format!("{} {id}: {e}", i18n::log_unreadable()));
                self.processed.push(id);
                self.failed += 1;
                return;
            }
            Err(e) => {
                // Left unmarked so the next cycle retries it.
                warn!(uid = id.0, error = %e, "Fetch failed");
                self.lines.push(format!("{} {id}: {e}", i18n::log_fetch_failed()));
                self.failed += 1;
                self.fetch_failed = true;
                return;
            }
        };

        let outcome = assembler.create_post(&headers, &body);
        self.processed.push(id);

        let mut posted = match outcome {
            Ok(Outcome::Posted(posted)) => posted,
            Ok(Outcome::Skipped(line)) => {
                self.lines.push(line);
                self.skipped += 1;
                return;
            }
            Err(e) => {
                warn!(uid = id.0, error = %e, "Post not created");
                self.lines.push(match e {
                    MailpostError::Validation(reason) => reason,
                    other => other.to_string(),
                });
                self.failed += 1;
                return;
            }
        };

        match assembler.import_attachments(server, id, &mut posted) {
            Ok(0) => {}
            Ok(count) => debug!(post = posted.id, count, "Attachments imported"),
            Err(e) => warn!(post = posted.id, error = %e, "Attachments not imported"),
        }

        let line = posted.log_line();
        info!(post = posted.id, title = %posted.draft.title, "Posted");
        assembler.send_response(true, &posted.subject, &line, posted.author_email.as_deref());
        self.lines.push(line);
        self.posted.push(posted);
    }
}

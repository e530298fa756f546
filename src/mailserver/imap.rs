//! IMAP transport over the `imap` crate.

use std::collections::HashSet;

use tracing::{debug, info};

use super::stream::MailStream;
use super::{Flag, MailTransport};
use crate::config::{ConnectionConfig, Protocol};
use crate::error::{MailpostError, Result};
use crate::model::message::MessageId;

const MAILBOX: &str = "INBOX";

/// Advisory raised when a plaintext server offers `AUTH=PLAIN`.
pub const INSECURE_AUTH_PLAIN: &str = "SECURITY PROBLEM: insecure server advertised AUTH=PLAIN";

/// An authenticated IMAP session with `INBOX` selected.
pub struct ImapTransport {
    session: imap::Session<MailStream>,
    advisories: Vec<String>,
    expunge_on_logout: bool,
}

impl ImapTransport {
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let stream = MailStream::connect(&config.host, config.port, config.secure)?;
        let secure = stream.is_secure();

        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| MailpostError::Connection(format!("IMAP greeting: {e}")))?;

        let mut session = client
            .login(&config.username, &config.password)
            .map_err(|(e, _)| MailpostError::Connection(format!("IMAP login: {e}")))?;

        let mut advisories = Vec::new();
        if !secure {
            match session.capabilities() {
                Ok(caps) if caps.has_str("AUTH=PLAIN") => {
                    advisories.push(INSECURE_AUTH_PLAIN.to_string());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "CAPABILITY failed"),
            }
        }

        session
            .select(MAILBOX)
            .map_err(|e| MailpostError::Connection(format!("SELECT {MAILBOX}: {e}")))?;
        info!(host = %config.host, "IMAP session open");

        Ok(Self {
            session,
            advisories,
            expunge_on_logout: false,
        })
    }

    fn fetch_item(&mut self, id: MessageId, query: &str, pick: Item) -> Result<Vec<u8>> {
        let fetches = self.session.uid_fetch(id.to_string(), query)?;
        let fetch = fetches
            .iter()
            .next()
            .ok_or_else(|| MailpostError::Protocol(format!("UID {id} not found")))?;
        let bytes = match pick {
            Item::Header => fetch.header(),
            Item::Text => fetch.text(),
            Item::Body => fetch.body(),
        };
        bytes
            .map(<[u8]>::to_vec)
            .ok_or_else(|| MailpostError::Protocol(format!("UID {id}: empty {query} response")))
    }
}

#[derive(Clone, Copy)]
enum Item {
    Header,
    Text,
    Body,
}

fn uid_set(ids: &[MessageId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl MailTransport for ImapTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Imap
    }

    fn list_new(&mut self) -> Result<Vec<MessageId>> {
        let found: HashSet<u32> = self.session.uid_search("UNSEEN")?;
        let mut ids: Vec<MessageId> = found.into_iter().map(MessageId).collect();
        ids.sort();
        Ok(ids)
    }

    fn fetch_header(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let mut raw = self.fetch_item(id, "(UID BODY.PEEK[HEADER])", Item::Header)?;
        while raw.ends_with(b"\n") {
            raw.pop();
            if raw.ends_with(b"\r") {
                raw.pop();
            }
        }
        Ok(raw)
    }

    fn fetch_text(&mut self, id: MessageId) -> Result<Vec<u8>> {
        self.fetch_item(id, "(UID BODY.PEEK[TEXT])", Item::Text)
    }

    fn fetch_message(&mut self, id: MessageId) -> Result<Vec<u8>> {
        self.fetch_item(id, "(UID BODY.PEEK[])", Item::Body)
    }

    fn set_flag(&mut self, ids: &[MessageId], flag: Flag) -> Result<()> {
        let query = match flag {
            Flag::Seen => "+FLAGS.SILENT (\\Seen)",
            Flag::Deleted => {
                self.expunge_on_logout = true;
                "+FLAGS.SILENT (\\Deleted)"
            }
        };
        self.session.uid_store(uid_set(ids), query)?;
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        if self.expunge_on_logout {
            self.session.expunge()?;
        }
        self.session.logout()?;
        Ok(())
    }

    fn advisories(&self) -> &[String] {
        &self.advisories
    }
}

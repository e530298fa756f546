//! In-memory mailbox.
//!
//! Behaves like an IMAP or POP3 maildrop: delivered messages are new until
//! flagged, flagged-deleted messages disappear when the session logs out.
//! Failures can be scripted per stage so the check loop's error paths can be
//! driven offline. `preview` uses it to run a local `.eml` through the same
//! code path a real mailbox takes.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Connector, Flag, MailTransport};
use crate::config::{ConnectionConfig, Protocol};
use crate::error::{MailpostError, Result};
use crate::model::message::MessageId;
use crate::parser::header::split_message;

#[derive(Debug, Default)]
struct Stored {
    raw: Vec<u8>,
    seen: bool,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    messages: BTreeMap<u32, Stored>,
    next_uid: u32,
    connect_error: Option<String>,
    list_error: Option<String>,
    mark_error: Option<String>,
    failing_fetches: HashSet<u32>,
    advisories: Vec<String>,
    connections: usize,
    operations: usize,
}

/// A shared handle to one in-memory maildrop. Clones see the same mailbox.
#[derive(Debug, Clone)]
pub struct MemoryMailbox {
    protocol: Protocol,
    state: Arc<Mutex<State>>,
}

impl MemoryMailbox {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            state: Arc::new(Mutex::new(State {
                next_uid: 1,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a message and return its id.
    pub fn deliver(&self, raw: impl Into<Vec<u8>>) -> MessageId {
        let mut state = self.lock();
        let uid = state.next_uid;
        state.next_uid += 1;
        state.messages.insert(
            uid,
            Stored {
                raw: raw.into(),
                ..Stored::default()
            },
        );
        MessageId(uid)
    }

    /// Make the next connection attempts fail.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        self.lock().connect_error = Some(reason.into());
    }

    pub fn fail_listing(&self, reason: impl Into<String>) {
        self.lock().list_error = Some(reason.into());
    }

    pub fn fail_marking(&self, reason: impl Into<String>) {
        self.lock().mark_error = Some(reason.into());
    }

    /// Make every fetch of `id` fail.
    pub fn fail_fetch(&self, id: MessageId) {
        self.lock().failing_fetches.insert(id.0);
    }

    /// Raise `advisory` on every login.
    pub fn advertise(&self, advisory: impl Into<String>) {
        self.lock().advisories.push(advisory.into());
    }

    /// Number of successful and failed connection attempts.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Number of commands issued over all sessions, logins included.
    pub fn operations(&self) -> usize {
        self.lock().operations
    }

    pub fn is_seen(&self, id: MessageId) -> bool {
        self.lock().messages.get(&id.0).is_some_and(|m| m.seen)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.lock().messages.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Connector for MemoryMailbox {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn MailTransport>> {
        let mut state = self.lock();
        state.connections += 1;
        state.operations += 1;
        if let Some(reason) = &state.connect_error {
            return Err(MailpostError::Connection(reason.clone()));
        }
        let advisories = state.advisories.clone();
        drop(state);

        Ok(Box::new(MemoryTransport {
            mailbox: self.clone(),
            advisories,
        }))
    }
}

struct MemoryTransport {
    mailbox: MemoryMailbox,
    advisories: Vec<String>,
}

impl MemoryTransport {
    fn raw(&self, id: MessageId) -> Result<Vec<u8>> {
        let mut state = self.mailbox.lock();
        state.operations += 1;
        if state.failing_fetches.contains(&id.0) {
            return Err(MailpostError::Protocol(format!("Fetch of message {id} failed")));
        }
        state
            .messages
            .get(&id.0)
            .filter(|m| !m.deleted)
            .map(|m| m.raw.clone())
            .ok_or_else(|| MailpostError::Protocol(format!("No message {id}")))
    }
}

impl MailTransport for MemoryTransport {
    fn protocol(&self) -> Protocol {
        self.mailbox.protocol
    }

    fn list_new(&mut self) -> Result<Vec<MessageId>> {
        let pop3 = self.mailbox.protocol == Protocol::Pop3;
        let mut state = self.mailbox.lock();
        state.operations += 1;
        if let Some(reason) = &state.list_error {
            return Err(MailpostError::Protocol(reason.clone()));
        }
        Ok(state
            .messages
            .iter()
            .filter(|(_, m)| !m.deleted && (pop3 || !m.seen))
            .map(|(&uid, _)| MessageId(uid))
            .collect())
    }

    fn fetch_header(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let raw = self.raw(id)?;
        Ok(split_message(&raw).0.to_vec())
    }

    fn fetch_text(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let raw = self.raw(id)?;
        Ok(split_message(&raw).1.to_vec())
    }

    fn fetch_message(&mut self, id: MessageId) -> Result<Vec<u8>> {
        self.raw(id)
    }

    fn set_flag(&mut self, ids: &[MessageId], flag: Flag) -> Result<()> {
        let mut state = self.mailbox.lock();
        state.operations += 1;
        if let Some(reason) = &state.mark_error {
            return Err(MailpostError::Protocol(reason.clone()));
        }
        for id in ids {
            if let Some(message) = state.messages.get_mut(&id.0) {
                match flag {
                    Flag::Seen => message.seen = true,
                    Flag::Deleted => message.deleted = true,
                }
            }
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        let mut state = self.mailbox.lock();
        state.operations += 1;
        state.messages.retain(|_, m| !m.deleted);
        Ok(())
    }

    fn advisories(&self) -> &[String] {
        &self.advisories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            protocol: Protocol::Imap,
            host: "mail.test".into(),
            port: 993,
            username: "u".into(),
            password: "p".into(),
            secure: true,
        }
    }

    const MESSAGE: &[u8] = b"Subject: hi\r\n\r\nbody\r\n";

    #[test]
    fn test_imap_lists_unseen_only() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let a = mailbox.deliver(MESSAGE);
        let b = mailbox.deliver(MESSAGE);
        let mut transport = mailbox.connect(&config()).unwrap();
        transport.set_flag(&[a], Flag::Seen).unwrap();
        assert_eq!(transport.list_new().unwrap(), vec![b]);
        assert!(mailbox.is_seen(a));
    }

    #[test]
    fn test_pop3_lists_everything() {
        let mailbox = MemoryMailbox::new(Protocol::Pop3);
        let a = mailbox.deliver(MESSAGE);
        let mut transport = mailbox.connect(&config()).unwrap();
        transport.set_flag(&[a], Flag::Seen).unwrap();
        assert_eq!(transport.list_new().unwrap(), vec![a]);
    }

    #[test]
    fn test_deleted_removed_on_logout() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let a = mailbox.deliver(MESSAGE);
        let mut transport = mailbox.connect(&config()).unwrap();
        transport.set_flag(&[a], Flag::Deleted).unwrap();
        assert!(mailbox.contains(a));
        transport.logout().unwrap();
        assert!(!mailbox.contains(a));
    }

    #[test]
    fn test_split_fetches() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let a = mailbox.deliver(MESSAGE);
        let mut transport = mailbox.connect(&config()).unwrap();
        assert_eq!(transport.fetch_header(a).unwrap(), b"Subject: hi");
        assert_eq!(transport.fetch_text(a).unwrap(), b"body\r\n");
    }

    #[test]
    fn test_scripted_failures() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let a = mailbox.deliver(MESSAGE);
        mailbox.fail_fetch(a);
        let mut transport = mailbox.connect(&config()).unwrap();
        assert!(transport.fetch_message(a).is_err());

        mailbox.fail_connect("refused");
        assert!(mailbox.connect(&config()).is_err());
        assert_eq!(mailbox.connections(), 2);
    }
}

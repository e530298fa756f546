//! Mailbox access.
//!
//! Two layers:
//!
//! - [`MailTransport`]: one authenticated session speaking a wire protocol
//!   (IMAP, POP3, or an in-memory mailbox). Moves bytes and flags only.
//! - [`Mailserver`]: the per-cycle connection the check loop drives. Turns
//!   transport bytes into headers, bodies and attachments. Two variants
//!   differ in how much MIME structure they understand: [`raw`] reads the
//!   header block and body text directly, [`mime`] parses the whole message.

pub mod imap;
pub mod memory;
pub mod mime;
pub mod pop3;
pub mod raw;
pub mod stream;

use tracing::debug;

use crate::config::{Backend, ConnectionConfig, Protocol};
use crate::error::{MailpostError, Result};
use crate::model::attachment::{AttachmentDescriptor, MimePartId};
use crate::model::message::{MessageBody, MessageHeaders, MessageId};

pub use self::memory::MemoryMailbox;
pub use self::mime::MimeMailserver;
pub use self::raw::RawMailserver;

/// Flag applied to processed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Seen,
    Deleted,
}

/// Which flag `mark_as_read` sets. POP3 has no read state, so marking there
/// always deletes.
pub fn mark_flag(protocol: Protocol, delete: bool) -> Flag {
    if delete || protocol == Protocol::Pop3 {
        Flag::Deleted
    } else {
        Flag::Seen
    }
}

/// One authenticated protocol session.
pub trait MailTransport {
    fn protocol(&self) -> Protocol;

    /// Ids of messages not yet processed: unseen for IMAP, all for POP3.
    fn list_new(&mut self) -> Result<Vec<MessageId>>;

    /// The header block, without the blank line that ends it.
    fn fetch_header(&mut self, id: MessageId) -> Result<Vec<u8>>;

    /// Everything after the header block, still transfer-encoded.
    fn fetch_text(&mut self, id: MessageId) -> Result<Vec<u8>>;

    /// The complete message.
    fn fetch_message(&mut self, id: MessageId) -> Result<Vec<u8>>;

    fn set_flag(&mut self, ids: &[MessageId], flag: Flag) -> Result<()>;

    /// End the session, committing deletions.
    fn logout(&mut self) -> Result<()>;

    /// Warnings the server raised while logging in.
    fn advisories(&self) -> &[String] {
        &[]
    }
}

/// Opens transports.
pub trait Connector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn MailTransport>>;
}

/// The network connector: IMAP or POP3 over TCP, TLS when `secure`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkConnector;

impl Connector for NetworkConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn MailTransport>> {
        match config.protocol {
            Protocol::Imap => Ok(Box::new(imap::ImapTransport::connect(config)?)),
            Protocol::Pop3 => Ok(Box::new(pop3::Pop3Transport::connect(config)?)),
        }
    }
}

/// A mailbox connection for one check cycle.
///
/// `Unopened -> Open -> Closed`. Everything except `open` and `close` fails
/// with [`MailpostError::InvalidState`] outside the `Open` state.
pub trait Mailserver {
    fn open(&mut self, config: &ConnectionConfig) -> Result<()>;
    fn list_new(&mut self) -> Result<Vec<MessageId>>;
    fn headers(&mut self, id: MessageId) -> Result<MessageHeaders>;
    fn body(&mut self, id: MessageId) -> Result<MessageBody>;
    fn attachments(&mut self, id: MessageId) -> Result<Vec<AttachmentDescriptor>>;
    fn attachment(&mut self, id: MessageId, part: &MimePartId) -> Result<Vec<u8>>;

    /// Flag `ids` as seen, or deleted when `delete` is set or the protocol is POP3.
    fn mark_as_read(&mut self, ids: &[MessageId], delete: bool) -> Result<()>;

    /// Idempotent.
    fn close(&mut self);
}

/// Builds the mailserver for a cycle.
pub type MailserverFactory = Box<dyn Fn(Backend) -> Box<dyn Mailserver>>;

/// A factory handing each new mailserver a clone of `connector`.
pub fn factory<C>(connector: C) -> MailserverFactory
where
    C: Connector + Clone + 'static,
{
    Box::new(move |backend: Backend| -> Box<dyn Mailserver> {
        match backend {
            Backend::Raw => Box::new(RawMailserver::new(connector.clone())),
            Backend::Mime => Box::new(MimeMailserver::new(connector.clone())),
        }
    })
}

/// Connection state shared by both mailserver variants.
#[derive(Default)]
pub(crate) enum Session {
    #[default]
    Unopened,
    Open(Box<dyn MailTransport>),
    Closed,
}

impl Session {
    pub(crate) fn transport(&mut self) -> Result<&mut dyn MailTransport> {
        match self {
            Self::Open(transport) => Ok(transport.as_mut()),
            Self::Unopened => Err(MailpostError::InvalidState("not open")),
            Self::Closed => Err(MailpostError::InvalidState("closed")),
        }
    }

    pub(crate) fn ensure_unopened(&self) -> Result<()> {
        match self {
            Self::Unopened => Ok(()),
            Self::Open(_) => Err(MailpostError::InvalidState("already open")),
            Self::Closed => Err(MailpostError::InvalidState("closed")),
        }
    }

    pub(crate) fn close(&mut self) {
        if !matches!(self, Self::Open(_)) {
            return;
        }
        if let Self::Open(mut transport) = std::mem::replace(self, Self::Closed) {
            if let Err(e) = transport.logout() {
                debug!(error = %e, "Logout failed; connection dropped");
            }
        }
    }

    pub(crate) fn mark(&mut self, ids: &[MessageId], delete: bool) -> Result<()> {
        let transport = self.transport()?;
        if ids.is_empty() {
            return Ok(());
        }
        let flag = mark_flag(transport.protocol(), delete);
        debug!(count = ids.len(), ?flag, "Marking processed messages");
        transport.set_flag(ids, flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_flag() {
        assert_eq!(mark_flag(Protocol::Imap, false), Flag::Seen);
        assert_eq!(mark_flag(Protocol::Imap, true), Flag::Deleted);
        assert_eq!(mark_flag(Protocol::Pop3, false), Flag::Deleted);
    }

    #[test]
    fn test_session_states() {
        let mut session = Session::default();
        assert!(matches!(
            session.transport(),
            Err(MailpostError::InvalidState("not open"))
        ));
        session.close();
        assert!(session.ensure_unopened().is_ok());
    }
}

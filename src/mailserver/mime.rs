//! Mailserver backed by a full MIME parse of each message.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, info};

use super::{Connector, Mailserver, Session};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::model::attachment::{AttachmentDescriptor, MimePartId};
use crate::model::message::{MessageBody, MessageHeaders, MessageId};
use crate::parser::header::parse_headers;
use crate::parser::mime;

/// Raw messages kept per session. Body, attachment list and attachment
/// payloads of one message all come from the same fetch.
const CACHE_SIZE: usize = 8;

pub struct MimeMailserver<C: Connector> {
    connector: C,
    session: Session,
    cache: LruCache<MessageId, Vec<u8>>,
}

impl<C: Connector> MimeMailserver<C> {
    pub fn new(connector: C) -> Self {
        let size = NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            connector,
            session: Session::Unopened,
            cache: LruCache::new(size),
        }
    }

    /// The complete message, fetched once per session.
    fn raw(&mut self, id: MessageId) -> Result<&[u8]> {
        let session = &mut self.session;
        self.cache
            .try_get_or_insert(id, || -> Result<Vec<u8>> {
                let raw = session.transport()?.fetch_message(id)?;
                debug!(uid = id.0, bytes = raw.len(), "Fetched message");
                Ok(raw)
            })
            .map(Vec::as_slice)
    }
}

impl<C: Connector> Mailserver for MimeMailserver<C> {
    fn open(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.session.ensure_unopened()?;
        let transport = self.connector.connect(config)?;
        for advisory in transport.advisories() {
            debug!(advisory, "Login advisory");
        }
        info!(protocol = %config.protocol, host = %config.host, "Mailbox open");
        self.session = Session::Open(transport);
        Ok(())
    }

    fn list_new(&mut self) -> Result<Vec<MessageId>> {
        self.session.transport()?.list_new()
    }

    fn headers(&mut self, id: MessageId) -> Result<MessageHeaders> {
        let raw = self.session.transport()?.fetch_header(id)?;
        Ok(parse_headers(&raw))
    }

    fn body(&mut self, id: MessageId) -> Result<MessageBody> {
        let raw = self.raw(id)?;
        let msg = mime::parse_message(raw)?;
        Ok(mime::select_body(&msg).unwrap_or_else(|| MessageBody {
            content: String::new(),
            charset: "utf-8".into(),
        }))
    }

    fn attachments(&mut self, id: MessageId) -> Result<Vec<AttachmentDescriptor>> {
        let raw = self.raw(id)?;
        let msg = mime::parse_message(raw)?;
        Ok(mime::list_attachments(&msg))
    }

    fn attachment(&mut self, id: MessageId, part: &MimePartId) -> Result<Vec<u8>> {
        let raw = self.raw(id)?;
        let msg = mime::parse_message(raw)?;
        mime::part_contents(&msg, part)
    }

    fn mark_as_read(&mut self, ids: &[MessageId], delete: bool) -> Result<()> {
        self.session.mark(ids, delete)
    }

    fn close(&mut self) {
        // Ids are only meaningful within one session.
        self.cache.clear();
        self.session.close();
    }
}

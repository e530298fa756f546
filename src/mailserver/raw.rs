//! Mailserver that works from the header block and the raw body text.
//!
//! No MIME tree is built. For multipart bodies the parts are found by
//! splitting on the boundary and the first HTML (else plain) part wins;
//! transfer encoding and charset are undone here, client side. Attachments
//! are not reported.

use tracing::{debug, info};

use super::imap::INSECURE_AUTH_PLAIN;
use super::{Connector, Mailserver, Session};
use crate::config::ConnectionConfig;
use crate::error::{MailpostError, Result};
use crate::model::attachment::{AttachmentDescriptor, MimePartId};
use crate::model::message::{MessageBody, MessageHeaders, MessageId};
use crate::parser::body::normalize_body;
use crate::parser::header::{parse_headers, split_message};

/// Nesting limit for multipart bodies.
const MAX_DEPTH: usize = 8;

pub struct RawMailserver<C: Connector> {
    connector: C,
    session: Session,
}

impl<C: Connector> RawMailserver<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: Session::Unopened,
        }
    }
}

impl<C: Connector> Mailserver for RawMailserver<C> {
    fn open(&mut self, config: &ConnectionConfig) -> Result<()> {
        self.session.ensure_unopened()?;
        let transport = self.connector.connect(config)?;

        for advisory in transport.advisories() {
            if advisory == INSECURE_AUTH_PLAIN {
                // Expected on plaintext connections.
                debug!(advisory, "Ignoring login advisory");
                continue;
            }
            return Err(MailpostError::Connection(advisory.clone()));
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
        let transport = self.session.transport()?;
        let head = parse_headers(&transport.fetch_header(id)?);
        let text = transport.fetch_text(id)?;
        Ok(select_part(&head, &text, 0).unwrap_or_else(|| MessageBody {
            content: String::new(),
            charset: "utf-8".into(),
        }))
    }

    fn attachments(&mut self, _id: MessageId) -> Result<Vec<AttachmentDescriptor>> {
        self.session.transport()?;
        Ok(Vec::new())
    }

    fn attachment(&mut self, _id: MessageId, part: &MimePartId) -> Result<Vec<u8>> {
        self.session.transport()?;
        Err(MailpostError::Mime(format!(
            "Part {part} unavailable: this backend does not read MIME structure"
        )))
    }

    fn mark_as_read(&mut self, ids: &[MessageId], delete: bool) -> Result<()> {
        self.session.mark(ids, delete)
    }

    fn close(&mut self) {
        self.session.close();
    }
}

/// Type, parameters of a `Content-Type` value: `("text/html", [("charset", "utf-8")])`.
fn content_type(headers: &MessageHeaders) -> (String, Vec<(String, String)>) {
    let value = headers.get("content-type").unwrap_or("text/plain");
    let mut pieces = value.split(';');
    let mime = pieces
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let params = pieces
        .filter_map(|p| p.split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect();
    (mime, params)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// The best body in `text`, whose headers are `headers`.
fn select_part(headers: &MessageHeaders, text: &[u8], depth: usize) -> Option<MessageBody> {
    let (mime, params) = content_type(headers);
    let encoding = headers.get("content-transfer-encoding");

    if !mime.starts_with("multipart/") {
        if !mime.starts_with("text/") {
            return None;
        }
        let charset = param(&params, "charset").unwrap_or_default();
        return Some(normalize_body(text, encoding, charset));
    }

    if depth >= MAX_DEPTH {
        return None;
    }
    let boundary = param(&params, "boundary")?;
    let parts = split_multipart(text, boundary);

    let mut plain = None;
    for part in parts {
        let (head, body) = split_message(part);
        let part_headers = parse_headers(head);
        let (part_mime, _) = content_type(&part_headers);
        let disposition = part_headers.get("content-disposition").unwrap_or_default();
        if disposition.trim_start().to_ascii_lowercase().starts_with("attachment") {
            continue;
        }

        if part_mime == "text/html" || part_mime.starts_with("multipart/") {
            if let Some(found) = select_part(&part_headers, body, depth + 1) {
                if part_mime == "text/html" {
                    return Some(found);
                }
                // A nested alternative already applied the HTML preference.
                plain.get_or_insert(found);
            }
        } else if part_mime == "text/plain" && plain.is_none() {
            plain = select_part(&part_headers, body, depth + 1);
        }
    }
    plain
}

/// Body parts between `--boundary` lines.
fn split_multipart<'a>(text: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut starts = Vec::new();
    let mut line_start = 0;
    while line_start < text.len() {
        let line_end = text[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(text.len(), |p| line_start + p + 1);
        let line = &text[line_start..line_end];
        if line.starts_with(delimiter) {
            let closing = line[delimiter.len()..].starts_with(b"--");
            starts.push((line_start, line_end, closing));
            if closing {
                break;
            }
        }
        line_start = line_end;
    }

    starts
        .windows(2)
        .map(|w| {
            let (_, body_start, _) = w[0];
            let (next_start, _, _) = w[1];
            trim_line_end(&text[body_start..next_start])
        })
        .collect()
}

/// Drop the line break that belongs to the following delimiter.
fn trim_line_end(part: &[u8]) -> &[u8] {
    let part = part.strip_suffix(b"\n").unwrap_or(part);
    part.strip_suffix(b"\r").unwrap_or(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::mailserver::MemoryMailbox;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            protocol: Protocol::Imap,
            host: "mail.test".into(),
            port: 143,
            username: "u".into(),
            password: "p".into(),
            secure: false,
        }
    }

    const ALTERNATIVE: &[u8] = b"From: Ann <ann@example.com>\r\n\
Subject: Hello\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
preamble\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain text\r\n\
--b1\r\n\
Content-Type: text/html; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<html><p>caf=E9</p></html>\r\n\
--b1--\r\n";

    #[test]
    fn test_body_prefers_html_and_decodes() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let id = mailbox.deliver(ALTERNATIVE);
        let mut server = RawMailserver::new(mailbox);
        server.open(&config()).unwrap();
        let body = server.body(id).unwrap();
        assert_eq!(body.content, "<p>café</p>");
        assert_eq!(body.charset, "iso-8859-1");
        assert!(server.attachments(id).unwrap().is_empty());
    }

    #[test]
    fn test_single_part_base64() {
        let raw = b"Subject: x\r\nContent-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\nSGVsbG8gd29ybGQ=\r\n";
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        let id = mailbox.deliver(&raw[..]);
        let mut server = RawMailserver::new(mailbox);
        server.open(&config()).unwrap();
        assert_eq!(server.body(id).unwrap().content, "Hello world");
    }

    #[test]
    fn test_auth_plain_advisory_is_benign() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        mailbox.advertise(INSECURE_AUTH_PLAIN);
        let mut server = RawMailserver::new(mailbox);
        assert!(server.open(&config()).is_ok());
    }

    #[test]
    fn test_other_advisory_fails_open() {
        let mailbox = MemoryMailbox::new(Protocol::Imap);
        mailbox.advertise("Mailbox is locked");
        let mut server = RawMailserver::new(mailbox);
        let err = server.open(&config()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_operations_need_open_connection() {
        let mut server = RawMailserver::new(MemoryMailbox::new(Protocol::Imap));
        assert!(server.list_new().is_err());
        server.open(&config()).unwrap();
        server.close();
        server.close();
        assert!(matches!(
            server.list_new(),
            Err(MailpostError::InvalidState("closed"))
        ));
    }

    #[test]
    fn test_split_multipart() {
        let text = b"x\r\n--b\r\nA\r\n--b\r\nB\r\n--b--\r\n";
        assert_eq!(split_multipart(text, "b"), vec![&b"A"[..], &b"B"[..]]);
    }
}

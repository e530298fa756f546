//! MIME structure: body selection, attachment listing and part extraction.
//!
//! Parts are addressed by IMAP section numbers (`"1"`, `"2.1"`), computed by
//! walking the tree `mail-parser` builds. A single-part message has one
//! section, `"1"`.

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use tracing::debug;

use super::body::finish_text;
use crate::error::{MailpostError, Result};
use crate::model::attachment::{synthesize_name, AttachmentDescriptor, Disposition, MimePartId};
use crate::model::message::MessageBody;

/// Parse a complete raw message.
pub fn parse_message(raw: &[u8]) -> Result<Message<'_>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(MailpostError::Mime("Message is empty".into()));
    }
    MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailpostError::Mime("Message could not be parsed".into()))
}

/// Pick the part that becomes the post body.
///
/// The first HTML part wins, then the first plain-text part. `mail-parser`
/// has already undone the transfer encoding and the charset; what is left is
/// tag stripping.
pub fn select_body(msg: &Message<'_>) -> Option<MessageBody> {
    let html = msg.html_body.iter().find_map(|&id| {
        let part = msg.parts.get(id as usize)?;
        match &part.body {
            PartType::Html(text) => Some((part, text)),
            _ => None,
        }
    });
    let chosen = html.or_else(|| {
        msg.text_body.iter().find_map(|&id| {
            let part = msg.parts.get(id as usize)?;
            match &part.body {
                PartType::Text(text) => Some((part, text)),
                _ => None,
            }
        })
    });

    let (part, text) = chosen?;
    let charset = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .unwrap_or("utf-8");
    Some(finish_text(text, charset))
}

/// Every leaf part with its section number, in tree order.
fn sections(msg: &Message<'_>) -> Vec<(MimePartId, usize)> {
    fn walk(msg: &Message<'_>, index: usize, section: &str, out: &mut Vec<(MimePartId, usize)>) {
        let Some(part) = msg.parts.get(index) else {
            return;
        };
        match &part.body {
            PartType::Multipart(children) => {
                for (n, &child) in children.iter().enumerate() {
                    let child_section = if section.is_empty() {
                        (n + 1).to_string()
                    } else {
                        format!("{section}.{}", n + 1)
                    };
                    walk(msg, child as usize, &child_section, out);
                }
            }
            _ => {
                let section = if section.is_empty() { "1" } else { section };
                out.push((MimePartId(section.to_string()), index));
            }
        }
    }

    let mut out = Vec::new();
    walk(msg, 0, "", &mut out);
    out
}

/// List the parts worth importing as media.
///
/// Only `attachment` parts and `inline` images are returned. Parts without a
/// filename get one from [`synthesize_name`], numbered by their position in
/// the returned list.
pub fn list_attachments(msg: &Message<'_>) -> Vec<AttachmentDescriptor> {
    let mut found = Vec::new();

    for (part_id, index) in sections(msg) {
        let Some(part) = msg.parts.get(index) else {
            continue;
        };
        let Some(disposition) = part
            .content_disposition()
            .and_then(|d| Disposition::from_header(d.ctype()))
        else {
            continue;
        };

        let (primary_type, mime_type) = match part.content_type() {
            Some(ct) => {
                let primary = ct.ctype().to_ascii_lowercase();
                let full = match ct.subtype() {
                    Some(sub) => format!("{primary}/{}", sub.to_ascii_lowercase()),
                    None => primary.clone(),
                };
                (primary, full)
            }
            None => ("application".to_string(), "application/octet-stream".to_string()),
        };

        let mut descriptor = AttachmentDescriptor {
            disposition,
            primary_type,
            mime_type,
            part_id,
            name: part.attachment_name().unwrap_or_default().to_string(),
        };
        if !descriptor.is_importable() {
            debug!(part = %descriptor.part_id, mime = %descriptor.mime_type, "Skipping inline non-image part");
            continue;
        }
        if descriptor.name.is_empty() {
            descriptor.name = synthesize_name(disposition, found.len() + 1, &descriptor.mime_type);
        }
        found.push(descriptor);
    }

    found
}

/// Decoded payload of the part at `part_id`.
pub fn part_contents(msg: &Message<'_>, part_id: &MimePartId) -> Result<Vec<u8>> {
    sections(msg)
        .into_iter()
        .find(|(id, _)| id == part_id)
        .and_then(|(_, index)| msg.parts.get(index))
        .map(|part| part.contents().to_vec())
        .ok_or_else(|| MailpostError::Mime(format!("No MIME part {part_id} in message")))
}

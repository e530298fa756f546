//! POP3 transport (RFC 1939): USER/PASS login, LIST, TOP, RETR, DELE, QUIT.
//!
//! POP3 has no read flag. Every message in the maildrop is new, and marking
//! a message deletes it when the session ends with QUIT.

use std::io::{BufRead, BufReader, Read, Write};

use tracing::{debug, info};

use super::stream::MailStream;
use super::{Flag, MailTransport};
use crate::config::{ConnectionConfig, Protocol};
use crate::error::{MailpostError, Result};
use crate::model::message::MessageId;
use crate::parser::header::split_message;

/// One line of a `LIST` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub msg_id: u32,
    pub msg_size: u64,
}

/// Line-oriented POP3 client over any byte stream.
pub struct Pop3Client<S: Read + Write> {
    stream: BufReader<S>,
}

impl<S: Read + Write> Pop3Client<S> {
    /// Wrap a connected stream and consume the server greeting.
    pub fn new(stream: S) -> Result<Self> {
        let mut client = Self {
            stream: BufReader::new(stream),
        };
        client
            .read_status()
            .map_err(|e| MailpostError::Connection(format!("POP3 greeting: {e}")))?;
        Ok(client)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.command(&format!("USER {username}"))
            .and_then(|_| self.command(&format!("PASS {password}")))
            .map(|_| ())
            .map_err(|e| MailpostError::Connection(format!("POP3 login: {e}")))
    }

    pub fn list(&mut self) -> Result<Vec<ListEntry>> {
        self.command("LIST")?;
        let lines = self.read_multiline()?;
        lines
            .iter()
            .map(|line| parse_list_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Headers plus `lines` lines of body.
    pub fn top(&mut self, id: u32, lines: u32) -> Result<Vec<u8>> {
        self.command(&format!("TOP {id} {lines}"))?;
        self.read_multiline().map(join_lines)
    }

    pub fn retr(&mut self, id: u32) -> Result<Vec<u8>> {
        self.command(&format!("RETR {id}"))?;
        self.read_multiline().map(join_lines)
    }

    pub fn dele(&mut self, id: u32) -> Result<()> {
        self.command(&format!("DELE {id}")).map(|_| ())
    }

    pub fn quit(&mut self) -> Result<()> {
        self.command("QUIT").map(|_| ())
    }

    /// Send one command and read its status line. Returns the text after `+OK`.
    fn command(&mut self, line: &str) -> Result<String> {
        // Never echo the password into the log.
        let shown = if line.starts_with("PASS ") { "PASS ****" } else { line };
        debug!(command = shown, "POP3 >");

        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        self.read_status()
    }

    fn read_status(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line)? == 0 {
            return Err(MailpostError::Protocol("POP3 server closed the connection".into()));
        }
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim().to_string())
        } else {
            Err(MailpostError::Protocol(format!("POP3 error: {line}")))
        }
    }

    /// Lines up to the terminating `.`, dot-unstuffed, without line endings.
    fn read_multiline(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let mut line = Vec::new();
            if self.stream.read_until(b'\n', &mut line)? == 0 {
                return Err(MailpostError::Protocol(
                    "POP3 response ended before terminator".into(),
                ));
            }
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line == b"." {
                return Ok(lines);
            }
            if line.starts_with(b"..") {
                line.remove(0);
            }
            lines.push(line);
        }
    }
}

fn parse_list_line(line: &str) -> Result<ListEntry> {
    let mut fields = line.split_whitespace();
    let parsed = fields
        .next()
        .and_then(|id| id.parse().ok())
        .zip(fields.next().and_then(|size| size.parse().ok()));
    match parsed {
        Some((msg_id, msg_size)) => Ok(ListEntry { msg_id, msg_size }),
        None => Err(MailpostError::Protocol(format!("Bad LIST line: {line}"))),
    }
}

fn join_lines(lines: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines.iter().map(|l| l.len() + 2).sum());
    for line in lines {
        out.extend_from_slice(&line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// POP3 over the network.
pub struct Pop3Transport {
    client: Pop3Client<MailStream>,
}

impl Pop3Transport {
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let stream = MailStream::connect(&config.host, config.port, config.secure)?;
        let mut client = Pop3Client::new(stream)?;
        client.login(&config.username, &config.password)?;
        info!(host = %config.host, "POP3 session open");
        Ok(Self { client })
    }
}

impl MailTransport for Pop3Transport {
    fn protocol(&self) -> Protocol {
        Protocol::Pop3
    }

    fn list_new(&mut self) -> Result<Vec<MessageId>> {
        Ok(self
            .client
            .list()?
            .into_iter()
            .map(|entry| MessageId(entry.msg_id))
            .collect())
    }

    fn fetch_header(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let raw = self.client.top(id.0, 0)?;
        Ok(split_message(&raw).0.to_vec())
    }

    fn fetch_text(&mut self, id: MessageId) -> Result<Vec<u8>> {
        let raw = self.client.retr(id.0)?;
        Ok(split_message(&raw).1.to_vec())
    }

    fn fetch_message(&mut self, id: MessageId) -> Result<Vec<u8>> {
        self.client.retr(id.0)
    }

    fn set_flag(&mut self, ids: &[MessageId], _flag: Flag) -> Result<()> {
        ids.iter().try_for_each(|id| self.client.dele(id.0))
    }

    fn logout(&mut self) -> Result<()> {
        self.client.quit()
    }
}

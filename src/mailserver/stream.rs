//! TCP stream, optionally wrapped in TLS, shared by the IMAP and POP3
//! transports.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::debug;

use crate::error::{MailpostError, Result};

/// A connected socket, plain or TLS.
#[derive(Debug)]
pub enum MailStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl MailStream {
    /// Connect to `host:port`, negotiating TLS first when `secure`.
    pub fn connect(host: &str, port: u16, secure: bool) -> Result<Self> {
        debug!(host, port, secure, "Opening mail socket");
        let tcp = TcpStream::connect((host, port))
            .map_err(|e| MailpostError::Connection(format!("{host}:{port}: {e}")))?;

        if !secure {
            return Ok(Self::Plain(tcp));
        }

        let connector = TlsConnector::builder().build()?;
        let tls = connector
            .connect(host, tcp)
            .map_err(|e| MailpostError::Connection(format!("TLS handshake with {host}: {e}")))?;
        Ok(Self::Tls(tls))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Read for MailStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for MailStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

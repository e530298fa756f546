//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILPOST_CONFIG` (environment variable)
//! 2. `~/.config/mailpost/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailpost\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The raw [`Config`] is what lives on disk. Once per check cycle it is
//! validated into an immutable [`PluginOptions`]; placeholder values from the
//! defaults count as "not configured".

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MailpostError, Result};

/// Host placeholder shipped in the defaults.
const PLACEHOLDER_HOST: &str = "mail.example.com";
/// Login placeholder shipped in the defaults.
const PLACEHOLDER_LOGIN: &str = "login@example.com";
/// Largest accepted site timezone offset, either side of UTC.
const MAX_GMT_OFFSET_HOURS: f64 = 24.0;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mailbox to poll.
    pub mailserver: MailserverConfig,
    /// How messages become posts.
    pub posting: PostingConfig,
    /// Users and taxonomies known to the local site.
    pub site: SiteConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the data directory (posts, media, cycle log, state).
    pub data_dir: Option<PathBuf>,
    /// Minimum number of seconds between two mailbox checks.
    pub check_interval_secs: u64,
    /// Skip the minimum interval between checks.
    pub debug: bool,
    /// Language for log messages ("en", "es"). Defaults to system locale.
    pub lang: Option<String>,
}

/// Mail protocol spoken to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "IMAP", alias = "imap")]
    Imap,
    #[serde(rename = "POP3", alias = "pop3")]
    Pop3,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imap => "IMAP",
            Self::Pop3 => "POP3",
        })
    }
}

/// Which mailserver implementation reads the messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Full MIME traversal: HTML body preferred, attachments imported.
    #[default]
    Mime,
    /// Headers and body text as the server hands them out; no attachments.
    Raw,
}

/// Mailbox credentials and behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailserverConfig {
    /// `IMAP` or `POP3`. Inferred from the port when absent.
    pub protocol: Option<Protocol>,
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Use implicit TLS. Inferred from the port when absent.
    pub ssl: Option<bool>,
    /// Delete processed messages instead of marking them read.
    pub delete_messages: bool,
    /// Mailserver implementation.
    pub backend: Backend,
}

/// How messages are turned into posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostingConfig {
    /// Category id used when the message has no `[category ...]` shortcode.
    pub default_category: Option<u64>,
    /// Require a `[pin ...]` shortcode matching `pin`.
    pub pin_required: bool,
    /// The shared secret.
    pub pin: String,
    /// Drop messages from unknown senders instead of queueing them.
    pub discard_pending: bool,
    /// Save posts from registered users as drafts.
    pub registered_pending: bool,
    /// Reply to the sender after each message.
    pub send_response: bool,
    /// Site timezone, in hours east of UTC.
    pub gmt_offset_hours: f64,
}

/// A user of the local site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Numeric user id.
    pub id: u64,
    /// Address the user sends mail from.
    pub email: String,
    /// May publish without review.
    #[serde(default)]
    pub can_publish: bool,
    /// Site administrator (owner of posts from unknown senders).
    #[serde(default)]
    pub admin: bool,
}

/// Users and taxonomies of the local site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Registered users.
    pub users: Vec<UserConfig>,
    /// Public custom taxonomies accepted as shortcodes.
    pub taxonomies: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
            check_interval_secs: 5 * 60,
            debug: false,
            lang: None,
        }
    }
}

impl Default for MailserverConfig {
    fn default() -> Self {
        Self {
            protocol: None,
            host: PLACEHOLDER_HOST.to_string(),
            port: 993,
            username: PLACEHOLDER_LOGIN.to_string(),
            password: String::new(),
            ssl: None,
            delete_messages: true,
            backend: Backend::Mime,
        }
    }
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            default_category: None,
            pin_required: false,
            pin: String::new(),
            discard_pending: false,
            registered_pending: false,
            send_response: false,
            gmt_offset_hours: 0.0,
        }
    }
}

// ── Validated options ───────────────────────────────────────────

/// Connection parameters for one check cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub secure: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Immutable, validated settings for one check cycle.
#[derive(Debug, Clone)]
pub struct PluginOptions {
    pub connection: ConnectionConfig,
    pub backend: Backend,
    pub delete_messages: bool,
    pub default_category: Option<u64>,
    /// `Some` only when a PIN is required.
    pub pin: Option<String>,
    pub discard_pending: bool,
    pub registered_pending: bool,
    pub send_response: bool,
    /// Site timezone offset in seconds.
    pub gmt_offset_secs: i64,
}

impl MailserverConfig {
    /// Explicit protocol, else POP3 for the POP3 ports, else IMAP.
    pub fn effective_protocol(&self) -> Protocol {
        match self.protocol {
            Some(p) => p,
            None if matches!(self.port, 110 | 995) => Protocol::Pop3,
            None => Protocol::Imap,
        }
    }

    /// Explicit TLS flag, else plaintext for the plaintext ports.
    pub fn effective_ssl(&self) -> bool {
        self.ssl.unwrap_or(!matches!(self.port, 110 | 143))
    }
}

impl Config {
    /// Validate the settings needed for a check cycle.
    ///
    /// Empty or placeholder credentials yield [`MailpostError::Unconfigured`];
    /// present but unusable values yield [`MailpostError::InvalidConfig`].
    pub fn plugin_options(&self) -> Result<PluginOptions> {
        let ms = &self.mailserver;
        let host = ms.host.trim();
        let username = ms.username.trim();

        if host.is_empty() || host == PLACEHOLDER_HOST {
            return Err(MailpostError::Unconfigured("mailserver.host".into()));
        }
        if username.is_empty() || username == PLACEHOLDER_LOGIN {
            return Err(MailpostError::Unconfigured("mailserver.username".into()));
        }
        if ms.port == 0 {
            return Err(MailpostError::InvalidConfig(
                "mailserver.port must be between 1 and 65535".into(),
            ));
        }

        let offset_hours = self.posting.gmt_offset_hours;
        if !offset_hours.is_finite() || offset_hours.abs() > MAX_GMT_OFFSET_HOURS {
            return Err(MailpostError::InvalidConfig(format!(
                "posting.gmt_offset_hours must be between -{MAX_GMT_OFFSET_HOURS} and {MAX_GMT_OFFSET_HOURS}"
            )));
        }

        let pin = if self.posting.pin_required {
            let pin = self.posting.pin.trim();
            if pin.is_empty() {
                return Err(MailpostError::InvalidConfig(
                    "posting.pin is required when pin_required is set".into(),
                ));
            }
            if pin.contains(']') || pin.contains(char::is_whitespace) {
                return Err(MailpostError::InvalidConfig(
                    "posting.pin cannot contain ']' or whitespace".into(),
                ));
            }
            Some(pin.to_string())
        } else {
            None
        };

        Ok(PluginOptions {
            connection: ConnectionConfig {
                protocol: ms.effective_protocol(),
                host: host.to_string(),
                port: ms.port,
                username: username.to_string(),
                password: ms.password.trim().to_string(),
                secure: ms.effective_ssl(),
            },
            backend: ms.backend,
            delete_messages: ms.delete_messages,
            default_category: self.posting.default_category,
            pin,
            discard_pending: self.posting.discard_pending,
            registered_pending: self.posting.registered_pending,
            send_response: self.posting.send_response,
            gmt_offset_secs: (offset_hours * 3600.0).round() as i64,
        })
    }
}

// ── Loading ─────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILPOST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailpost").join("config.toml"))
}

/// Return the data directory for posts, media, the cycle log and state.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailpost")
}

/// Return the tracing log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("mailpost.log")
}

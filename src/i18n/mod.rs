//! Internationalization (i18n) module.
//!
//! Localized strings for the cycle log, reply mails and CLI output.
//! English is the default language; Spanish is available as an alternative.

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Spanish
    Es,
}

impl Lang {
    /// Parse a language code string (e.g. "en", "es", "en_US", "es_ES").
    /// Returns `None` for unrecognized codes.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        let prefix = normalized.split(['_', '-', '.']).next().unwrap_or("");
        match prefix {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    /// Return the ISO 639-1 code for this language.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Initialize the global language. Call once at startup.
/// If already initialized, this is a no-op.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Get the currently configured language (defaults to English).
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect language from `MAILPOST_LANG`, `LC_MESSAGES` or `LANG`.
pub fn detect_system_lang() -> Lang {
    ["MAILPOST_LANG", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

/// Macro for defining translatable message functions.
/// Each function returns a `&'static str` based on the current language.
macro_rules! msg {
    ($name:ident, $en:expr, $es:expr) => {
        /// Returns a localized string for the current language.
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Es => $es,
            }
        }
    };
}

// ── General ──────────────────────────────────────────────────────

msg!(app_name, "mailpost", "mailpost");
msg!(
    app_about,
    "mailpost: turn the messages of an IMAP or POP3 mailbox into blog posts.",
    "mailpost: convierte los mensajes de un buz\u{f3}n IMAP o POP3 en entradas de blog."
);
msg!(
    app_long_about,
    "mailpost: turn the messages of an IMAP or POP3 mailbox into blog posts.\nShortcodes in the body set categories, tags, post format and custom\ntaxonomies; an optional PIN guards the mailbox.",
    "mailpost: convierte los mensajes de un buz\u{f3}n IMAP o POP3 en entradas de blog.\nLos shortcodes del cuerpo fijan categor\u{ed}as, etiquetas, formato y\ntaxonom\u{ed}as; un PIN opcional protege el buz\u{f3}n."
);

// ── CLI help strings ─────────────────────────────────────────────

msg!(
    help_verbose,
    "Verbose logging (-v info, -vv debug, -vvv trace)",
    "Registro detallado (-v info, -vv debug, -vvv trace)"
);
msg!(
    help_lang,
    "Language (en, es). Defaults to system locale",
    "Idioma (en, es). Por defecto usa el idioma del sistema"
);
msg!(
    help_cmd_check,
    "Check the mailbox once and post new messages",
    "Comprobar el buz\u{f3}n una vez y publicar los mensajes nuevos"
);
msg!(
    help_cmd_log,
    "Show the check log, newest first",
    "Mostrar el registro de comprobaciones, m\u{e1}s recientes primero"
);
msg!(
    help_cmd_preview,
    "Show the post a local .eml file would become, without saving anything",
    "Mostrar la entrada que generar\u{ed}a un fichero .eml local, sin guardar nada"
);
msg!(
    help_cmd_config,
    "Show the resolved configuration",
    "Mostrar la configuraci\u{f3}n resultante"
);
msg!(
    help_cmd_completions,
    "Generate shell completions",
    "Generar autocompletado para la shell"
);

// ── Cycle log ────────────────────────────────────────────────────

msg!(log_please_wait, "Please wait", "Por favor, espera");
msg!(
    log_to_check_again,
    "to check mail again!",
    "para volver a comprobar el correo."
);
msg!(log_error_occurred, "An error occurred:", "Se produjo un error:");
msg!(
    log_no_new_mail,
    "There doesn't seem to be any new mail.",
    "No parece haber correo nuevo."
);
msg!(log_found_one, "Found 1 new message.", "Encontrado 1 mensaje nuevo.");
msg!(log_found, "Found", "Encontrados");
msg!(log_new_messages, "new messages.", "mensajes nuevos.");
msg!(log_no_author_match, "No author match for", "Ning\u{fa}n autor coincide con");
msg!(log_subject, "Subject", "Asunto");
msg!(log_skipping, "skipping.", "se omite.");
msg!(
    log_failed_pin,
    "failed PIN authentication; discarding.",
    "no super\u{f3} la autenticaci\u{f3}n por PIN; se descarta."
);
msg!(log_posted, "Posted:", "Publicado:");
msg!(log_pending, " (pending)", " (pendiente)");
msg!(log_no_title, "(no title)", "(sin t\u{ed}tulo)");
msg!(
    log_fetch_failed,
    "Could not fetch message",
    "No se pudo descargar el mensaje"
);
msg!(
    log_unreadable,
    "Could not read message",
    "No se pudo leer el mensaje"
);
msg!(
    log_mark_failed,
    "Could not mark messages as processed:",
    "No se pudieron marcar los mensajes como procesados:"
);

// ── Reply mails ──────────────────────────────────────────────────

msg!(reply_success, "Success!", "\u{a1}Hecho!");
msg!(reply_failed, "Failed!", "\u{a1}Error!");

// ── CLI output ───────────────────────────────────────────────────

msg!(msg_config_file, "Config file", "Fichero de configuraci\u{f3}n");
msg!(msg_data_dir, "Data directory", "Directorio de datos");
msg!(msg_status, "Status", "Estado");
msg!(msg_last_checked, "Last checked", "\u{da}ltima comprobaci\u{f3}n");
msg!(msg_never, "never", "nunca");
msg!(msg_ready, "ready", "listo");
msg!(msg_not_configured, "not configured", "sin configurar");
msg!(msg_status_error, "error", "error");
msg!(msg_no_log, "The log is empty.", "El registro est\u{e1} vac\u{ed}o.");
msg!(msg_post_title, "Title", "T\u{ed}tulo");
msg!(msg_post_status, "Status", "Estado");
msg!(msg_post_author, "Author", "Autor");
msg!(msg_post_date, "Date", "Fecha");
msg!(msg_post_categories, "Categories", "Categor\u{ed}as");
msg!(msg_post_tags, "Tags", "Etiquetas");
msg!(msg_post_format, "Format", "Formato");
msg!(msg_attachments, "Attachments", "Adjuntos");
msg!(
    msg_no_post,
    "No post would be created.",
    "No se crear\u{ed}a ninguna entrada."
);
msg!(
    err_file_not_found,
    "File not found",
    "Fichero no encontrado"
);
msg!(
    err_config_unusable,
    "Configuration is not usable",
    "La configuraci\u{f3}n no es utilizable"
);

// ── Durations ────────────────────────────────────────────────────

/// A rough, human-readable span such as `5 mins` or `1 hour`.
pub fn human_interval(secs: u64) -> String {
    let (value, unit) = match secs {
        0..=59 => (secs.max(1), Unit::Second),
        60..=3599 => ((secs + 30) / 60, Unit::Minute),
        3600..=86_399 => ((secs + 1800) / 3600, Unit::Hour),
        _ => ((secs + 43_200) / 86_400, Unit::Day),
    };
    format!("{value} {}", unit.label(value == 1))
}

#[derive(Clone, Copy)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
}

impl Unit {
    fn label(self, singular: bool) -> &'static str {
        match (lang(), self, singular) {
            (Lang::En, Self::Second, true) => "second",
            (Lang::En, Self::Second, false) => "seconds",
            (Lang::En, Self::Minute, true) => "min",
            (Lang::En, Self::Minute, false) => "mins",
            (Lang::En, Self::Hour, true) => "hour",
            (Lang::En, Self::Hour, false) => "hours",
            (Lang::En, Self::Day, true) => "day",
            (Lang::En, Self::Day, false) => "days",
            (Lang::Es, Self::Second, true) => "segundo",
            (Lang::Es, Self::Second, false) => "segundos",
            (Lang::Es, Self::Minute, true) => "minuto",
            (Lang::Es, Self::Minute, false) => "minutos",
            (Lang::Es, Self::Hour, true) => "hora",
            (Lang::Es, Self::Hour, false) => "horas",
            (Lang::Es, Self::Day, true) => "d\u{ed}a",
            (Lang::Es, Self::Day, false) => "d\u{ed}as",
        }
    }
}

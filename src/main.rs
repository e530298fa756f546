//! CLI entry point for `mailpost`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use mailpost::check::{Checker, CycleReport};
use mailpost::config::{self, Config};
use mailpost::i18n;
use mailpost::mailserver::{factory, MemoryMailbox, NetworkConnector};
use mailpost::model::log::CheckStatus;
use mailpost::post::Posted;
use mailpost::site::local::{open_site, LocalMedia, LocalState};
use mailpost::site::StateStore;

#[derive(Parser)]
#[command(name = "mailpost", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Language (en, es). Defaults to system locale.
    #[arg(long, global = true, value_name = "LANG")]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the mailbox once
    Check {
        /// Ignore the minimum interval between checks
        #[arg(short, long)]
        force: bool,
    },
    /// Show the check log
    Log {
        #[arg(long)]
        json: bool,
        /// Show at most this many entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Preview the post a local message would become
    Preview {
        /// An RFC 822 message (.eml)
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Language from `--lang`, read from the raw args so --help is localized.
fn lang_from_args() -> Option<i18n::Lang> {
    let args: Vec<String> = std::env::args().collect();
    args.iter().enumerate().find_map(|(i, arg)| {
        let code = if arg == "--lang" {
            args.get(i + 1).map(String::as_str)
        } else {
            arg.strip_prefix("--lang=")
        };
        code.and_then(i18n::Lang::from_code)
    })
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command()
        .about(i18n::app_about())
        .long_about(i18n::app_long_about());

    let subcommands: Vec<clap::Command> = cmd
        .get_subcommands()
        .map(|sub| {
            let about = match sub.get_name() {
                "check" => i18n::help_cmd_check(),
                "log" => i18n::help_cmd_log(),
                "preview" => i18n::help_cmd_preview(),
                "config" => i18n::help_cmd_config(),
                "completions" => i18n::help_cmd_completions(),
                _ => return sub.clone(),
            };
            sub.clone().about(about)
        })
        .collect();

    for sub in subcommands {
        cmd = cmd.mut_subcommand(sub.get_name(), |_| sub.clone());
    }
    cmd.mut_arg("verbose", |a| a.help(i18n::help_verbose()))
        .mut_arg("lang", |a| a.help(i18n::help_lang()))
}

fn main() -> anyhow::Result<()> {
    let config = config::load_config();

    // Pick the language BEFORE clap parsing so --help is localized
    let lang = lang_from_args()
        .or_else(|| config.general.lang.as_deref().and_then(i18n::Lang::from_code))
        .unwrap_or_else(i18n::detect_system_lang);
    i18n::set_lang(lang);

    let matches = build_localized_command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Check { force } => cmd_check(&config, force),
        Commands::Log { json, limit } => cmd_log(&config, json, limit),
        Commands::Preview { file, json } => cmd_preview(&config, &file, json),
        Commands::Config => cmd_config(&config),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = log_file.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailpost.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailpost", &mut std::io::stdout());
    Ok(())
}

/// Run one check cycle against the configured mailbox.
fn cmd_check(config: &Config, force: bool) -> anyhow::Result<()> {
    let site = open_site(&config.site, &config::data_dir(config))?;
    let mut checker = Checker::new(factory(NetworkConnector), site);
    let report = checker.check_email(config, force)?;
    print_report(&report, &checker);

    if let CycleReport::Failed(line) = report {
        anyhow::bail!(line);
    }
    Ok(())
}

fn print_report(report: &CycleReport, checker: &Checker) {
    if let CycleReport::Unconfigured(reason) = report {
        println!("{}: {reason}", i18n::err_config_unusable());
        return;
    }
    // Everything else is already in the cycle log; show its newest entry.
    if let Ok(log) = checker.site().state.log() {
        if let Some(entry) = log.first() {
            println!("{}", entry.message);
        }
    }
}

/// Print the cycle log, newest first.
fn cmd_log(config: &Config, json: bool, limit: usize) -> anyhow::Result<()> {
    let state = LocalState::new(&config::data_dir(config));
    let entries: Vec<_> = state.log()?.into_iter().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", i18n::msg_no_log());
        return Ok(());
    }
    for entry in entries {
        let marker = if entry.is_error { "!" } else { " " };
        let stamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
        let mut lines = entry.message.lines();
        println!("{marker} {stamp}  {}", lines.next().unwrap_or_default());
        for line in lines {
            println!("{:23}{line}", "");
        }
    }
    Ok(())
}

/// Run a local message through the whole cycle against a scratch copy of
/// the site, then show the resulting post.
fn cmd_preview(config: &Config, file: &Path, json: bool) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("{}: {}", i18n::err_file_not_found(), file.display());
    }
    let raw = std::fs::read(file)?;

    let scratch = tempfile::tempdir()?;
    let categories = config::data_dir(config).join("categories.json");
    if categories.exists() {
        std::fs::copy(&categories, scratch.path().join("categories.json"))?;
    }

    let mut preview = config.clone();
    preview.general.data_dir = Some(scratch.path().to_path_buf());
    preview.posting.send_response = false;
    if preview.plugin_options().is_err() {
        // Any usable credentials do; the mailbox is in memory.
        preview.mailserver.host = "preview.invalid".into();
        preview.mailserver.username = "preview".into();
    }

    let mailbox = MemoryMailbox::new(preview.mailserver.effective_protocol());
    mailbox.deliver(raw);
    let site = open_site(&preview.site, scratch.path())?;
    let mut checker = Checker::new(factory(mailbox), site);
    let report = checker.check_email(&preview, true)?;

    let posted = match &report {
        CycleReport::Completed { posted, .. } => posted.as_slice(),
        CycleReport::Unconfigured(reason) => anyhow::bail!("{}: {reason}", i18n::err_config_unusable()),
        _ => &[][..],
    };

    if json {
        let drafts: Vec<_> = posted.iter().map(|p| &p.draft).collect();
        println!("{}", serde_json::to_string_pretty(&drafts)?);
        return Ok(());
    }

    match posted.first() {
        Some(post) => print_post(post, &LocalMedia::new(scratch.path())),
        None => {
            println!("{}", i18n::msg_no_post());
            if let Some(entry) = checker.site().state.log()?.first() {
                println!("{}", entry.message);
            }
        }
    }
    Ok(())
}

fn print_post(post: &Posted, media: &LocalMedia) {
    use humansize::{format_size, BINARY};

    let draft = &post.draft;
    println!("{:12} {}", i18n::msg_post_title(), draft.title);
    println!("{:12} {}", i18n::msg_post_status(), draft.status.as_str());
    println!(
        "{:12} {} ({})",
        i18n::msg_post_author(),
        draft.author_id,
        post.author_email.as_deref().unwrap_or("-")
    );
    println!("{:12} {}", i18n::msg_post_date(), draft.date_local);
    println!("{:12} {:?}", i18n::msg_post_categories(), draft.category_ids);
    if !draft.tag_names.is_empty() {
        println!("{:12} {}", i18n::msg_post_tags(), draft.tag_names.join(", "));
    }
    if let Some(format) = &draft.post_format {
        println!("{:12} {format}", i18n::msg_post_format());
    }
    for terms in &draft.taxonomy_terms {
        println!("{:12} {}", terms.taxonomy, terms.terms.join(", "));
    }

    if let Ok(files) = media.all() {
        if !files.is_empty() {
            println!("{}:", i18n::msg_attachments());
            for file in files {
                let size = std::fs::metadata(&file.file).map(|m| m.len()).unwrap_or(0);
                let name = file.file.file_name().unwrap_or_default().to_string_lossy();
                println!("  {name} ({}, {})", file.mime_type, format_size(size, BINARY));
            }
        }
    }

    println!();
    println!("{}", draft.content);
}

/// Show the resolved configuration with the password masked.
fn cmd_config(config: &Config) -> anyhow::Result<()> {
    let path = config::config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());
    let data_dir = config::data_dir(config);
    let state = LocalState::new(&data_dir).state().unwrap_or_default();

    println!("{:16} {path}", i18n::msg_config_file());
    println!("{:16} {}", i18n::msg_data_dir(), data_dir.display());
    let usable = match config.plugin_options() {
        Ok(_) => i18n::msg_ready().to_string(),
        Err(e) => format!("{} ({e})", i18n::msg_not_configured()),
    };
    let status = match state.status {
        CheckStatus::Error => i18n::msg_status_error(),
        CheckStatus::Ok => i18n::msg_ready(),
        CheckStatus::Unconfigured => i18n::msg_not_configured(),
    };
    println!("{:16} {usable} / {status}", i18n::msg_status());
    let last = state
        .last_checked
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| i18n::msg_never().to_string());
    println!("{:16} {last}", i18n::msg_last_checked());
    println!();

    let mut shown = config.clone();
    if !shown.mailserver.password.is_empty() {
        shown.mailserver.password = "********".into();
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

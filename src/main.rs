//! Disclosure Explorer CLI
//!
//! Command-line client for the disclosure backend:
//! - Show or reset the session id
//! - Upload XBRL packages or xBRL-JSON documents
//! - Switch to the preloaded sample or another assistant mode
//! - Chat with the disclosure assistant

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use disclosure_explorer::chat::{
    ChatSession, ChatSessionConfig, ChatSnapshot, ConnectionState, Role,
};
use disclosure_explorer::config::{generate_default_config, Config, LoggingConfig};
use disclosure_explorer::render::render_text_line;
use disclosure_explorer::session::{SessionId, SessionIdentity};
use disclosure_explorer::upload::{AssistantMode, FileKind, UploadClient, UploadRequest};
use disclosure_explorer::view::ViewStore;

#[derive(Parser)]
#[command(name = "disclosure")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explore corporate sustainability disclosures")]
#[command(long_about = "Disclosure Explorer client.\nUpload XBRL filings, convert them to JSON, and ask the assistant about ESRS disclosures.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: platform config dir, then ./disclosure.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// WebSocket origin (default: derived from the backend URL)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the session id
    Session {
        /// Start a fresh session
        #[arg(long)]
        reset: bool,
    },

    /// Upload a filing
    Upload {
        /// XBRL package (.zip, .xhtml, ...) or xBRL-JSON document
        path: PathBuf,
        /// Treat the file as xBRL-JSON regardless of extension
        #[arg(long)]
        json: bool,
        /// Where to save the converted JSON (default: <name>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Use the backend's preloaded sample filing
    Preloaded,

    /// Switch the assistant mode (preloaded, user_json, converted_xbrl)
    Mode { mode: AssistantMode },

    /// Chat with the assistant
    Chat,

    /// Print a default config file
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.backend.base_url = url.clone();
    }
    if let Some(url) = &cli.ws_url {
        config.chat.ws_url = Some(url.clone());
    }

    init_logging(&config.logging);

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_deref());
    }

    let store = config
        .session
        .open_store()
        .context("Failed to open session store")?;
    let identity = Arc::new(SessionIdentity::new(store));

    match cli.command {
        Commands::Session { reset } => {
            if reset {
                identity.adopt(SessionId::generate());
            }
            println!("{}", identity.session_id());
        }
        Commands::Upload { path, json, output } => {
            let client = UploadClient::from_config(&config.backend, Arc::clone(&identity))?;
            upload(&client, &path, json, output).await?;
        }
        Commands::Preloaded => {
            let client = UploadClient::from_config(&config.backend, Arc::clone(&identity))?;
            let outcome = client.submit(UploadRequest::Preloaded).await?;
            if let Some(message) = outcome.message {
                println!("{}", message);
            }
            println!("{}", outcome.status.describe());
        }
        Commands::Mode { mode } => {
            let client = UploadClient::from_config(&config.backend, Arc::clone(&identity))?;
            client.switch_mode(mode).await?;
            println!("Assistant mode: {}", mode);
        }
        Commands::Chat => chat(&config, identity).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("disclosure_explorer={},disclosure={}", config.level, config.level))
    });

    // Logs go to stderr; stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn write_default_config(output: Option<&Path>) -> anyhow::Result<()> {
    let content = generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

async fn upload(
    client: &UploadClient,
    path: &Path,
    json: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let kind = if json {
        FileKind::Json
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        FileKind::from_file_name(&name)
    };

    let request = UploadRequest::from_path(path, kind).await?;
    let outcome = client.submit(request).await?;

    if let Some(message) = &outcome.message {
        println!("{}", message);
    }
    println!("{}", outcome.status.describe());

    if outcome.json_data.is_some() {
        let target = output.unwrap_or_else(|| PathBuf::from(outcome.download_name()));
        let written = outcome.write_json(&target).await?;
        println!("Saved converted JSON to {}", written.display());
    }

    Ok(())
}

const CHAT_HELP: &str = "Commands: /tab <convert|chat|about|docs>, /reconnect, /status, /quit";

async fn chat(config: &Config, identity: Arc<SessionIdentity>) -> anyhow::Result<()> {
    let store = identity.store();
    let view = ViewStore::restore(store.as_ref(), config.view.default_tab);
    let mut tabs = view.subscribe();

    let session = ChatSession::spawn(ChatSessionConfig::from_config(config), Arc::clone(&identity));
    let mut snapshots = session.subscribe();
    let mut notices = session.notices();

    println!("Session {} ({} tab). {}", identity.session_id(), view.active(), CHAT_HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;
    let mut connection = ConnectionState::Connecting;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(line.trim(), &session, &view) {
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                report(&snapshot, &mut printed, &mut connection);
            }
            notice = notices.recv() => match notice {
                Ok(notice) => eprintln!("! {}", notice),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed chat notices");
                }
                Err(RecvError::Closed) => break,
            },
            Some(tab) = tabs.changed() => println!("[{} tab]", tab),
        }
    }

    ViewStore::remember_for_reload(store.as_ref(), view.active());
    session.shutdown().await;
    Ok(())
}

/// Returns false when the user asked to leave
fn handle_line(line: &str, session: &ChatSession, view: &ViewStore) -> bool {
    match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit" | "/exit", _) => return false,
        ("/help", _) => println!("{}", CHAT_HELP),
        ("/reconnect", _) => session.reconnect_now(),
        ("/status", _) => {
            let snapshot = session.snapshot();
            println!(
                "{} ({} messages, {} reconnect attempts)",
                snapshot.connection,
                snapshot.messages.len(),
                snapshot.reconnect_attempt
            );
        }
        ("/tab", name) => {
            if let Err(e) = view.switch_to(name) {
                eprintln!("{}", e);
            }
        }
        _ if line.is_empty() => {}
        _ => {
            if !session.send(line) {
                eprintln!("Not connected; message not sent");
            }
        }
    }
    true
}

/// Print newly completed assistant replies and connection changes
fn report(snapshot: &ChatSnapshot, printed: &mut usize, connection: &mut ConnectionState) {
    for message in snapshot.messages.iter().skip(*printed) {
        if !message.complete {
            break;
        }
        if message.role == Role::Assistant {
            println!("{}", render_text_line(message));
        }
        *printed += 1;
    }

    if snapshot.connection != *connection {
        *connection = snapshot.connection;
        eprintln!("[{}]", snapshot.connection);
        if snapshot.gave_up() {
            eprintln!("Connection lost. Type /reconnect to try again.");
        }
    }
}

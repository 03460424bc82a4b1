use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;

use lco_gateway::client::{BridgeClient, ClientEvent, ClientOptions};
use lco_gateway::config;
use lco_gateway::events::EventBus;
use lco_gateway::filter::OriginFilter;
use lco_gateway::format::format_count;
use lco_gateway::render::{self, DisplayPrefs};
use lco_gateway::settings::SettingsStore;
use lco_types::connection::ConnectionState;
use lco_types::event::{Event, FeedEntry};
use lco_types::settings::{SettingKey, Settings};

#[derive(Parser)]
#[command(name = "lco", version, about = "LAPLACE Chat Overlay: live-stream chat on your desktop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feed in the terminal instead of the overlay
    Tail {
        /// Bridge host (defaults to the saved setting)
        #[arg(long)]
        host: Option<String>,
        /// Bridge port (defaults to the saved setting)
        #[arg(long)]
        port: Option<u16>,
        /// Bridge auth token (defaults to the saved password)
        #[arg(long)]
        token: Option<String>,
        /// Comma-separated room IDs to keep (defaults to the saved list)
        #[arg(long)]
        origins: Option<String>,
        /// Also print interaction, free-gift and entry-effect events
        #[arg(long)]
        all: bool,
    },
    /// Show settings and whether the bridge is reachable
    Status {
        /// Skip the connection check
        #[arg(long)]
        offline: bool,
    },
    /// Read or change saved settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every setting
    List,
    /// Print one setting
    Get { key: String },
    /// Change one setting; a running overlay picks it up
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
    /// Print the settings file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tungstenite=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => launch_shell(),
        Some(Commands::Tail {
            host,
            port,
            token,
            origins,
            all,
        }) => {
            let mut settings = config::load_settings(&config::settings_path())?;
            if let Some(host) = host {
                settings.server_host = host;
            }
            if let Some(port) = port {
                settings.server_port = port;
            }
            if let Some(token) = token {
                settings.server_password = token;
            }
            if let Some(origins) = origins {
                settings.allowed_origins = origins;
            }
            tail(&settings, all).await
        }
        Some(Commands::Status { offline }) => status(offline).await,
        Some(Commands::Settings { action }) => settings_command(action),
    }
}

/// Default: start the desktop overlay that sits next to this binary.
fn launch_shell() -> Result<()> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().context("Executable has no parent directory")?;
    let shell = dir.join(format!("lco-shell{}", std::env::consts::EXE_SUFFIX));
    if !shell.exists() {
        bail!(
            "{} not found next to {}; run `lco tail` for a terminal feed",
            shell.display(),
            exe.display()
        );
    }
    std::process::Command::new(&shell)
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to launch lco-shell: {e}"))?;
    println!("Launched LAPLACE Chat Overlay.");
    Ok(())
}

async fn tail(settings: &Settings, all: bool) -> Result<()> {
    let options = ClientOptions::from_settings(settings);
    let filter = OriginFilter::parse(&settings.allowed_origins);
    let prefs = if all {
        DisplayPrefs {
            show_interaction_events: true,
            show_gift_free: true,
            show_entry_effect: true,
        }
    } else {
        DisplayPrefs::from(settings)
    };

    tracing::info!("Tailing {} (Ctrl-C to stop)", options.url);
    if !filter.is_empty() {
        tracing::info!("Rooms: {}", filter.rooms().join(", "));
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = BridgeClient::connect(options, tx);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Some(ClientEvent::State(state)) => tracing::info!("Bridge {state}"),
                Some(ClientEvent::Event(event)) => {
                    if !filter.allows(&event) {
                        continue;
                    }
                    if let Some(line) = feed_line(event, &prefs) {
                        println!("{line}");
                    }
                }
                None => break,
            },
        }
    }

    client.disconnect().await;
    Ok(())
}

fn feed_line(event: Event, prefs: &DisplayPrefs) -> Option<String> {
    if let Event::OnlineUpdate(update) = &event {
        return Some(format!("-- {} online", format_count(update.online)));
    }
    let entry = FeedEntry::new(event);
    let rendered = render::render(&entry, prefs)?;
    let time = entry
        .received_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    Some(format!("[{time}] {}", rendered.text))
}

async fn status(offline: bool) -> Result<()> {
    let path = config::settings_path();
    let settings = config::load_settings(&path)?;
    let filter = OriginFilter::parse(&settings.allowed_origins);

    println!("LAPLACE Chat Overlay v{}", env!("CARGO_PKG_VERSION"));
    println!("Settings: {}", path.display());
    println!("Bridge: {}", settings.bridge_url());
    println!(
        "Password: {}",
        if settings.server_password.is_empty() { "not set" } else { "set" }
    );
    println!(
        "Rooms: {}",
        if filter.is_empty() { "all".to_string() } else { filter.rooms().join(", ") }
    );
    if offline {
        return Ok(());
    }

    let state = check_bridge(&settings).await;
    println!(
        "Connection: {}",
        if state.is_connected() { "reachable" } else { "unreachable" }
    );
    Ok(())
}

/// One connection attempt, no retries.
async fn check_bridge(settings: &Settings) -> ConnectionState {
    let mut options = ClientOptions::from_settings(settings);
    options.reconnect.enabled = false;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = BridgeClient::connect(options, tx);

    let outcome = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(event) = rx.recv().await {
            match event {
                ClientEvent::State(state @ (ConnectionState::Connected | ConnectionState::Disconnected)) => {
                    return state;
                }
                _ => {}
            }
        }
        ConnectionState::Disconnected
    })
    .await
    .unwrap_or(ConnectionState::Disconnected);

    client.disconnect().await;
    outcome
}

fn settings_command(action: SettingsAction) -> Result<()> {
    let path = config::settings_path();
    let open = || SettingsStore::open(&path, EventBus::new());

    match action {
        SettingsAction::Path => println!("{}", path.display()),
        SettingsAction::List => {
            let store = open()?;
            for key in SettingKey::ALL {
                println!("{key} = {}", store.get(key));
            }
        }
        SettingsAction::Get { key } => {
            let key: SettingKey = key.parse()?;
            println!("{}", open()?.get(key));
        }
        SettingsAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            let store = open()?;
            let value = parse_value(&store.get(key), value);
            if store.set(key, value)? {
                println!("{key} = {}", store.get(key));
            } else {
                println!("{key} unchanged");
            }
        }
        SettingsAction::Reset => {
            let changed = open()?.reset()?;
            println!("Reset {} setting(s) to defaults", changed.len());
        }
    }
    Ok(())
}

/// Command-line text to a setting value. String settings take the text
/// as-is; others are parsed as JSON, falling back to a string.
fn parse_value(current: &Value, raw: String) -> Value {
    if current.is_string() {
        return Value::String(raw);
    }
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

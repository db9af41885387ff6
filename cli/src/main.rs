// swpush: developer CLI for the web push client
//
// Generates and decodes VAPID keys, previews notifications and click routing, checks stored
// subscriptions and manages the client config the page and worker load.

mod config;
mod keygen;
mod preview;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use swpush_core::ClientConfig;

use crate::config::ConfigStore;

#[derive(Parser)]
#[command(name = "swpush")]
#[command(about = "swpush: Web Push client toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the per-user one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with VAPID application server keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Preview the notification a push payload renders
    Payload {
        /// Raw push data (JSON object or text); omit for an empty push
        data: Option<String>,
        /// Read the push data from a file
        #[arg(short, long, conflicts_with = "data")]
        file: Option<PathBuf>,
    },
    /// Preview what a notification click does
    Click {
        /// Number of open window clients
        #[arg(short, long, default_value = "0")]
        windows: usize,
        /// The `url` carried in the notification data
        #[arg(short, long)]
        url: Option<String>,
        /// Simulate a browser without clients.openWindow
        #[arg(long)]
        no_open_window: bool,
    },
    /// Check a stored PushSubscription JSON file
    Subscription { file: PathBuf },
    /// Manage the client configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Generate a new VAPID key pair
    Generate {
        /// Also store the public key as vapidPublicKey in the config
        #[arg(long)]
        save: bool,
    },
    /// Print the decoded key bytes as hex
    Decode { key: String },
    /// Report length, point format and canonical encoding
    Inspect { key: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        #[arg(long)]
        vapid_key: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// Print the config as the page receives it
    Show,
    Set { key: String, value: String },
    Get { key: String },
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::default_location()?,
    };
    tracing::debug!("using config file {}", store.path().display());

    match cli.command {
        Commands::Key { action } => cmd_key(&store, action),
        Commands::Payload { data, file } => cmd_payload(&store, data, file),
        Commands::Click {
            windows,
            url,
            no_open_window,
        } => cmd_click(&store, windows, url, !no_open_window),
        Commands::Subscription { file } => cmd_subscription(file),
        Commands::Config { action } => cmd_config(&store, action),
    }
}

fn cmd_key(store: &ConfigStore, action: KeyAction) -> Result<()> {
    match action {
        KeyAction::Generate { save } => {
            let pair = keygen::generate()?;
            let public_key = pair.public_key.to_url_safe();
            println!("{}", "Public Key (vapidPublicKey)".bold());
            println!("{}", public_key.bright_green());
            println!();
            println!("{}", "Private Key".bold());
            print!("{}", pair.private_pem);

            if save {
                store.set("vapidPublicKey", &public_key)?;
                eprintln!("{} Saved public key to {}", "✓".green(), store.path().display());
            }
        }

        KeyAction::Decode { key } => {
            let report = preview::inspect_key(&key)?;
            println!("{}", hex::encode(&report.bytes));
        }

        KeyAction::Inspect { key } => {
            let report = preview::inspect_key(&key)?;
            println!("{}", "VAPID Public Key".bold());
            println!("  Length:    {} bytes", report.bytes.len());
            if report.uncompressed_p256 {
                println!("  {} Uncompressed P-256 point", "✓".green());
            } else {
                println!(
                    "  {} Not an uncompressed P-256 point; push services will reject it",
                    "✗".red()
                );
            }
            if report.canonical != key.trim() {
                println!("  Canonical: {}", report.canonical.bright_yellow());
            }
            println!("  Hex:       {}", hex::encode(&report.bytes).dimmed());
        }
    }

    Ok(())
}

fn cmd_payload(store: &ConfigStore, data: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let config = store.load()?;
    let data = match file {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => data,
    };

    let rendered = preview::render_payload(data.as_deref(), &config);
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

fn cmd_click(
    store: &ConfigStore,
    windows: usize,
    url: Option<String>,
    can_open_window: bool,
) -> Result<()> {
    let config = store.load()?;
    let action = preview::describe_click(windows, can_open_window, url.as_deref(), &config);
    println!("{} {}", "→".bright_cyan(), action);
    Ok(())
}

fn cmd_subscription(file: PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let subscription = preview::check_subscription(&contents)?;

    println!("{} Subscription is well formed", "✓".green());
    println!("  Endpoint: {}", subscription.endpoint.bright_cyan());
    match subscription.expiration_time {
        Some(ms) => println!("  Expires:  {} (ms since epoch)", ms),
        None => println!("  Expires:  {}", "never".dimmed()),
    }
    Ok(())
}

fn cmd_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { vapid_key, force } => {
            let config = store.init(vapid_key, force)?;
            println!("{} Wrote {}", "✓".green(), store.path().display());
            if config.vapid_public_key.is_empty() {
                println!(
                    "  Next: {}",
                    "swpush config set vapidPublicKey <key>".bright_green()
                );
            }
        }

        ConfigAction::Show => {
            let config = store.load()?;
            println!("{}", config.to_json_pretty()?);
            if let Err(e) = config.validate() {
                eprintln!("{} {}", "⚠".yellow(), e);
            }
        }

        ConfigAction::Set { key, value } => {
            store.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            let config = store.load()?;
            match config.get(&key) {
                Some(value) => println!("{} = {}", key.bright_cyan(), value),
                None => anyhow::bail!(
                    "Unknown config key: {} (known: {})",
                    key,
                    ClientConfig::keys().join(", ")
                ),
            }
        }

        ConfigAction::List => {
            let config = store.load()?;
            println!("{}", "Configuration".bold());
            println!("  {}", store.path().display().to_string().dimmed());
            println!();
            for (key, value) in config::list(&config) {
                println!("  {:<28} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}

//! Keychain CLI
//!
//! Drives snapshot transfers against file-backed storage and cookies.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keychain::commands::{self, load_config, Paths};
use keychain::config::default_config_path;

#[derive(Parser)]
#[command(name = "keychain")]
#[command(about = "Keychain snapshot transfer tool")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Custom local storage file path
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Custom cookie jar file path
    #[arg(long, global = true)]
    cookies: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Carry local state across a redirect
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Encrypt local state and print the URL carrying it
    Create {
        /// URL to navigate to
        #[arg(long)]
        url: String,
    },

    /// Restore local state from a URL carrying a snapshot
    Restore {
        /// URL returned to
        #[arg(long)]
        url: String,
    },

    /// Expire the snapshot key cookie
    Clear,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite without asking
        #[arg(long)]
        force: bool,
    },

    /// Print the effective config
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let paths = Paths::resolve(config_path, cli.storage, cli.cookies);

    match cli.command {
        Commands::Snapshot { action } => {
            let config = load_config(&paths.config)?;
            match action {
                SnapshotCommand::Create { url } => {
                    commands::snapshot::create(&config, &paths, &url).map(|_| ())
                }
                SnapshotCommand::Restore { url } => {
                    commands::snapshot::restore(&config, &paths, &url).map(|_| ())
                }
                SnapshotCommand::Clear => commands::snapshot::clear(&config, &paths),
            }
        }
        Commands::Config { action } => match action {
            ConfigCommand::Init { force } => commands::config::init(&paths.config, force),
            ConfigCommand::Show => commands::config::show(&paths.config),
        },
    }
}

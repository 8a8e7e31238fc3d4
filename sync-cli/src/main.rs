//! # liftsync
//!
//! CLI tool for checking workout plans and exercising the live session sync
//! without a phone or a watch.
//!
//! ## Commands
//!
//! - `validate-plan`: Check a plan file and print its structure
//! - `simulate`: Run a scripted workout between two in-process devices
//! - `history`: List finished sessions saved by a simulated device
//!
//! ## Example
//!
//! ```bash
//! # Check a plan
//! liftsync validate-plan push-day.json
//!
//! # Watch leads, link drops after the third set
//! liftsync simulate --plan push-day.json --originator watch --offline-after 3
//!
//! # Show what the watch saved
//! liftsync history --device watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use liftsync_types::DeviceRole;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{history, simulate, validate};

/// CLI tool for checking workout plans and simulating liftsync sessions.
#[derive(Parser, Debug)]
#[command(name = "liftsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding one store per simulated device
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a plan file and print its exercises
    ValidatePlan {
        /// Plan file (JSON)
        file: PathBuf,
    },

    /// Run a scripted workout between a phone and a watch
    Simulate {
        /// Plan file (JSON)
        #[arg(long, short)]
        plan: PathBuf,

        /// Device configuration (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Device that starts and ends the session
        #[arg(long, value_enum, default_value = "watch")]
        originator: Role,

        /// Take the link down after this many logged sets, then bring it back before ending
        #[arg(long)]
        offline_after: Option<u32>,

        /// Pause between scripted actions, in milliseconds
        #[arg(long, default_value = "150")]
        step_ms: u64,
    },

    /// List finished sessions saved by a device
    History {
        /// Device whose store to read
        #[arg(long, value_enum, default_value = "watch")]
        device: Role,
    },
}

/// Device selector for the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Phone,
    Watch,
}

impl From<Role> for DeviceRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Phone => DeviceRole::Phone,
            Role::Watch => DeviceRole::Watch,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cli.command {
        Commands::ValidatePlan { file } => {
            validate::run(&file).await?;
        }
        Commands::Simulate {
            plan,
            config,
            originator,
            offline_after,
            step_ms,
        } => {
            let options = simulate::SimulateOptions {
                plan,
                config,
                originator: originator.into(),
                offline_after,
                step: std::time::Duration::from_millis(step_ms),
            };
            simulate::run(&data_dir, &options).await?;
        }
        Commands::History { device } => {
            history::run(&data_dir, device.into()).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for liftsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "liftsync", "liftsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

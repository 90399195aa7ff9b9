//! convoyd — the Convoy daemon.
//!
//! Loads scheduler configuration and reconciles app manifests. Until a real
//! cluster backend is wired in, reconciles run against the in-memory
//! cluster, load balancing and DNS backends.
//!
//! # Usage
//!
//! ```text
//! convoyd check-config /etc/convoy/convoy.toml
//! convoyd sandbox demos/acme.toml --config demos/convoy.toml --logs
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use convoy_scheduler::SchedulerConfig;
use tracing::info;

mod sandbox;

#[derive(Parser)]
#[command(name = "convoyd", about = "Convoy daemon", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a scheduler configuration file.
    CheckConfig {
        /// Path to the TOML configuration.
        path: PathBuf,

        /// Only check the fields a scheduler without load balancers needs.
        #[arg(long)]
        no_load_balancers: bool,
    },
    /// Reconcile an app manifest against in-memory backends and print the
    /// resulting state.
    Sandbox {
        /// Path to the app manifest (TOML).
        manifest: PathBuf,

        /// Scheduler configuration. A sandbox configuration is used when
        /// omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Domain of the sandbox hosted zone.
        #[arg(long, default_value = "convoy.local")]
        domain: String,

        /// Stream the sandbox's instance log after reconciling.
        #[arg(long)]
        logs: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::CheckConfig {
            path,
            no_load_balancers,
        } => check_config(&path, !no_load_balancers),
        Command::Sandbox {
            manifest,
            config,
            domain,
            logs,
        } => {
            let config = match config {
                Some(path) => SchedulerConfig::from_file(&path)?,
                None => sandbox::default_config(),
            };
            let report = sandbox::run(&config, &manifest, &domain, logs).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,convoy=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check_config(path: &Path, load_balanced: bool) -> anyhow::Result<()> {
    let config = SchedulerConfig::from_file(path)?;
    if load_balanced {
        config.validate_load_balanced()?;
    } else {
        config.validate()?;
    }
    info!(path = ?path, cluster = %config.cluster, load_balanced, "configuration is valid");
    println!("{}: ok", path.display());
    Ok(())
}

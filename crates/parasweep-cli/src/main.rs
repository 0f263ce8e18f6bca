//! parasweep command-line interface
//!
//! Expands a parameter scan from a YAML run configuration into batch jobs
//! and hands them to the cluster's scheduler.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{clusters, plan, submit};

/// parasweep - parameter sweeps on HPC batch schedulers
#[derive(Parser)]
#[command(name = "parasweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand, allocate and render every job without submitting
    Plan {
        /// Run configuration (YAML)
        config: PathBuf,

        /// Write the rendered scripts into this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render and submit every job of the sweep
    Submit {
        /// Run configuration (YAML)
        config: PathBuf,

        /// Record what would be submitted without running any command
        #[arg(long)]
        dry_run: bool,

        /// Seconds to wait for each submission command
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Write the sweep report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List built-in cluster profiles
    Clusters,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Plan { config, out } => plan::execute(&config, out.as_deref()),

        Commands::Submit {
            config,
            dry_run,
            timeout,
            report,
        } => submit::execute(&config, dry_run, timeout, report.as_deref()).await,

        Commands::Clusters => {
            clusters::execute();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

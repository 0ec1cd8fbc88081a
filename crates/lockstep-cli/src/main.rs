use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lockstep_core::LogCode;
use tracing_subscriber::EnvFilter;

mod dispatch;
mod flows;
mod render;

use dispatch::run_cli;
use flows::parse_log_code;

const LOG_ENV: &str = "LOCKSTEP_LOG";

#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(about = "Deterministic package restore for multi-project workspaces", long_about = None)]
struct Cli {
    /// Settings file. Defaults to lockstep.toml next to the graph file.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Log resolver and cache activity.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restore every entry of a dependency graph spec.
    Restore {
        spec: PathBuf,
        /// Local feed directory. Replaces the sources from the settings file.
        #[arg(long = "source", value_name = "DIR")]
        sources: Vec<PathBuf>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        locked_mode: bool,
        #[arg(long)]
        disable_parallel: bool,
        #[arg(long, value_name = "N")]
        max_parallel: Option<usize>,
        #[arg(long)]
        validate_runtime_assets: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long = "warn-as-error", value_name = "CODE", value_parser = parse_log_code)]
        warnings_as_errors: Vec<LogCode>,
        #[arg(long = "no-warn", value_name = "CODE", value_parser = parse_log_code)]
        no_warn: Vec<LogCode>,
    },
    /// List the versions the configured feeds offer for a package.
    Versions {
        id: String,
        #[arg(long = "source", value_name = "DIR")]
        sources: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let success = runtime.block_on(run_cli(cli))?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let env = std::env::var(LOG_ENV).ok();
    let directive = tracing_directive(verbose, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn tracing_directive(verbose: bool, env: Option<&str>) -> String {
    if verbose {
        return "debug".to_string();
    }
    match env.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "warn".to_string(),
    }
}

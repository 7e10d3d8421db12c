use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::inspect;

#[derive(Debug, Parser)]
#[command(
    name = "plexus-doctor",
    about = "Diagnostics for plexus dependency and layout files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report callback declarations the graph builder rejects.
    #[command(name = "lint")]
    Lint {
        /// Dependencies file, as served by the dependencies endpoint.
        #[arg(long)]
        deps: PathBuf,
        /// Emit a JSON report instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the dependency edges, marking state reads as non-triggering.
    #[command(name = "edges")]
    Edges {
        #[arg(long)]
        deps: PathBuf,
        /// Only edges out of this node key.
        #[arg(long)]
        from: Option<String>,
    },
    /// List every identified component and its layout path.
    #[command(name = "paths")]
    Paths {
        #[arg(long)]
        layout: PathBuf,
    },
    /// Show which callbacks a write to `id.prop` would request.
    #[command(name = "triggers")]
    Triggers {
        #[arg(long)]
        deps: PathBuf,
        #[arg(long)]
        layout: PathBuf,
        /// Property key; dict ids use their canonical JSON form.
        key: String,
    },
    /// Validate an engine config file (TOML or JSON).
    #[command(name = "check-config")]
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_output(cli, &mut out)
}

pub fn run_with_output(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Lint { deps, json } => inspect::lint(&deps, json, out),
        Commands::Edges { deps, from } => inspect::edges(&deps, from.as_deref(), out),
        Commands::Paths { layout } => inspect::paths(&layout, out),
        Commands::Triggers { deps, layout, key } => inspect::triggers(&deps, &layout, &key, out),
        Commands::CheckConfig { config } => inspect::check_config(&config, out),
    }
}

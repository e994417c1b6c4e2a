// Copyright 2026 Paywire Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use paywire_runtime::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "paywire",
    about = "Paywire: paywalled news to your read-later queue",
    version,
    after_help = "Run 'paywire <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agents, the read-later sender and the operator API
    Start {
        /// Port of the operator REST API
        #[arg(long, default_value_t = cli::start::DEFAULT_HTTP_PORT)]
        http_port: u16,
        /// Data directory (defaults to $PAYWIRE_DATA_DIR, then ~/.paywire)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// List supported sites and their options
    Sites {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Data directory to check
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Start {
            http_port,
            data_dir,
        } => cli::start::run(data_dir, http_port).await,
        Commands::Sites { json } => cli::sites::run(json),
        Commands::Doctor { data_dir } => cli::doctor::run(data_dir),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "paywire", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}

//! # Vault Initializer
//!
//! Makes sure the JWT secret bundle (`secret`, `issuer`, `internalApiKey`)
//! exists in Vault at `secret/jwt`.
//!
//! ## Usage
//!
//! ```bash
//! # Run the HTTP trigger, the startup run, and the periodic timer
//! vault-initializer serve
//!
//! # Run once and exit; the exit code reflects the outcome
//! vault-initializer once --vault-addr https://vault.internal:8200
//! ```
//!
//! Configuration is read from the environment (`VAULT_ADDR`, `VAULT_SECRET`,
//! `JWTSecret`, `JWTIssuer`, ...).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::error;
use vault_initializer::runtime::initialization;

/// Vault JWT secret bundle initializer
#[derive(Debug, Parser)]
#[command(name = "vault-initializer", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP trigger and run on a timer until SIGINT/SIGTERM (default)
    Serve,
    /// Run a single initialization and exit
    Once {
        /// Vault address, overriding VAULT_ADDR
        #[arg(long, value_name = "URL")]
        vault_addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // The subscriber may not be installed yet
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = initialization::bootstrap()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            initialization::serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Once { vault_addr } => {
            let report = initialization::run_once(config, vault_addr.as_deref()).await?;
            let rendered =
                serde_json::to_string(&report).context("Failed to serialize invocation report")?;
            println!("{rendered}");
            Ok(if report.outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

//! Remote-to-local PostgreSQL copy tool
//!
//! Orchestrates pg_dump, pg_dumpall and pg_restore to clone one remote
//! database onto the local server, with optional row-count verification.

// dbcopytool/src/main.rs
mod config;
mod dump;
mod errors;
mod restore;
mod utils;

use std::process::ExitCode;

use clap::Parser;

use config::{Cli, RunConfig};
use errors::Result;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let run_config = match RunConfig::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match run_app(&run_config).await {
        Ok(_) => {
            println!("✅ Database copy completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run_app(config: &RunConfig) -> Result<()> {
    utils::check_required_tools(config)?;

    let artifacts = dump::run_dump_flow(config).await?;
    restore::run_restore_flow(config, &artifacts).await?;

    if config.verify {
        // Advisory only: the copy itself already succeeded, so a verification
        // problem warns instead of changing the exit code.
        if let Err(e) = restore::verification::run_verification(config, &artifacts.dump_dir).await
        {
            eprintln!("⚠️ Verification could not be completed: {e:#}");
        }
    }

    Ok(())
}

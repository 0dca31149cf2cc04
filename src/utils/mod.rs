pub mod command;

use std::path::PathBuf;

use which::which;

use crate::config::RunConfig;
use crate::errors::{AppError, Result};

/// Finds the pg_dump executable in the system PATH.
pub fn find_pg_dump_executable() -> Result<PathBuf> {
    find_client_tool("pg_dump")
}

/// Finds the pg_dumpall executable in the system PATH.
pub fn find_pg_dumpall_executable() -> Result<PathBuf> {
    find_client_tool("pg_dumpall")
}

/// Finds the pg_restore executable in the system PATH.
pub fn find_pg_restore_executable() -> Result<PathBuf> {
    find_client_tool("pg_restore")
}

/// Finds the psql executable in the system PATH.
pub fn find_psql_executable() -> Result<PathBuf> {
    find_client_tool("psql")
}

fn find_client_tool(name: &str) -> Result<PathBuf> {
    which(name).map_err(|_| {
        AppError::DependencyMissing(format!(
            "{name} executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH."
        ))
    })
}

/// Confirms every external tool this run will invoke is present before any
/// work starts. psql is only needed when globals are applied.
pub fn check_required_tools(config: &RunConfig) -> Result<()> {
    find_pg_dump_executable()?;
    find_pg_dumpall_executable()?;
    find_pg_restore_executable()?;
    if config.apply_globals {
        find_psql_executable()?;
    }
    Ok(())
}

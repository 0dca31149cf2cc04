// dbcopytool/src/dump/mod.rs
pub(crate) mod dump_dir;
mod logic;

use crate::config::RunConfig;
use crate::errors::{AppError, Result};

pub use logic::DumpArtifacts;

/// Public entry point for the dump stage.
///
/// Any failure in here, including per-object errors the tools only report on
/// stderr, is tagged as a dump failure so the process exits with the dump
/// stage's code.
pub async fn run_dump_flow(config: &RunConfig) -> Result<DumpArtifacts> {
    logic::perform_dump_orchestration(config)
        .await
        .map_err(|e| AppError::DumpFailed(format!("{e:#}")))
}

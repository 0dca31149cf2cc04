// dbcopytool/src/restore/mod.rs
pub(crate) mod db_prepare;
mod logic;
pub(crate) mod verification;

use crate::config::RunConfig;
use crate::dump::DumpArtifacts;
use crate::errors::{AppError, Result};

/// Public entry point for the restore stage: target preparation, parallel
/// restore, statistics refresh and (opt-in) globals application.
pub async fn run_restore_flow(config: &RunConfig, artifacts: &DumpArtifacts) -> Result<()> {
    logic::perform_restore_orchestration(config, artifacts)
        .await
        .map_err(|e| AppError::RestoreFailed(format!("{e:#}")))
}

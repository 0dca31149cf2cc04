// dbcopytool/src/restore/logic.rs
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::process::Command;

use crate::config::{LOCAL_HOST, RunConfig};
use crate::dump::DumpArtifacts;
use crate::restore::db_prepare;
use crate::utils;
use crate::utils::command::{create_stage_log, log_reports_errors, run_logged};

/// Restores the dumped directory into the local server: prepare the target
/// database, run the parallel restore with the same dual error check as the
/// dump stage, refresh planner statistics, then apply globals if requested.
pub async fn perform_restore_orchestration(
    config: &RunConfig,
    artifacts: &DumpArtifacts,
) -> Result<()> {
    let pg_restore_path = utils::find_pg_restore_executable()?;

    let encoding = db_prepare::detect_remote_encoding(config).await;
    db_prepare::ensure_target_database(config, &encoding).await?;

    let log_path = create_stage_log(&artifacts.dump_dir, "restore")?;
    println!(
        "🔄 Restoring {} into local database '{}' ({} jobs)...",
        artifacts.dump_dir.display(),
        config.local.db,
        config.jobs
    );

    // No --exit-on-error: per-object failures land in the log, where the
    // marker scan catches them even when pg_restore exits zero.
    let mut command = Command::new(&pg_restore_path);
    command
        .arg("--jobs")
        .arg(config.jobs.to_string())
        .arg("--verbose")
        .arg("-h")
        .arg(LOCAL_HOST)
        .arg("-p")
        .arg(config.local.port.to_string())
        .arg("-U")
        .arg(&config.local.user)
        .arg("-d")
        .arg(&config.local.db)
        .arg(&artifacts.dump_dir);
    if let Some(password) = &config.local.password {
        command.env("PGPASSWORD", password.expose());
    }

    let status = run_logged(command, &log_path, config.command_timeout).await?;
    if !status.success() {
        anyhow::bail!(
            "pg_restore exited with status {} (log: {})",
            status,
            log_path.display()
        );
    }
    if log_reports_errors(&log_path)? {
        anyhow::bail!(
            "restore log {} reports errors even though pg_restore exited cleanly",
            log_path.display()
        );
    }
    println!("✓ Restore completed into '{}'.", config.local.db);

    analyze_target(config).await?;

    if config.apply_globals {
        apply_globals(config, &artifacts.globals_path).await?;
    }

    Ok(())
}

/// Refreshes planner statistics on the freshly restored database so the first
/// real queries against the copy do not run on empty estimates.
async fn analyze_target(config: &RunConfig) -> Result<()> {
    println!("Refreshing planner statistics with ANALYZE...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.local.database_url_for(&config.local.db)?)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to the restored database '{}'",
                config.local.db
            )
        })?;

    sqlx::query("ANALYZE")
        .execute(&pool)
        .await
        .context("ANALYZE on the restored database failed")?;

    println!("✓ Statistics refreshed.");
    Ok(())
}

/// Applies the captured globals script against the local server's
/// administrative database. Opt-in only: it can create or alter server-wide
/// roles and tablespaces, well outside the single target database.
async fn apply_globals(config: &RunConfig, globals_path: &Path) -> Result<()> {
    if !globals_path.exists() {
        anyhow::bail!("Globals script not found: {}", globals_path.display());
    }

    let psql_path = utils::find_psql_executable()?;
    println!(
        "Applying global objects from {} to the local server...",
        globals_path.display()
    );

    let mut command = Command::new(psql_path);
    command
        .arg("-X")
        .arg("-q")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-h")
        .arg(LOCAL_HOST)
        .arg("-p")
        .arg(config.local.port.to_string())
        .arg("-U")
        .arg(&config.local.user)
        .arg("-d")
        .arg("postgres")
        .arg("-f")
        .arg(globals_path);
    if let Some(password) = &config.local.password {
        command.env("PGPASSWORD", password.expose());
    }

    let output = match config.command_timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("psql did not finish within {}s while applying globals", limit.as_secs())
            })?,
        None => command.output().await,
    }
    .context("Failed to execute psql for globals application")?;

    if !output.status.success() {
        anyhow::bail!(
            "psql (globals) failed with status: {}\nStdout: {}\nStderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    println!("✓ Global objects applied.");
    Ok(())
}

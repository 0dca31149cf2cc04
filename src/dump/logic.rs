// dbcopytool/src/dump/logic.rs
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::config::RunConfig;
use crate::dump::dump_dir;
use crate::utils;
use crate::utils::command::{create_stage_log, log_reports_errors, run_logged};

/// What the dump stage leaves behind for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct DumpArtifacts {
    pub dump_dir: PathBuf,
    pub globals_path: PathBuf,
}

/// Dumps the remote database in directory format, then the server-wide
/// globals, with both tools' stderr teed to a single dump log that is scanned
/// for error markers afterwards.
pub async fn perform_dump_orchestration(config: &RunConfig) -> Result<DumpArtifacts> {
    let pg_dump_path = utils::find_pg_dump_executable()?;
    let pg_dumpall_path = utils::find_pg_dumpall_executable()?;

    let dump_dir = dump_dir::resolve_dump_dir(&config.dump_dir, config.overwrite)?;
    let log_path = create_stage_log(&dump_dir, "dump")?;

    println!(
        "🚀 Dumping database '{}' from {}:{} to {} ({} jobs)...",
        config.remote.db,
        config.remote.host,
        config.remote.port,
        dump_dir.display(),
        config.jobs
    );

    let mut command = Command::new(&pg_dump_path);
    command
        .arg("--format=directory")
        .arg("--jobs")
        .arg(config.jobs.to_string())
        .arg("--file")
        .arg(&dump_dir)
        .arg("--verbose")
        .arg("-h")
        .arg(&config.remote.host)
        .arg("-p")
        .arg(config.remote.port.to_string())
        .arg("-U")
        .arg(&config.remote.user)
        .arg("-d")
        .arg(&config.remote.db);
    if let Some(password) = &config.remote.password {
        command.env("PGPASSWORD", password.expose());
    }

    let status = run_logged(command, &log_path, config.command_timeout).await?;
    if !status.success() {
        anyhow::bail!(
            "pg_dump exited with status {} (log: {})",
            status,
            log_path.display()
        );
    }
    println!("✓ Directory-format dump written to {}", dump_dir.display());

    let globals_path = dump_dir.join("globals.sql");
    println!(
        "Dumping global objects (roles, tablespaces) to {}...",
        globals_path.display()
    );
    let globals_file = std::fs::File::create(&globals_path).with_context(|| {
        format!(
            "Failed to create globals script {}",
            globals_path.display()
        )
    })?;

    let mut command = Command::new(&pg_dumpall_path);
    command
        .arg("--globals-only")
        .arg("-h")
        .arg(&config.remote.host)
        .arg("-p")
        .arg(config.remote.port.to_string())
        .arg("-U")
        .arg(&config.remote.user)
        .stdout(Stdio::from(globals_file));
    if let Some(password) = &config.remote.password {
        command.env("PGPASSWORD", password.expose());
    }

    let status = run_logged(command, &log_path, config.command_timeout).await?;
    if !status.success() {
        anyhow::bail!(
            "pg_dumpall exited with status {} (log: {})",
            status,
            log_path.display()
        );
    }
    println!("✓ Global objects script written.");

    // The tools exit zero on some per-object failures; the log is the second
    // line of defense.
    if log_reports_errors(&log_path)? {
        anyhow::bail!(
            "dump log {} reports errors even though the tools exited cleanly",
            log_path.display()
        );
    }

    Ok(DumpArtifacts {
        dump_dir,
        globals_path,
    })
}

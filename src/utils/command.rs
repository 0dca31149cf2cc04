// dbcopytool/src/utils/command.rs
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Marker the dump/restore tools and the server prefix their complaints with.
const ERROR_MARKER: &str = "error:";

/// Creates a fresh, timestamped log file for a stage under the `logs`
/// directory that sits next to the dump directory.
pub fn create_stage_log(dump_dir: &Path, stage: &str) -> Result<PathBuf> {
    let logs_dir = dump_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d_%H_%M_%S");
    let log_path = logs_dir.join(format!("{stage}_{timestamp}.log"));
    std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
    Ok(log_path)
}

/// Runs an external command with its stderr teed to `log_path` line by line:
/// progress stays visible on the terminal while the log keeps a copy for the
/// post-exit error scan. The caller decides what to do with stdout.
///
/// With a timeout set, the child is killed once the limit elapses and the
/// call fails. Without one, a hung tool blocks the run indefinitely.
pub async fn run_logged(
    mut command: Command,
    log_path: &Path,
    timeout: Option<Duration>,
) -> Result<ExitStatus> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command.stderr(Stdio::piped());
    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))?;

    let stderr = child
        .stderr
        .take()
        .with_context(|| format!("Could not capture stderr of {program}"))?;
    let mut log_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let tee = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Some(line) = lines.next_line().await? {
            eprintln!("{line}");
            log_file.write_all(line.as_bytes()).await?;
            log_file.write_all(b"\n").await?;
        }
        log_file.flush().await?;
        Ok::<(), std::io::Error>(())
    });

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.with_context(|| format!("Failed to wait for {program}"))?,
            Err(_) => {
                child.kill().await.ok();
                let _ = tee.await;
                anyhow::bail!(
                    "{program} did not finish within {}s and was killed",
                    limit.as_secs()
                );
            }
        },
        None => child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for {program}"))?,
    };

    tee.await
        .context("stderr capture task failed")?
        .with_context(|| format!("Failed writing {program} output to {}", log_path.display()))?;

    Ok(status)
}

/// Scans a captured log for tool-reported errors. pg_dump and pg_restore can
/// exit zero while reporting per-object failures, so this scan is
/// authoritative alongside the exit status: either one failing fails the
/// stage.
pub fn log_reports_errors(log_path: &Path) -> Result<bool> {
    let contents = std::fs::read_to_string(log_path)
        .with_context(|| format!("Failed to read log file {}", log_path.display()))?;
    Ok(contents.lines().any(line_is_error_marker))
}

fn line_is_error_marker(line: &str) -> bool {
    line.trim_start()
        .get(..ERROR_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ERROR_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn error_marker_matches_case_insensitively() {
        assert!(line_is_error_marker("ERROR: permission denied for table x"));
        assert!(line_is_error_marker("error: out of memory"));
        assert!(line_is_error_marker("  Error: connection reset"));
    }

    #[test]
    fn error_marker_requires_line_start() {
        assert!(!line_is_error_marker("pg_restore: launching item 42"));
        assert!(!line_is_error_marker("finished without error: all good"));
        assert!(!line_is_error_marker("errors: 0"));
        assert!(!line_is_error_marker(""));
    }

    #[test]
    fn log_scan_flags_error_lines() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("dump.log");

        fs::write(&log_path, "dumping table public.users\nreading schemas\n")?;
        assert!(!log_reports_errors(&log_path)?);

        fs::write(
            &log_path,
            "dumping table public.users\nERROR: permission denied for table x\n",
        )?;
        assert!(log_reports_errors(&log_path)?);
        Ok(())
    }

    #[test]
    fn stage_log_lands_in_sibling_logs_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump_dir = dir.path().join("appdb_dump");

        let log_path = create_stage_log(&dump_dir, "dump")?;
        assert!(log_path.exists());
        assert_eq!(log_path.parent(), Some(dir.path().join("logs").as_path()));
        let name = log_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("dump_"));
        assert!(name.ends_with(".log"));
        Ok(())
    }

    #[tokio::test]
    async fn run_logged_tees_stderr_to_the_log_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("stage.log");
        fs::File::create(&log_path)?;

        let mut command = Command::new("sh");
        command.arg("-c").arg("echo progress line 1>&2; exit 0");

        let status = run_logged(command, &log_path, None).await?;
        assert!(status.success());
        assert_eq!(fs::read_to_string(&log_path)?, "progress line\n");
        Ok(())
    }

    #[tokio::test]
    async fn run_logged_reports_nonzero_exit_status() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("stage.log");
        fs::File::create(&log_path)?;

        let mut command = Command::new("sh");
        command.arg("-c").arg("exit 3");

        let status = run_logged(command, &log_path, None).await?;
        assert!(!status.success());
        Ok(())
    }

    #[tokio::test]
    async fn run_logged_kills_commands_that_outlive_the_timeout() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log_path = dir.path().join("stage.log");
        fs::File::create(&log_path)?;

        let mut command = Command::new("sh");
        command.arg("-c").arg("sleep 30");

        let result = run_logged(command, &log_path, Some(Duration::from_millis(100))).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("was killed"));
        Ok(())
    }
}

// dbcopytool/src/dump/dump_dir.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves the directory the dump tool will create.
///
/// The returned path is guaranteed not to exist yet: an existing path is
/// removed when `overwrite` is set, otherwise `_1`, `_2`, ... suffixes are
/// probed until a free name is found. pg_dump refuses a pre-existing
/// directory, and reusing one would mix this run's output with stale files
/// from a previous copy.
pub fn resolve_dump_dir(desired: &Path, overwrite: bool) -> Result<PathBuf> {
    if !desired.exists() {
        return Ok(desired.to_path_buf());
    }

    if overwrite {
        fs::remove_dir_all(desired).with_context(|| {
            format!(
                "Failed to remove existing dump directory {}",
                desired.display()
            )
        })?;
        return Ok(desired.to_path_buf());
    }

    let mut index = 1u32;
    loop {
        let candidate = suffixed(desired, index);
        if !candidate.exists() {
            println!(
                "📂 Dump directory {} already exists, using {} instead",
                desired.display(),
                candidate.display()
            );
            return Ok(candidate);
        }
        index += 1;
    }
}

fn suffixed(path: &Path, index: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!("_{index}"));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_path_is_returned_unchanged() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desired = dir.path().join("appdb_dump");

        let resolved = resolve_dump_dir(&desired, false)?;
        assert_eq!(resolved, desired);
        assert!(!resolved.exists());
        Ok(())
    }

    #[test]
    fn occupied_path_gets_lowest_free_suffix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desired = dir.path().join("appdb_dump");
        fs::create_dir(&desired)?;

        let resolved = resolve_dump_dir(&desired, false)?;
        assert_eq!(resolved, dir.path().join("appdb_dump_1"));
        assert!(!resolved.exists());

        fs::create_dir(&resolved)?;
        let resolved = resolve_dump_dir(&desired, false)?;
        assert_eq!(resolved, dir.path().join("appdb_dump_2"));
        assert!(!resolved.exists());
        Ok(())
    }

    #[test]
    fn overwrite_removes_the_existing_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desired = dir.path().join("appdb_dump");
        fs::create_dir(&desired)?;
        fs::write(desired.join("toc.dat"), b"stale")?;

        let resolved = resolve_dump_dir(&desired, true)?;
        assert_eq!(resolved, desired);
        assert!(!desired.exists());
        Ok(())
    }

    #[test]
    fn overwrite_on_a_fresh_path_is_a_no_op() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let desired = dir.path().join("appdb_dump");

        let resolved = resolve_dump_dir(&desired, true)?;
        assert_eq!(resolved, desired);
        Ok(())
    }
}

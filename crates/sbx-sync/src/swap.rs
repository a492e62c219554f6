//! Atomic directory promotion for the full-replace sync mode.
//!
//! The live directory is renamed to a timestamped backup, staging is
//! renamed into its place, and the backup is scrubbed afterwards. If the
//! process dies between the two renames, the old content still exists under
//! the backup name; playback sees either the old set or the new set, never
//! a mixture.

use sbx_core::{SbxError, SbxResult};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Promote `staging` over `live`. Returns the backup path holding the
/// previous live content, if there was any; the caller decides when to
/// scrub it (normally right away, off the critical path).
pub async fn promote(live: &Path, staging: &Path) -> SbxResult<Option<PathBuf>> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let backup = backup_path(live, stamp);

    let had_content = std::fs::read_dir(live)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);

    let backup = if had_content {
        tokio::fs::rename(live, &backup).await.map_err(|e| {
            SbxError::Filesystem(format!(
                "parking {} as {}: {e}",
                live.display(),
                backup.display()
            ))
        })?;
        Some(backup)
    } else {
        // Nothing worth preserving; clear whatever stub is there.
        let _ = tokio::fs::remove_dir_all(live).await;
        None
    };

    tokio::fs::rename(staging, live).await.map_err(|e| {
        SbxError::Filesystem(format!(
            "promoting {} to {}: {e}",
            staging.display(),
            live.display()
        ))
    })?;

    info!(live = %live.display(), backup = ?backup.as_ref().map(|b| b.display().to_string()), "directory swap committed");
    Ok(backup)
}

/// Delete a parked backup. Failures are logged; a leftover backup wastes
/// disk but never affects correctness.
pub async fn scrub(backup: PathBuf) {
    if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
        warn!(backup = %backup.display(), error = %e, "backup scrub failed");
    }
}

fn backup_path(live: &Path, stamp: u64) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "live".to_string());
    live.with_file_name(format!("{name}_old_{stamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn promote_swaps_and_parks_old_content() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("media");
        let staging = tmp.path().join("media_new");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(live.join("old.mp4"), b"old").unwrap();
        std::fs::write(staging.join("new.mp4"), b"new").unwrap();

        let backup = promote(&live, &staging).await.unwrap().expect("backup");

        assert!(live.join("new.mp4").exists());
        assert!(!live.join("old.mp4").exists());
        assert!(backup.join("old.mp4").exists(), "old content parked");
        assert!(!staging.exists(), "staging was consumed");

        scrub(backup.clone()).await;
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn promote_with_empty_live_leaves_no_backup() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("media");
        let staging = tmp.path().join("media_new");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("new.mp4"), b"new").unwrap();

        let backup = promote(&live, &staging).await.unwrap();
        assert!(backup.is_none());
        assert!(live.join("new.mp4").exists());
    }
}

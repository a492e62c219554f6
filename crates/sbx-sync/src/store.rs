//! The live media directory: the one playback reads from.
//!
//! Assets are identified by lower-cased filename. A file only counts as
//! present when it has non-zero length, so a zero-byte leftover is treated
//! as missing and re-downloaded. In-flight `*.part` files live alongside
//! the assets and are never reported.

use glob::{MatchOptions, Pattern};
use sbx_core::{SbxError, SbxResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CASE_INSENSITIVE: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Clone)]
pub struct LiveStore {
    dir: PathBuf,
    patterns: Vec<Pattern>,
}

impl LiveStore {
    /// Open (creating if needed) the live directory. Creation failure is
    /// fatal to the calling operation, not to the process.
    pub fn open(dir: &Path, patterns: &[String]) -> SbxResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| SbxError::Filesystem(format!("creating {}: {e}", dir.display())))?;

        let patterns = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring bad media pattern");
                    None
                }
            })
            .collect();

        Ok(LiveStore {
            dir: dir.to_path_buf(),
            patterns,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Normalized names of assets currently present (non-empty, matching).
    pub fn assets(&self) -> SbxResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for path in self.files()? {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_lowercase());
            }
        }
        Ok(names)
    }

    /// Paths of playable assets, sorted by normalized name.
    pub fn playable(&self) -> SbxResult<Vec<PathBuf>> {
        let mut files = self.files()?;
        files.sort_by_key(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        });
        Ok(files)
    }

    /// Best-effort batch delete by normalized name. Individual failures are
    /// logged and skipped; returns how many files were actually removed.
    pub fn delete(&self, names: &[String]) -> usize {
        if names.is_empty() {
            return 0;
        }
        let doomed: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let mut removed = 0;

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "delete pass could not list directory");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !doomed.contains(name.as_str()) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(file = %name, "removed unassigned asset");
                    removed += 1;
                }
                Err(e) => warn!(file = %name, error = %e, "delete failed; skipping"),
            }
        }
        removed
    }

    fn files(&self) -> SbxResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SbxError::Filesystem(format!("listing {}: {e}", self.dir.display())))?;

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".part") {
                continue;
            }
            if !self.matches(name) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.is_file() && meta.len() > 0 => files.push(path),
                _ => {}
            }
        }
        Ok(files)
    }

    fn matches(&self, name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(name, CASE_INSENSITIVE))
    }
}

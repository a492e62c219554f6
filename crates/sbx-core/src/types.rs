use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One entry of the remote catalog manifest.
///
/// `filename` is frequently absent; the final on-disk name is then derived
/// from the URL, or from a Content-Disposition header seen during transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// Display rotation hint in degrees, passed through to playback.
    #[serde(default)]
    pub rotation: Option<i32>,
    /// Scaling hint ("zoom", "fit", ...), passed through to playback.
    #[serde(default)]
    pub fit_mode: Option<String>,
}

impl ManifestEntry {
    pub fn new(url: impl Into<String>) -> Self {
        ManifestEntry {
            url: url.into(),
            filename: None,
            rotation: None,
            fit_mode: None,
        }
    }
}

/// Usage counters held by the catalog. The remote value is the source of
/// truth; no local copy is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPair {
    pub daily: i64,
    pub monthly: i64,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Another pass held the in-flight flag; nothing was done.
    pub skipped: bool,
    pub downloaded: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Local content changed, so playback was told to re-list.
    pub refreshed: bool,
    /// The catalog was told the assignment is now satisfied.
    pub reported_complete: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        SyncReport {
            skipped: true,
            ..SyncReport::default()
        }
    }

    pub fn changed(&self) -> bool {
        self.downloaded > 0 || self.deleted > 0
    }
}

/// Playback operation requested by the control peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Next,
}

/// Per-file display hints forwarded with a playback refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayHints {
    pub rotation: Option<i32>,
    pub fit_mode: Option<String>,
}

/// One playable item handed to the playback surface.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub path: PathBuf,
    pub hints: DisplayHints,
}

impl QueueItem {
    pub fn plain(path: PathBuf) -> Self {
        QueueItem {
            path,
            hints: DisplayHints::default(),
        }
    }
}

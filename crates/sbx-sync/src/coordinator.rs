//! One sync pass, end to end.
//!
//! The coordinator fetches the manifest, diffs it against the live
//! directory, deletes unassigned assets, downloads missing ones, signals
//! playback when content changed, and reports completion to the catalog
//! when a previously-incomplete assignment is now satisfied.
//!
//! At most one pass runs at a time: callers that lose the check-then-set on
//! the in-flight flag return a skipped report instead of queueing. A missed
//! tick is recovered by the next one.

use async_trait::async_trait;
use sbx_core::config::SyncMode;
use sbx_core::types::{DisplayHints, ManifestEntry, SyncReport};
use sbx_core::{SbxError, SbxResult};
use sbx_net::{CatalogClient, Transfer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::plan;
use crate::store::LiveStore;
use crate::swap;

/// What a sync pass needs from the outside world. The production impl wraps
/// the catalog client and the transfer engine; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn manifest(&self) -> SbxResult<Vec<ManifestEntry>>;
    async fn completion_flag(&self) -> SbxResult<bool>;
    async fn mark_complete(&self) -> SbxResult<()>;
    /// Download one asset into `dest`, returning its final path. The
    /// entry's explicit filename (when present) names the result, so the
    /// file lands under the same name the plan diffed against.
    async fn fetch(&self, entry: &ManifestEntry, dest: &Path) -> SbxResult<PathBuf>;
}

pub struct HttpSource {
    client: CatalogClient,
    transfer: Transfer,
}

impl HttpSource {
    pub fn new(client: CatalogClient, transfer: Transfer) -> Self {
        HttpSource { client, transfer }
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn manifest(&self) -> SbxResult<Vec<ManifestEntry>> {
        self.client.manifest().await
    }

    async fn completion_flag(&self) -> SbxResult<bool> {
        self.client.completion_flag().await
    }

    async fn mark_complete(&self) -> SbxResult<()> {
        self.client.mark_complete().await
    }

    async fn fetch(&self, entry: &ManifestEntry, dest: &Path) -> SbxResult<PathBuf> {
        self.transfer
            .fetch_named(&entry.url, dest, entry.filename.as_deref())
            .await
    }
}

/// Sent to playback when the live set changed. Playback re-lists the live
/// directory itself; the event only carries per-name display hints.
#[derive(Debug, Clone, Default)]
pub struct RefreshEvent {
    pub hints: HashMap<String, DisplayHints>,
}

pub struct Coordinator {
    source: Arc<dyn MediaSource>,
    store: LiveStore,
    staging_dir: PathBuf,
    mode: SyncMode,
    refresh_tx: mpsc::Sender<RefreshEvent>,
    in_flight: AtomicBool,
}

impl Coordinator {
    pub fn new(
        source: Arc<dyn MediaSource>,
        store: LiveStore,
        staging_dir: PathBuf,
        mode: SyncMode,
        refresh_tx: mpsc::Sender<RefreshEvent>,
    ) -> Self {
        Coordinator {
            source,
            store,
            staging_dir,
            mode,
            refresh_tx,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one pass, or no-op if another pass holds the flag.
    pub async fn sync_once(&self) -> SbxResult<SyncReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already in flight; skipping this tick");
            return Ok(SyncReport::skipped());
        }

        let result = match self.mode {
            SyncMode::Diff => self.sync_diff().await,
            SyncMode::Replace => self.sync_replace().await,
        };
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Incremental mode: delete-then-download straight into the live
    /// directory. Playback may observe a directory one asset short mid-pass;
    /// it only re-lists on the explicit refresh signal.
    async fn sync_diff(&self) -> SbxResult<SyncReport> {
        let was_incomplete = self.observe_incomplete().await;

        // A manifest fetch failure leaves local state untouched.
        let manifest = self.source.manifest().await?;
        let local = self.store.assets()?;
        let sync_plan = plan::build(&manifest, &local);

        if sync_plan.is_empty() {
            debug!("already converged; nothing to sync");
            let reported_complete = was_incomplete && self.report_complete().await;
            return Ok(SyncReport {
                reported_complete,
                ..SyncReport::default()
            });
        }

        let deleted = self.store.delete(&sync_plan.to_delete);

        let mut downloaded = 0;
        let mut failed = 0;
        for entry in &sync_plan.to_download {
            match self.source.fetch(entry, self.store.dir()).await {
                Ok(path) => {
                    debug!(file = %path.display(), "asset in place");
                    downloaded += 1;
                }
                Err(e) => {
                    // Partial batches are fine; the next tick re-plans.
                    warn!(url = %entry.url, error = %e, "download failed; retrying next tick");
                    failed += 1;
                }
            }
        }

        let refreshed = downloaded > 0 || deleted > 0;
        if refreshed {
            self.signal_refresh(&manifest).await;
        }

        let reported_complete = was_incomplete && failed == 0 && self.report_complete().await;

        info!(
            downloaded,
            deleted, failed, reported_complete, "sync pass finished"
        );
        Ok(SyncReport {
            skipped: false,
            downloaded,
            deleted,
            failed,
            refreshed,
            reported_complete,
        })
    }

    /// Full-replace mode: download the entire manifest into staging, then
    /// promote it over the live directory in one atomic swap. Playback never
    /// observes a half-updated directory; the cost is a full re-download.
    async fn sync_replace(&self) -> SbxResult<SyncReport> {
        let was_incomplete = self.observe_incomplete().await;
        let manifest = self.source.manifest().await?;
        if manifest.is_empty() {
            debug!("empty manifest; replace mode leaves live content alone");
            return Ok(SyncReport::default());
        }

        // Staging starts clean every pass.
        let _ = tokio::fs::remove_dir_all(&self.staging_dir).await;
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| {
                SbxError::Filesystem(format!("creating {}: {e}", self.staging_dir.display()))
            })?;

        let mut downloaded = 0;
        let mut failed = 0;
        for entry in &manifest {
            match self.source.fetch(entry, &self.staging_dir).await {
                Ok(_) => downloaded += 1,
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "staging download failed");
                    failed += 1;
                }
            }
        }

        if failed > 0 || downloaded == 0 {
            // No swap on an incomplete staging set; live content stays valid.
            warn!(downloaded, failed, "staging incomplete; swap withheld");
            return Ok(SyncReport {
                downloaded,
                failed,
                ..SyncReport::default()
            });
        }

        if let Some(backup) = swap::promote(self.store.dir(), &self.staging_dir).await? {
            tokio::spawn(swap::scrub(backup));
        }
        self.signal_refresh(&manifest).await;
        let reported_complete = was_incomplete && self.report_complete().await;

        info!(downloaded, reported_complete, "replace pass finished");
        Ok(SyncReport {
            skipped: false,
            downloaded,
            deleted: 0,
            failed: 0,
            refreshed: true,
            reported_complete,
        })
    }

    /// Read the catalog's completion flag; an unreadable flag means we do
    /// not owe a completion report this pass.
    async fn observe_incomplete(&self) -> bool {
        match self.source.completion_flag().await {
            Ok(flag) => !flag,
            Err(e) => {
                warn!(error = %e, "completion flag unreadable; skipping completion report");
                false
            }
        }
    }

    async fn report_complete(&self) -> bool {
        match self.source.mark_complete().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "completion report failed; next pass retries");
                false
            }
        }
    }

    async fn signal_refresh(&self, manifest: &[ManifestEntry]) {
        let mut hints = HashMap::new();
        for entry in manifest {
            if let Some(name) = plan::entry_name(entry) {
                hints.insert(
                    name,
                    DisplayHints {
                        rotation: entry.rotation,
                        fit_mode: entry.fit_mode.clone(),
                    },
                );
            }
        }
        if self.refresh_tx.send(RefreshEvent { hints }).await.is_err() {
            debug!("no playback listener for refresh signal");
        }
    }
}

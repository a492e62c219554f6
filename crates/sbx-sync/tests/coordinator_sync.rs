//! Coordinator end-to-end tests over an in-memory MediaSource.
//!
//! No network involved: the fake source serves a manifest from memory and
//! "downloads" by writing files into the destination directory, with
//! injectable failures for specific URLs and for the manifest fetch itself.

use async_trait::async_trait;
use sbx_core::config::SyncMode;
use sbx_core::types::{ManifestEntry, SyncReport};
use sbx_core::{SbxError, SbxResult};
use sbx_sync::{Coordinator, LiveStore, MediaSource, RefreshEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
struct FakeSource {
    manifest: Mutex<Vec<ManifestEntry>>,
    manifest_fails: AtomicBool,
    /// Value of the catalog's completion flag.
    complete_flag: AtomicBool,
    complete_calls: AtomicUsize,
    fail_urls: Mutex<HashSet<String>>,
    /// When set, manifest() parks until released (for exclusivity tests).
    gated: AtomicBool,
    gate_entered: Notify,
    gate_release: Notify,
}

impl FakeSource {
    fn with_manifest(urls: &[&str]) -> Arc<Self> {
        let source = FakeSource::default();
        *source.manifest.lock().unwrap() = urls
            .iter()
            .map(|u| ManifestEntry::new(u.to_string()))
            .collect();
        Arc::new(source)
    }

    fn fail_url(&self, url: &str) {
        self.fail_urls.lock().unwrap().insert(url.to_string());
    }

    fn heal_url(&self, url: &str) {
        self.fail_urls.lock().unwrap().remove(url);
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn manifest(&self) -> SbxResult<Vec<ManifestEntry>> {
        if self.gated.load(Ordering::SeqCst) {
            self.gate_entered.notify_one();
            self.gate_release.notified().await;
        }
        if self.manifest_fails.load(Ordering::SeqCst) {
            return Err(SbxError::Network("manifest unreachable".into()));
        }
        Ok(self.manifest.lock().unwrap().clone())
    }

    async fn completion_flag(&self) -> SbxResult<bool> {
        Ok(self.complete_flag.load(Ordering::SeqCst))
    }

    async fn mark_complete(&self) -> SbxResult<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.complete_flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, entry: &ManifestEntry, dest: &Path) -> SbxResult<PathBuf> {
        let url = entry.url.as_str();
        if self.fail_urls.lock().unwrap().contains(url) {
            return Err(SbxError::Network(format!("injected failure for {url}")));
        }
        let name = match entry.filename.as_deref() {
            Some(name) => name,
            None => url.rsplit('/').next().unwrap_or("download.bin"),
        };
        let path = dest.join(name);
        std::fs::write(&path, b"media payload")?;
        Ok(path)
    }
}

struct Rig {
    coordinator: Coordinator,
    refresh_rx: mpsc::Receiver<RefreshEvent>,
    live: PathBuf,
    _tmp: tempfile::TempDir,
}

fn rig(source: Arc<FakeSource>, mode: SyncMode) -> Rig {
    let tmp = tempfile::TempDir::new().unwrap();
    let live = tmp.path().join("live");
    let store = LiveStore::open(&live, &["*.mp4".to_string()]).unwrap();
    let (refresh_tx, refresh_rx) = mpsc::channel(8);
    let coordinator = Coordinator::new(
        source,
        store,
        tmp.path().join("staging"),
        mode,
        refresh_tx,
    );
    Rig {
        coordinator,
        refresh_rx,
        live,
        _tmp: tmp,
    }
}

fn seed(live: &Path, name: &str) {
    std::fs::write(live.join(name), b"existing").unwrap();
}

#[tokio::test]
async fn fresh_assignment_downloads_and_reports_complete() {
    let source = FakeSource::with_manifest(&["http://x/a.mp4"]);
    let mut r = rig(source.clone(), SyncMode::Diff);

    let report = r.coordinator.sync_once().await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.failed, 0);
    assert!(report.refreshed);
    assert!(report.reported_complete);
    assert!(r.live.join("a.mp4").exists());
    assert_eq!(source.complete_calls.load(Ordering::SeqCst), 1);
    assert!(r.refresh_rx.try_recv().is_ok(), "exactly one refresh signal");
    assert!(r.refresh_rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_manifest_deletes_unassigned_assets() {
    let source = FakeSource::with_manifest(&[]);
    source.complete_flag.store(true, Ordering::SeqCst);
    let mut r = rig(source, SyncMode::Diff);
    seed(&r.live, "old.mp4");

    let report = r.coordinator.sync_once().await.unwrap();

    assert_eq!(report.downloaded, 0);
    assert_eq!(report.deleted, 1);
    assert!(!r.live.join("old.mp4").exists());
    assert!(!report.reported_complete, "flag was already satisfied");
    assert!(r.refresh_rx.try_recv().is_ok());
}

#[tokio::test]
async fn unchanged_manifest_second_pass_is_a_noop() {
    let source = FakeSource::with_manifest(&["http://x/a.mp4", "http://x/b.mp4"]);
    let mut r = rig(source, SyncMode::Diff);

    let first = r.coordinator.sync_once().await.unwrap();
    assert_eq!(first.downloaded, 2);
    let _ = r.refresh_rx.try_recv();

    let second = r.coordinator.sync_once().await.unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.deleted, 0);
    assert!(!second.refreshed);
    assert!(
        r.refresh_rx.try_recv().is_err(),
        "converged pass must not re-signal playback"
    );
}

#[tokio::test]
async fn manifest_failure_leaves_local_state_untouched() {
    let source = FakeSource::with_manifest(&[]);
    source.manifest_fails.store(true, Ordering::SeqCst);
    let mut r = rig(source, SyncMode::Diff);
    seed(&r.live, "precious.mp4");

    let err = r.coordinator.sync_once().await.unwrap_err();
    assert!(matches!(err, SbxError::Network(_)));
    assert!(
        r.live.join("precious.mp4").exists(),
        "no deletes on a failed manifest read"
    );
    assert!(r.refresh_rx.try_recv().is_err());
}

#[tokio::test]
async fn partial_batch_is_tolerated_and_recovered_next_tick() {
    let source = FakeSource::with_manifest(&["http://x/good.mp4", "http://x/bad.mp4"]);
    source.fail_url("http://x/bad.mp4");
    let mut r = rig(source.clone(), SyncMode::Diff);

    let first = r.coordinator.sync_once().await.unwrap();
    assert_eq!(first.downloaded, 1);
    assert_eq!(first.failed, 1);
    assert!(first.refreshed, "the successful download still refreshes");
    assert!(
        !first.reported_complete,
        "outstanding work forbids the completion report"
    );
    let _ = r.refresh_rx.try_recv();

    source.heal_url("http://x/bad.mp4");
    let second = r.coordinator.sync_once().await.unwrap();
    assert_eq!(second.downloaded, 1, "only the missing asset is fetched");
    assert!(second.reported_complete);
    assert!(r.live.join("good.mp4").exists());
    assert!(r.live.join("bad.mp4").exists());
}

#[tokio::test]
async fn named_entries_land_under_their_manifest_name() {
    let source = FakeSource::with_manifest(&[]);
    {
        let mut entry = ManifestEntry::new("http://cdn/opaque-id-93021");
        entry.filename = Some("spring sale.mp4".into());
        source.manifest.lock().unwrap().push(entry);
    }
    let r = rig(source, SyncMode::Diff);

    let first = r.coordinator.sync_once().await.unwrap();
    assert_eq!(first.downloaded, 1);
    assert!(r.live.join("spring sale.mp4").exists());

    let second = r.coordinator.sync_once().await.unwrap();
    assert_eq!(
        second.downloaded, 0,
        "the named asset must be recognized as present"
    );
    assert_eq!(second.deleted, 0);
}

#[tokio::test]
async fn concurrent_pass_skips_instead_of_queueing() {
    let source = FakeSource::with_manifest(&["http://x/a.mp4"]);
    source.gated.store(true, Ordering::SeqCst);
    let r = rig(source.clone(), SyncMode::Diff);
    let coordinator = Arc::new(r.coordinator);

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.sync_once().await })
    };
    // Wait until the first pass is parked inside the manifest fetch.
    source.gate_entered.notified().await;

    let second = coordinator.sync_once().await.unwrap();
    assert_eq!(second, SyncReport::skipped());

    source.gated.store(false, Ordering::SeqCst);
    source.gate_release.notify_one();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.downloaded, 1);
}

#[tokio::test]
async fn replace_mode_swaps_whole_directory() {
    let source = FakeSource::with_manifest(&["http://x/new.mp4"]);
    let mut r = rig(source, SyncMode::Replace);
    seed(&r.live, "old.mp4");

    let report = r.coordinator.sync_once().await.unwrap();

    assert_eq!(report.downloaded, 1);
    assert!(report.refreshed);
    assert!(report.reported_complete);
    assert!(r.live.join("new.mp4").exists());
    assert!(!r.live.join("old.mp4").exists());
    assert!(r.refresh_rx.try_recv().is_ok());
}

#[tokio::test]
async fn replace_mode_withholds_swap_on_any_failure() {
    let source = FakeSource::with_manifest(&["http://x/ok.mp4", "http://x/nope.mp4"]);
    source.fail_url("http://x/nope.mp4");
    let mut r = rig(source, SyncMode::Replace);
    seed(&r.live, "old.mp4");

    let report = r.coordinator.sync_once().await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(!report.refreshed);
    assert!(
        r.live.join("old.mp4").exists(),
        "live content survives an incomplete staging set"
    );
    assert!(r.refresh_rx.try_recv().is_err());
}

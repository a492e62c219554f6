//! Manifest/local diffing.
//!
//! The plan is a pure set difference over normalized (lower-cased) file
//! names: entries whose name is not present locally are downloaded, local
//! assets the manifest no longer names are deleted, and anything present on
//! both sides is left alone. Running the same plan twice therefore
//! converges to a no-op.

use reqwest::Url;
use sbx_core::types::ManifestEntry;
use sbx_net::filename;
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Entries to download, in manifest order.
    pub to_download: Vec<ManifestEntry>,
    /// Normalized local names to delete.
    pub to_delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_delete.is_empty()
    }
}

/// The normalized on-disk name a manifest entry will occupy.
///
/// Explicit `filename` wins; otherwise the name is derived from the URL the
/// same way the transfer engine derives it, so the plan and the download
/// agree. Returns `None` for entries with no usable name.
pub fn entry_name(entry: &ManifestEntry) -> Option<String> {
    if let Some(name) = entry
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return Some(filename::sanitize(name).to_lowercase());
    }
    match Url::parse(entry.url.trim()) {
        Ok(url) => Some(filename::from_url(&url).to_lowercase()),
        Err(e) => {
            warn!(url = %entry.url, error = %e, "manifest entry has no usable name");
            None
        }
    }
}

/// Compute the plan for one pass. `local` holds normalized names of assets
/// that exist with non-zero length.
pub fn build(manifest: &[ManifestEntry], local: &BTreeSet<String>) -> SyncPlan {
    let mut manifest_names = BTreeSet::new();
    let mut to_download = Vec::new();

    for entry in manifest {
        let Some(name) = entry_name(entry) else {
            continue;
        };
        // First entry wins when two URLs map to the same name.
        if !manifest_names.insert(name.clone()) {
            continue;
        }
        if !local.contains(&name) {
            to_download.push(entry.clone());
        }
    }

    let to_delete = local
        .iter()
        .filter(|name| !manifest_names.contains(*name))
        .cloned()
        .collect();

    SyncPlan {
        to_download,
        to_delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(url: &str) -> ManifestEntry {
        ManifestEntry::new(url)
    }

    fn names(plan_downloads: &[ManifestEntry]) -> BTreeSet<String> {
        plan_downloads.iter().filter_map(entry_name).collect()
    }

    #[test]
    fn fresh_directory_downloads_everything() {
        let manifest = vec![entry("http://x/a.mp4"), entry("http://x/b.mp4")];
        let local = BTreeSet::new();
        let plan = build(&manifest, &local);
        assert_eq!(plan.to_download.len(), 2);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn empty_manifest_deletes_everything() {
        let local: BTreeSet<String> = ["old.mp4".to_string()].into();
        let plan = build(&[], &local);
        assert!(plan.to_download.is_empty());
        assert_eq!(plan.to_delete, vec!["old.mp4".to_string()]);
    }

    #[test]
    fn present_on_both_sides_is_untouched() {
        let manifest = vec![entry("http://x/keep.mp4"), entry("http://x/new.mp4")];
        let local: BTreeSet<String> = ["keep.mp4".to_string(), "stale.mp4".to_string()].into();
        let plan = build(&manifest, &local);
        assert_eq!(names(&plan.to_download), ["new.mp4".to_string()].into());
        assert_eq!(plan.to_delete, vec!["stale.mp4".to_string()]);
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let manifest = vec![entry("http://x/Promo.MP4")];
        let local: BTreeSet<String> = ["promo.mp4".to_string()].into();
        let plan = build(&manifest, &local);
        assert!(plan.is_empty());
    }

    #[test]
    fn explicit_filename_overrides_url() {
        let mut e = entry("http://cdn/opaque-id-93021?sig=abc");
        e.filename = Some("spring sale.mp4".into());
        let plan = build(&[e], &BTreeSet::new());
        assert_eq!(names(&plan.to_download), ["spring sale.mp4".to_string()].into());
    }

    #[test]
    fn duplicate_names_download_once() {
        let manifest = vec![entry("http://a/clip.mp4"), entry("http://b/clip.mp4")];
        let plan = build(&manifest, &BTreeSet::new());
        assert_eq!(plan.to_download.len(), 1);
        assert_eq!(plan.to_download[0].url, "http://a/clip.mp4");
    }

    proptest! {
        /// Soundness of the diff: downloads never name a local asset,
        /// deletions are local assets the manifest doesn't name.
        #[test]
        fn plan_is_sound(
            manifest_stems in prop::collection::btree_set("[a-z]{1,8}", 0..12),
            local_stems in prop::collection::btree_set("[a-z]{1,8}", 0..12),
        ) {
            let manifest: Vec<ManifestEntry> = manifest_stems
                .iter()
                .map(|s| entry(&format!("http://host/{s}.mp4")))
                .collect();
            let local: BTreeSet<String> =
                local_stems.iter().map(|s| format!("{s}.mp4")).collect();

            let plan = build(&manifest, &local);
            let manifest_names: BTreeSet<String> =
                manifest.iter().filter_map(entry_name).collect();
            let download_names = names(&plan.to_download);

            prop_assert!(download_names.is_disjoint(&local));
            prop_assert!(plan.to_delete.iter().all(|n| local.contains(n)));
            prop_assert!(plan.to_delete.iter().all(|n| !manifest_names.contains(n)));
        }

        /// Applying the plan and planning again yields a no-op.
        #[test]
        fn plan_is_idempotent(
            manifest_stems in prop::collection::btree_set("[a-z]{1,8}", 0..12),
            local_stems in prop::collection::btree_set("[a-z]{1,8}", 0..12),
        ) {
            let manifest: Vec<ManifestEntry> = manifest_stems
                .iter()
                .map(|s| entry(&format!("http://host/{s}.mp4")))
                .collect();
            let local: BTreeSet<String> =
                local_stems.iter().map(|s| format!("{s}.mp4")).collect();

            let plan = build(&manifest, &local);
            let mut converged = local.clone();
            for name in &plan.to_delete {
                converged.remove(name);
            }
            converged.extend(names(&plan.to_download));

            let second = build(&manifest, &converged);
            prop_assert!(second.is_empty());
        }
    }
}

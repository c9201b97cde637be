//! Append-only version history with full-state snapshots.
//!
//! Every recorded version carries the complete presentation state it
//! describes, so each [`VersionRecord`] is a point the presentation can be
//! rolled back to. Revert replays the stored full-state snapshot; the
//! change log is informational only and never read for correctness.

use crate::store::PresentationStore;
use chrono::Utc;
use deck_core::{
    BumpKind, Change, ChangeOp, Error, Presentation, Result, Version, VersionMeta, VersionRecord,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Maintains the monotonically-numbered history of each presentation.
///
/// All snapshot/mutate operations for one presentation id are serialized
/// through a per-id writer lock; different presentations proceed
/// independently.
#[derive(Clone)]
pub struct VersionManager {
    store: PresentationStore,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl VersionManager {
    pub fn new(store: PresentationStore) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquire the single-writer lock for a presentation.
    ///
    /// Callers performing snapshot-then-mutate sequences hold this guard
    /// across the whole sequence and use [`VersionManager::record_locked`].
    pub async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("version lock map poisoned");
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Take a snapshot of the given state under the writer lock.
    pub async fn snapshot(
        &self,
        presentation: &Presentation,
        description: &str,
        bump: BumpKind,
    ) -> Result<VersionRecord> {
        let _guard = self.acquire(&presentation.id).await;
        self.record_locked(presentation, description, bump).await
    }

    /// Take a snapshot while the caller already holds the writer lock.
    ///
    /// The first snapshot of a presentation is always `1.0.0`; later ones
    /// bump the requested component of the latest stored version. A stored
    /// version at or above the computed next version means another writer
    /// interleaved, which surfaces as a `VersionConflict`.
    pub async fn record_locked(
        &self,
        presentation: &Presentation,
        description: &str,
        bump: BumpKind,
    ) -> Result<VersionRecord> {
        let record = self.build_record(presentation, description, bump).await?;
        self.store.save_version(&presentation.id, &record).await?;
        log::debug!(
            "snapshot {} of presentation {} ({description})",
            record.version,
            presentation.id
        );
        Ok(record)
    }

    /// Build the next record without persisting it. Caller must hold the
    /// writer lock.
    async fn build_record(
        &self,
        presentation: &Presentation,
        description: &str,
        bump: BumpKind,
    ) -> Result<VersionRecord> {
        let existing = self.store.list_versions(&presentation.id).await?;
        let latest = existing.last();

        let version = match latest {
            None => Version::initial(),
            Some(record) => record.version.bump(bump),
        };
        if let Some(record) = latest {
            if record.version >= version {
                return Err(Error::VersionConflict(format!(
                    "stored version {} is not below computed {}",
                    record.version, version
                )));
            }
        }

        let change_log = match latest {
            Some(previous) => diff_changes(&previous.snapshot, presentation),
            None => Vec::new(),
        };

        let record = VersionRecord {
            version,
            timestamp: Utc::now(),
            description: description.to_string(),
            change_log,
            snapshot: presentation.clone(),
        };
        Ok(record)
    }

    /// Ordered version history for a presentation.
    pub async fn list_versions(&self, id: &str) -> Result<Vec<VersionMeta>> {
        Ok(self
            .store
            .list_versions(id)
            .await?
            .iter()
            .map(VersionRecord::meta)
            .collect())
    }

    /// Roll a presentation back to a stored version.
    ///
    /// The current state is snapshotted first (so the revert itself can be
    /// undone), then the stored full-state snapshot replaces it.
    pub async fn revert(&self, id: &str, version: &Version) -> Result<Presentation> {
        let _guard = self.acquire(id).await;

        let target = self.store.load_version(id, version).await?;
        let current = self.store.load(id).await?;

        let mut pre_revert = self
            .build_record(&current, &format!("before revert to {version}"), BumpKind::Patch)
            .await?;
        pre_revert.change_log.push(Change {
            op: ChangeOp::Reverted,
            slide_index: None,
            detail: format!("reverting to {version}"),
        });
        self.store.save_version(id, &pre_revert).await?;

        let mut restored = target.snapshot;
        // The aggregate keeps its accumulated version metadata; only the
        // content state is replayed.
        restored.versions = self.list_versions(id).await?;
        self.store.save(&restored).await?;
        Ok(restored)
    }
}

/// Informational diff between two states. Never used for correctness.
fn diff_changes(before: &Presentation, after: &Presentation) -> Vec<Change> {
    let mut changes = Vec::new();
    if before.title != after.title {
        changes.push(Change {
            op: ChangeOp::TitleChanged,
            slide_index: None,
            detail: format!("{:?} -> {:?}", before.title, after.title),
        });
    }
    if before.theme.name != after.theme.name {
        changes.push(Change {
            op: ChangeOp::ThemeChanged,
            slide_index: None,
            detail: format!("{} -> {}", before.theme.name, after.theme.name),
        });
    }
    let common = before.slides.len().min(after.slides.len());
    for i in 0..common {
        if before.slides[i] != after.slides[i] {
            changes.push(Change {
                op: ChangeOp::SlideEdited,
                slide_index: Some(i),
                detail: format!("slide {} edited", i + 1),
            });
        }
    }
    for i in common..after.slides.len() {
        changes.push(Change {
            op: ChangeOp::SlideAdded,
            slide_index: Some(i),
            detail: format!("slide {} added", i + 1),
        });
    }
    for i in common..before.slides.len() {
        changes.push(Change {
            op: ChangeOp::SlideRemoved,
            slide_index: Some(i),
            detail: format!("slide {} removed", i + 1),
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use deck_core::Slide;

    fn manager() -> VersionManager {
        VersionManager::new(PresentationStore::new(Arc::new(MemoryStore::new())))
    }

    fn sample(id: &str) -> Presentation {
        let mut p = Presentation::new(id, "Sample");
        p.add_slide(Slide::new("One"));
        p
    }

    #[tokio::test]
    async fn test_first_snapshot_is_initial_version() {
        let vm = manager();
        let p = sample("p1");
        vm.store.save(&p).await.unwrap();
        let record = vm.snapshot(&p, "initial version", BumpKind::Patch).await.unwrap();
        assert_eq!(record.version, Version::initial());
        assert!(record.change_log.is_empty());
    }

    #[tokio::test]
    async fn test_bumps_follow_request() {
        let vm = manager();
        let p = sample("p1");
        vm.store.save(&p).await.unwrap();
        vm.snapshot(&p, "initial", BumpKind::Patch).await.unwrap();
        let minor = vm.snapshot(&p, "minor", BumpKind::Minor).await.unwrap();
        assert_eq!(minor.version.to_string(), "1.1.0");
        let major = vm.snapshot(&p, "major", BumpKind::Major).await.unwrap();
        assert_eq!(major.version.to_string(), "2.0.0");
        let patch = vm.snapshot(&p, "patch", BumpKind::Patch).await.unwrap();
        assert_eq!(patch.version.to_string(), "2.0.1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_snapshots_strictly_increase() {
        let vm = manager();
        let p = sample("p1");
        vm.store.save(&p).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let vm = vm.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                vm.snapshot(&p, &format!("snap {i}"), BumpKind::Patch).await
            }));
        }
        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().unwrap().version);
        }
        versions.sort();
        versions.dedup();
        // No duplicates, no skips: exactly 1.0.0 through 1.0.7.
        assert_eq!(versions.len(), 8);
        assert_eq!(versions[0], Version::initial());
        assert_eq!(versions[7].to_string(), "1.0.7");
    }

    #[tokio::test]
    async fn test_change_log_reports_slide_edits() {
        let vm = manager();
        let mut p = sample("p1");
        vm.store.save(&p).await.unwrap();
        vm.snapshot(&p, "initial", BumpKind::Patch).await.unwrap();

        p.slides[0].title = "Renamed".to_string();
        p.add_slide(Slide::new("Two"));
        let record = vm.snapshot(&p, "edit", BumpKind::Patch).await.unwrap();

        let ops: Vec<ChangeOp> = record.change_log.iter().map(|c| c.op).collect();
        assert!(ops.contains(&ChangeOp::SlideEdited));
        assert!(ops.contains(&ChangeOp::SlideAdded));
    }

    #[tokio::test]
    async fn test_revert_replays_full_snapshot() {
        let vm = manager();
        let mut p = sample("p1");
        vm.store.save(&p).await.unwrap();
        vm.snapshot(&p, "initial", BumpKind::Patch).await.unwrap();

        let original_title = p.slides[0].title.clone();
        p.slides[0].title = "Changed".to_string();
        vm.snapshot(&p, "edit", BumpKind::Patch).await.unwrap();
        vm.store.save(&p).await.unwrap();

        let restored = vm.revert("p1", &Version::initial()).await.unwrap();
        assert_eq!(restored.slides[0].title, original_title);

        // The pre-revert state was snapshotted, so the revert is undoable.
        let versions = vm.list_versions("p1").await.unwrap();
        assert_eq!(versions.len(), 3);

        let reloaded = vm.store.load("p1").await.unwrap();
        assert_eq!(reloaded.slides[0].title, original_title);
    }

    #[tokio::test]
    async fn test_revert_to_missing_version_is_not_found() {
        let vm = manager();
        let p = sample("p1");
        vm.store.save(&p).await.unwrap();
        vm.snapshot(&p, "initial", BumpKind::Patch).await.unwrap();
        let missing = Version {
            major: 9,
            minor: 9,
            patch: 9,
        };
        let err = vm.revert("p1", &missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

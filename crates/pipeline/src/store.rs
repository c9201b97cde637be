//! Durable presentation storage.
//!
//! [`ObjectStore`] abstracts the external object store behind a small
//! trait with in-memory and filesystem implementations. On top of it,
//! [`PresentationStore`] lays out a presentation's slides, assets, exports,
//! and versions under a hierarchical keyspace:
//!
//! ```text
//! {presentation_id}/presentation.json
//! {presentation_id}/slides/slide_{n}.json            1-indexed
//! {presentation_id}/slides/assets/{images,charts,icons}/*
//! {presentation_id}/exports/presentation.{pptx|pdf|mp4}
//! {presentation_id}/versions/version_{M}_{m}_{p}.json
//! ```
//!
//! Writes create the directory structure first and then leaf files; every
//! write is idempotent, so partial failures leave previously-written files
//! intact and retrying is always safe.

use chrono::Utc;
use deck_core::{
    ArtifactRef, AssetKind, AssetRecord, BoxFuture, Error, ExportFormat, Presentation, Result,
    Slide, Theme, Version, VersionMeta, VersionRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Minimal object-store interface the pipeline persists through.
///
/// The underlying store is assumed to provide atomic per-key writes; the
/// pipeline adds no distributed locking beyond its single-writer guards.
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`. Re-writing identical content is a no-op
    /// observable only in modification time.
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Read the bytes under `key`, or `None` if absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    /// List all keys under a `prefix` (a directory-style path).
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Delete a single key, ignoring absence.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Delete everything under a `prefix`, ignoring absence.
    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// In-memory object store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryStore {
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut objects = self.objects.lock().expect("store mutex poisoned");
            objects.insert(key.to_string(), bytes);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let objects = self.objects.lock().expect("store mutex poisoned");
            Ok(objects.get(key).cloned())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let objects = self.objects.lock().expect("store mutex poisoned");
            Ok(objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut objects = self.objects.lock().expect("store mutex poisoned");
            objects.remove(key);
            Ok(())
        })
    }

    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut objects = self.objects.lock().expect("store mutex poisoned");
            objects.retain(|k, _| !k.starts_with(prefix));
            Ok(())
        })
    }
}

/// Filesystem-backed object store rooted at a local directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path
    }

    fn key_for(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl ObjectStore for FsStore {
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.path_for(key);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::StoreWrite(format!("{key}: {e}")))?;
            }
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| Error::StoreWrite(format!("{key}: {e}")))
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            match tokio::fs::read(self.path_for(key)).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::StoreRead(format!("{key}: {e}"))),
            }
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let root = self.path_for(prefix);
            let mut keys = Vec::new();
            let mut pending = vec![root];
            while let Some(dir) = pending.pop() {
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        return Err(Error::StoreRead(format!("{}: {e}", dir.display())))
                    }
                };
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| Error::StoreRead(format!("{}: {e}", dir.display())))?
                {
                    let path = entry.path();
                    if path.is_dir() {
                        pending.push(path);
                    } else {
                        keys.push(self.key_for(&path));
                    }
                }
            }
            keys.sort();
            Ok(keys)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.path_for(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::StoreWrite(format!("{key}: {e}"))),
            }
        })
    }

    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = self.path_for(prefix);
            let result = if path.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::StoreWrite(format!("{prefix}: {e}"))),
            }
        })
    }
}

/// Manifest persisted at `{id}/presentation.json`. Slides are stored as
/// individual leaf files and joined back in at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    id: String,
    title: String,
    theme: Theme,
    slide_count: usize,
    #[serde(default)]
    exports: BTreeMap<ExportFormat, ArtifactRef>,
    #[serde(default)]
    versions: Vec<VersionMeta>,
}

/// Durable CRUD over presentation aggregates.
#[derive(Clone)]
pub struct PresentationStore {
    store: Arc<dyn ObjectStore>,
}

impl PresentationStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn manifest_key(id: &str) -> String {
        format!("{id}/presentation.json")
    }

    fn slide_key(id: &str, n: usize) -> String {
        format!("{id}/slides/slide_{n}.json")
    }

    fn asset_dir(id: &str, kind: AssetKind) -> String {
        format!("{id}/slides/assets/{}", kind.dir_name())
    }

    /// Object key of an asset payload, derived from presentation, kind,
    /// and content hash.
    pub fn asset_key(id: &str, kind: AssetKind, content_hash: &str) -> String {
        format!("{}/{}", Self::asset_dir(id, kind), content_hash)
    }

    fn asset_record_key(id: &str, kind: AssetKind, content_hash: &str) -> String {
        format!("{}.json", Self::asset_key(id, kind, content_hash))
    }

    fn export_key(id: &str, format: ExportFormat) -> String {
        format!("{id}/exports/{}", format.file_name())
    }

    fn version_key(id: &str, version: &Version) -> String {
        format!("{id}/versions/{}.json", version.file_stem())
    }

    /// Persist the whole aggregate: manifest first, then slide leaf files.
    pub async fn save(&self, presentation: &Presentation) -> Result<()> {
        let manifest = Manifest {
            id: presentation.id.clone(),
            title: presentation.title.clone(),
            theme: presentation.theme.clone(),
            slide_count: presentation.slides.len(),
            exports: presentation.exports.clone(),
            versions: presentation.versions.clone(),
        };
        self.store
            .put(
                &Self::manifest_key(&presentation.id),
                serde_json::to_vec_pretty(&manifest)?,
            )
            .await?;

        for (idx, slide) in presentation.slides.iter().enumerate() {
            self.store
                .put(
                    &Self::slide_key(&presentation.id, idx + 1),
                    serde_json::to_vec_pretty(slide)?,
                )
                .await?;
        }

        // Remove slide files beyond the current count (slides deleted by an
        // update), leaving assets untouched.
        let prefix = format!("{}/slides/", presentation.id);
        for key in self.store.list(&prefix).await? {
            if let Some(n) = parse_slide_number(&key) {
                if n > presentation.slides.len() {
                    self.store.delete(&key).await?;
                }
            }
        }
        log::debug!(
            "saved presentation {} ({} slides)",
            presentation.id,
            presentation.slides.len()
        );
        Ok(())
    }

    /// Load the aggregate, joining the manifest with its slide files.
    pub async fn load(&self, id: &str) -> Result<Presentation> {
        let bytes = self
            .store
            .get(&Self::manifest_key(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("presentation {id}")))?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;

        let mut slides = Vec::with_capacity(manifest.slide_count);
        for n in 1..=manifest.slide_count {
            let key = Self::slide_key(id, n);
            let bytes = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| Error::StoreRead(format!("missing slide file {key}")))?;
            let slide: Slide = serde_json::from_slice(&bytes)?;
            slides.push(slide);
        }

        Ok(Presentation {
            id: manifest.id,
            title: manifest.title,
            theme: manifest.theme,
            slides,
            exports: manifest.exports,
            versions: manifest.versions,
        })
    }

    /// Whether a presentation with this id exists.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.get(&Self::manifest_key(id)).await?.is_some())
    }

    /// Remove the presentation and everything stored under it.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_prefix(&format!("{id}/")).await
    }

    /// Look up an existing asset record by content hash.
    pub async fn find_asset(
        &self,
        id: &str,
        kind: AssetKind,
        content_hash: &str,
    ) -> Result<Option<AssetRecord>> {
        match self
            .store
            .get(&Self::asset_record_key(id, kind, content_hash))
            .await?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist asset payload bytes and their provenance record.
    pub async fn put_asset(
        &self,
        id: &str,
        record: &AssetRecord,
        bytes: Vec<u8>,
    ) -> Result<()> {
        self.store.put(&record.stored_ref, bytes).await?;
        self.store
            .put(
                &Self::asset_record_key(id, record.kind, &record.content_hash),
                serde_json::to_vec_pretty(record)?,
            )
            .await
    }

    /// Read back asset payload bytes.
    pub async fn get_asset_bytes(&self, stored_ref: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(stored_ref).await
    }

    /// Persist an export artifact and return its reference.
    pub async fn record_export(
        &self,
        id: &str,
        format: ExportFormat,
        bytes: Vec<u8>,
    ) -> Result<ArtifactRef> {
        let key = Self::export_key(id, format);
        let size_bytes = bytes.len() as u64;
        self.store.put(&key, bytes).await?;
        Ok(ArtifactRef {
            format,
            key,
            size_bytes,
            created_at: Utc::now(),
        })
    }

    /// Read back an export artifact.
    pub async fn get_export(&self, id: &str, format: ExportFormat) -> Result<Option<Vec<u8>>> {
        self.store.get(&Self::export_key(id, format)).await
    }

    /// Persist a full-state version snapshot.
    pub async fn save_version(&self, id: &str, record: &VersionRecord) -> Result<()> {
        self.store
            .put(
                &Self::version_key(id, &record.version),
                serde_json::to_vec_pretty(record)?,
            )
            .await
    }

    /// Load one version snapshot.
    pub async fn load_version(&self, id: &str, version: &Version) -> Result<VersionRecord> {
        let bytes = self
            .store
            .get(&Self::version_key(id, version))
            .await?
            .ok_or_else(|| Error::NotFound(format!("version {version} of {id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All version snapshots for a presentation, ordered by version.
    pub async fn list_versions(&self, id: &str) -> Result<Vec<VersionRecord>> {
        let mut records = Vec::new();
        for key in self.store.list(&format!("{id}/versions/")).await? {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<VersionRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("skipping unreadable version file {key}: {e}"),
            }
        }
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    /// Garbage-collect stored assets no slide references.
    ///
    /// Returns the number of deleted objects (payloads and records).
    pub async fn collect_unreferenced(&self, id: &str) -> Result<usize> {
        let presentation = self.load(id).await?;
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for slide in &presentation.slides {
            for element in &slide.elements {
                if let Some(record) = &element.asset {
                    referenced.insert(record.stored_ref.clone());
                    referenced.insert(Self::asset_record_key(
                        id,
                        record.kind,
                        &record.content_hash,
                    ));
                }
            }
        }

        let mut removed = 0;
        for key in self.store.list(&format!("{id}/slides/assets/")).await? {
            if !referenced.contains(&key) {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("collected {removed} unreferenced asset objects for {id}");
        }
        Ok(removed)
    }
}

/// Parse `{id}/slides/slide_{n}.json` into `n`. Returns `None` for asset
/// keys and anything else under `slides/`.
fn parse_slide_number(key: &str) -> Option<usize> {
    let file = key.rsplit('/').next()?;
    let stem = file.strip_prefix("slide_")?.strip_suffix(".json")?;
    stem.parse().ok()
}

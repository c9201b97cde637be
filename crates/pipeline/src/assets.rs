//! Asset resolution pipeline.
//!
//! Resolves declared image/chart/icon references into stored byte artifacts
//! with provenance records. Each distinct source is fetched or generated at
//! most once: records are content-addressed by a hash of the declared
//! source, and concurrent identical requests collapse through the cache
//! layer's single-flight guard. A failed asset never aborts a slide or an
//! export; the pipeline substitutes a placeholder record and marks the
//! slide degraded.

use crate::cache::Cache;
use crate::collab::{offline::SOLID_PNG, AssetFetcher, ContentGenerator};
use crate::store::PresentationStore;
use chrono::Utc;
use deck_core::{
    AssetKind, AssetRecord, AssetSource, AssetStatus, Error, Result, Slide,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Content hash of a declared asset source.
pub fn source_hash(source: &AssetSource) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.address().as_bytes());
    hex::encode(hasher.finalize())
}

/// Random hex identifier for new records.
pub fn new_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Resolves declared assets against the store, cache, and collaborators.
#[derive(Clone)]
pub struct AssetPipeline {
    store: PresentationStore,
    cache: Arc<Cache>,
    fetcher: Arc<dyn AssetFetcher>,
    generator: Arc<dyn ContentGenerator>,
    concurrency: usize,
    call_timeout: Duration,
}

impl AssetPipeline {
    pub fn new(
        store: PresentationStore,
        cache: Arc<Cache>,
        fetcher: Arc<dyn AssetFetcher>,
        generator: Arc<dyn ContentGenerator>,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            fetcher,
            generator,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    /// Resolve one declared asset into a stored record.
    ///
    /// Steps: hash the source, return any existing record with that hash
    /// unchanged, otherwise fetch/generate bytes under the call timeout,
    /// persist them under a `(presentation, kind, hash)` key, and record
    /// provenance in the catalog.
    pub async fn resolve(
        &self,
        presentation_id: &str,
        kind: AssetKind,
        source: &AssetSource,
    ) -> Result<AssetRecord> {
        let content_hash = source_hash(source);

        if let Some(existing) = self
            .store
            .find_asset(presentation_id, kind, &content_hash)
            .await?
        {
            log::debug!("asset {content_hash} already stored, reusing record");
            return Ok(existing);
        }

        // Content-addressed: no TTL, and concurrent identical sources
        // collapse to one fetch through the single-flight guard.
        let cache_key = format!("asset:{content_hash}");
        let bytes = self
            .cache
            .get_or_compute(&cache_key, None, || self.load_bytes(source))
            .await?;

        let stored_ref = PresentationStore::asset_key(presentation_id, kind, &content_hash);
        let record = AssetRecord {
            id: new_id(),
            kind,
            source: source.clone(),
            stored_ref,
            size_bytes: bytes.len() as u64,
            content_hash,
            placeholder: false,
            created_at: Utc::now(),
        };
        self.store.put_asset(presentation_id, &record, bytes).await?;
        Ok(record)
    }

    async fn load_bytes(&self, source: &AssetSource) -> Result<Vec<u8>> {
        match source {
            AssetSource::Url(url) => match timeout(self.call_timeout, self.fetcher.fetch(url)).await
            {
                Ok(result) => result,
                Err(_) => Err(Error::AssetFetch(format!(
                    "fetch of {url} timed out after {:?}",
                    self.call_timeout
                ))),
            },
            AssetSource::Generated { prompt, style } => {
                match timeout(
                    self.call_timeout,
                    self.generator.generate_image(prompt, style.as_deref()),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::AssetGeneration(format!(
                        "generation timed out after {:?}",
                        self.call_timeout
                    ))),
                }
            }
        }
    }

    /// Resolve one asset, degrading to a placeholder on failure.
    ///
    /// Returns the record plus whether it is a placeholder.
    pub async fn resolve_or_placeholder(
        &self,
        presentation_id: &str,
        kind: AssetKind,
        source: &AssetSource,
    ) -> (AssetRecord, bool) {
        match self.resolve(presentation_id, kind, source).await {
            Ok(record) => (record, false),
            Err(e) => {
                log::warn!("asset resolution degraded to placeholder: {e}");
                let record = self
                    .placeholder_record(presentation_id, kind, source)
                    .await;
                (record, true)
            }
        }
    }

    /// Build (and persist, best effort) the documented placeholder record.
    async fn placeholder_record(
        &self,
        presentation_id: &str,
        kind: AssetKind,
        source: &AssetSource,
    ) -> AssetRecord {
        let stored_ref =
            PresentationStore::asset_key(presentation_id, kind, "placeholder.png");
        let record = AssetRecord {
            id: new_id(),
            kind,
            source: source.clone(),
            stored_ref,
            size_bytes: SOLID_PNG.len() as u64,
            content_hash: source_hash(source),
            placeholder: true,
            created_at: Utc::now(),
        };
        if let Err(e) = self
            .store
            .put_asset(presentation_id, &record, SOLID_PNG.to_vec())
            .await
        {
            log::warn!("could not persist placeholder payload: {e}");
        }
        record
    }

    /// Resolve every declared asset across a slide set.
    ///
    /// Assets are independent, so they run concurrently under the bounded
    /// worker pool; results are written back by original (slide, element)
    /// index, never by completion order. Returns the number of degraded
    /// slides.
    pub async fn resolve_slides(
        &self,
        presentation_id: &str,
        slides: &mut [Slide],
    ) -> Result<usize> {
        let mut jobs = Vec::new();
        for (slide_idx, slide) in slides.iter().enumerate() {
            for (element_idx, element) in slide.elements.iter().enumerate() {
                if element.asset.is_some() {
                    continue; // already resolved on a previous pass
                }
                if let Some((kind, source)) = element.declared_source() {
                    jobs.push((slide_idx, element_idx, kind, source.clone()));
                }
            }
        }
        if jobs.is_empty() {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for (slide_idx, element_idx, kind, source) in jobs {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let id = presentation_id.to_string();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("asset pool semaphore closed");
                let (record, degraded) =
                    pipeline.resolve_or_placeholder(&id, kind, &source).await;
                (slide_idx, element_idx, record, degraded)
            });
        }

        let mut resolved = Vec::new();
        while let Some(joined) = set.join_next().await {
            let outcome = joined.map_err(|e| Error::Internal(e.to_string()))?;
            resolved.push(outcome);
        }
        // Re-assemble by original index.
        resolved.sort_by_key(|(s, e, _, _)| (*s, *e));

        let mut degraded_slides = 0;
        for (slide_idx, element_idx, record, degraded) in resolved {
            if degraded && slides[slide_idx].asset_status != AssetStatus::Degraded {
                slides[slide_idx].asset_status = AssetStatus::Degraded;
                degraded_slides += 1;
            }
            slides[slide_idx].elements[element_idx].asset = Some(record);
        }
        Ok(degraded_slides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::offline::{OfflineFetcher, OfflineGenerator};
    use crate::store::MemoryStore;
    use deck_core::{BoxFuture, Element, ElementContent, GenerateRequest, GeneratedContent, Region};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fetches; fails URLs containing "fail"; hangs on "slow".
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl AssetFetcher for CountingFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if url.contains("fail") {
                    return Err(Error::AssetFetch(format!("refused: {url}")));
                }
                if url.contains("slow") {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(format!("bytes of {url}").into_bytes())
            })
        }
    }

    fn pipeline_with(fetcher: Arc<dyn AssetFetcher>) -> AssetPipeline {
        AssetPipeline::new(
            PresentationStore::new(Arc::new(MemoryStore::new())),
            Arc::new(Cache::new()),
            fetcher,
            Arc::new(OfflineGenerator::new()),
            4,
            Duration::from_millis(200),
        )
    }

    fn image_slide(url: &str) -> Slide {
        let mut slide = Slide::new("Pictures");
        slide.elements.push(Element::new(
            Region::full_content(),
            ElementContent::Image {
                source: AssetSource::Url(url.to_string()),
                alt: None,
            },
        ));
        slide
    }

    #[test]
    fn test_source_hash_is_stable() {
        let a = AssetSource::Url("https://x/img.png".to_string());
        let b = AssetSource::Url("https://x/img.png".to_string());
        assert_eq!(source_hash(&a), source_hash(&b));
        let c = AssetSource::Url("https://x/other.png".to_string());
        assert_ne!(source_hash(&a), source_hash(&c));
    }

    #[tokio::test]
    async fn test_resolve_fetches_once_per_distinct_source() {
        let fetcher = Arc::new(CountingFetcher::default());
        let pipeline = pipeline_with(fetcher.clone());
        let source = AssetSource::Url("https://x/img.png".to_string());

        let first = pipeline.resolve("p1", AssetKind::Image, &source).await.unwrap();
        let second = pipeline.resolve("p1", AssetKind::Image, &source).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        // The existing record is returned unchanged.
        assert_eq!(first, second);
        assert!(!first.placeholder);
        assert_eq!(
            pipeline.store.get_asset_bytes(&first.stored_ref).await.unwrap(),
            Some(b"bytes of https://x/img.png".to_vec())
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_degrades_to_placeholder() {
        let pipeline = pipeline_with(Arc::new(CountingFetcher::default()));
        let source = AssetSource::Url("https://x/fail.png".to_string());
        let (record, degraded) = pipeline
            .resolve_or_placeholder("p1", AssetKind::Image, &source)
            .await;
        assert!(degraded);
        assert!(record.placeholder);
        assert_eq!(
            pipeline.store.get_asset_bytes(&record.stored_ref).await.unwrap(),
            Some(SOLID_PNG.to_vec())
        );
    }

    #[tokio::test]
    async fn test_timeout_degrades_only_affected_slide() {
        let pipeline = pipeline_with(Arc::new(CountingFetcher::default()));
        let mut slides = vec![
            image_slide("https://x/ok.png"),
            image_slide("https://x/slow.png"),
            image_slide("https://x/also-ok.png"),
        ];
        let degraded = pipeline.resolve_slides("p1", &mut slides).await.unwrap();

        assert_eq!(degraded, 1);
        assert_eq!(slides[0].asset_status, AssetStatus::Ok);
        assert_eq!(slides[1].asset_status, AssetStatus::Degraded);
        assert_eq!(slides[2].asset_status, AssetStatus::Ok);
        assert!(slides[1].elements[0].asset.as_ref().unwrap().placeholder);
        // Every slide still has a renderable record.
        for slide in &slides {
            assert!(slide.elements[0].asset.is_some());
        }
    }

    #[tokio::test]
    async fn test_generated_source_uses_generator() {
        let pipeline = pipeline_with(Arc::new(OfflineFetcher::new()));
        let source = AssetSource::Generated {
            prompt: "a mountain lake".to_string(),
            style: Some("photo".to_string()),
        };
        let record = pipeline.resolve("p1", AssetKind::Image, &source).await.unwrap();
        assert!(!record.placeholder);
        assert_eq!(record.size_bytes, SOLID_PNG.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_sources_fetch_once() {
        let fetcher = Arc::new(CountingFetcher::default());
        let pipeline = pipeline_with(fetcher.clone());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                let source = AssetSource::Url("https://x/shared.png".to_string());
                pipeline.resolve("p1", AssetKind::Image, &source).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slides_without_assets_untouched() {
        let pipeline = pipeline_with(Arc::new(CountingFetcher::default()));
        let mut slides = vec![Slide::new("No assets here")];
        let degraded = pipeline.resolve_slides("p1", &mut slides).await.unwrap();
        assert_eq!(degraded, 0);
        assert_eq!(slides[0].asset_status, AssetStatus::Ok);
    }
}

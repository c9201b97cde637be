//! Pipeline orchestration.
//!
//! [`DeckService`] wires the stages together: normalize raw input, apply
//! layout heuristics, suggest speaker notes through the cached generator,
//! resolve assets, persist, snapshot, export. Each stage degrades rather
//! than aborts where the data allows it; only invalid input and storage
//! failures surface as errors.

use crate::assets::{new_id, AssetPipeline};
use crate::cache::{cache_key, Cache};
use crate::collab::{AssetFetcher, ContentGenerator};
use crate::config::PipelineConfig;
use crate::store::{ObjectStore, PresentationStore};
use crate::version::VersionManager;
use deck_core::normalize::{flatten_text, SlideNormalizer};
use deck_core::{
    apply_layout, ArtifactRef, BumpKind, Error, ExportFormat, GenerateRequest, Presentation,
    RawSlide, Result, Slide, Theme, Version, VersionMeta,
};
use deck_export::{AssetBag, Exporter, RenderBackend};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Input for building a new presentation.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Explicit id; a fresh one is generated when absent.
    pub id: Option<String>,
    pub title: String,
    pub theme: Option<Theme>,
    pub slides: Vec<RawSlide>,
    /// Formats to export; empty selects the configured defaults.
    pub formats: Vec<ExportFormat>,
    /// Whether to fill in missing speaker notes via the generator.
    pub enhance_notes: bool,
    /// Whether to derive generated-image prompts for slides whose layout
    /// reserves an image region but carry no image.
    pub suggest_images: bool,
}

impl BuildRequest {
    pub fn new(title: impl Into<String>, slides: Vec<RawSlide>) -> Self {
        Self {
            id: None,
            title: title.into(),
            theme: None,
            slides,
            formats: Vec::new(),
            enhance_notes: false,
            suggest_images: false,
        }
    }
}

/// A partial update to an existing presentation.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub theme: Option<Theme>,
    /// Replacement slide content; absent leaves slides untouched.
    pub slides: Option<Vec<RawSlide>>,
    pub description: String,
    pub bump: BumpKind,
}

/// Per-build timing and shape numbers.
#[derive(Debug, Clone)]
pub struct BuildStats {
    pub slide_count: usize,
    pub generation_time_ms: u64,
}

/// What a build or export produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub presentation_id: String,
    pub version: Version,
    pub artifacts: BTreeMap<ExportFormat, ArtifactRef>,
    /// Formats that failed, with the failure message. Failures here never
    /// fail the build.
    pub format_errors: BTreeMap<ExportFormat, String>,
    pub degraded_slides: usize,
    pub stats: BuildStats,
}

/// Result of a standalone export run.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub artifacts: BTreeMap<ExportFormat, ArtifactRef>,
    pub format_errors: BTreeMap<ExportFormat, String>,
}

/// End-to-end presentation pipeline.
#[derive(Clone)]
pub struct DeckService {
    store: PresentationStore,
    cache: Arc<Cache>,
    assets: AssetPipeline,
    versions: VersionManager,
    exporter: Exporter,
    generator: Arc<dyn ContentGenerator>,
    config: PipelineConfig,
}

impl DeckService {
    pub fn new(
        config: PipelineConfig,
        object_store: Arc<dyn ObjectStore>,
        generator: Arc<dyn ContentGenerator>,
        fetcher: Arc<dyn AssetFetcher>,
        render: Arc<dyn RenderBackend>,
    ) -> Self {
        let store = PresentationStore::new(object_store);
        let cache = Arc::new(Cache::new());
        let assets = AssetPipeline::new(
            store.clone(),
            cache.clone(),
            fetcher,
            generator.clone(),
            config.worker_count,
            config.call_timeout,
        );
        let versions = VersionManager::new(store.clone());
        let exporter = Exporter::new(
            render,
            config.worker_count,
            config.call_timeout,
            config.video_slide_secs,
        );
        Self {
            store,
            cache,
            assets,
            versions,
            exporter,
            generator,
            config,
        }
    }

    /// Build a presentation from raw input: normalize, lay out, enhance,
    /// resolve assets, persist, snapshot as `1.0.0`, and export.
    pub async fn build(&self, request: BuildRequest) -> Result<BuildOutcome> {
        let started = Instant::now();
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("presentation title is empty".to_string()));
        }
        if request.slides.is_empty() {
            return Err(Error::Validation("presentation has no slides".to_string()));
        }
        let id = match request.id {
            Some(id) => {
                if self.store.exists(&id).await? {
                    return Err(Error::Validation(format!(
                        "presentation '{id}' already exists"
                    )));
                }
                id
            }
            None => new_id(),
        };

        let mut slides = SlideNormalizer::new().normalize_all(request.slides);
        for slide in &mut slides {
            apply_layout(slide, false);
        }
        if request.enhance_notes {
            self.suggest_notes(&mut slides).await;
        }
        if request.suggest_images {
            suggest_images(&mut slides);
        }
        let degraded_slides = self.assets.resolve_slides(&id, &mut slides).await?;

        let mut presentation = Presentation::new(id.clone(), title);
        if let Some(theme) = request.theme {
            presentation.theme = theme;
        }
        presentation.slides = slides;
        self.store.save(&presentation).await?;

        let record = self
            .versions
            .snapshot(&presentation, "initial build", BumpKind::Patch)
            .await?;

        let formats = self.effective_formats(&request.formats);
        let (artifacts, format_errors) = self.run_exports(&mut presentation, &formats).await?;

        presentation.versions = self.versions.list_versions(&id).await?;
        self.store.save(&presentation).await?;

        let stats = BuildStats {
            slide_count: presentation.slides.len(),
            generation_time_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "built presentation {id}: {} slides, {} artifacts, {} degraded, {}ms",
            stats.slide_count,
            artifacts.len(),
            degraded_slides,
            stats.generation_time_ms
        );
        Ok(BuildOutcome {
            presentation_id: id,
            version: record.version,
            artifacts,
            format_errors,
            degraded_slides,
            stats,
        })
    }

    /// Apply a partial update under the presentation's writer lock and
    /// record the resulting state as a new version.
    pub async fn update(&self, id: &str, request: UpdateRequest) -> Result<Presentation> {
        let _guard = self.versions.acquire(id).await;
        let mut presentation = self.store.load(id).await?;

        if let Some(title) = request.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::Validation("presentation title is empty".to_string()));
            }
            presentation.title = title;
        }
        if let Some(theme) = request.theme {
            presentation.theme = theme;
        }
        if let Some(raw) = request.slides {
            if raw.is_empty() {
                return Err(Error::Validation("presentation has no slides".to_string()));
            }
            let mut slides = SlideNormalizer::new().normalize_all(raw);
            for slide in &mut slides {
                apply_layout(slide, false);
            }
            self.assets.resolve_slides(id, &mut slides).await?;
            presentation.slides = slides;
        }

        let description = if request.description.is_empty() {
            "update".to_string()
        } else {
            request.description
        };
        self.versions
            .record_locked(&presentation, &description, request.bump)
            .await?;
        presentation.versions = self.versions.list_versions(id).await?;
        self.store.save(&presentation).await?;
        Ok(presentation)
    }

    /// Export a stored presentation to the requested formats.
    pub async fn export(&self, id: &str, formats: &[ExportFormat]) -> Result<ExportOutcome> {
        let mut presentation = self.store.load(id).await?;
        let formats = self.effective_formats(formats);
        let (artifacts, format_errors) = self.run_exports(&mut presentation, &formats).await?;
        self.store.save(&presentation).await?;
        Ok(ExportOutcome {
            artifacts,
            format_errors,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Presentation> {
        self.store.load(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn list_versions(&self, id: &str) -> Result<Vec<VersionMeta>> {
        self.versions.list_versions(id).await
    }

    /// Roll back to a stored version. The pre-revert state is snapshotted
    /// first, so the revert itself is undoable.
    pub async fn revert(&self, id: &str, version: &Version) -> Result<Presentation> {
        self.versions.revert(id, version).await
    }

    /// Drop stored assets no slide references anymore.
    pub async fn collect_garbage(&self, id: &str) -> Result<usize> {
        self.store.collect_unreferenced(id).await
    }

    /// Read back a stored export artifact.
    pub async fn get_artifact(&self, id: &str, format: ExportFormat) -> Result<Option<Vec<u8>>> {
        self.store.get_export(id, format).await
    }

    fn effective_formats(&self, requested: &[ExportFormat]) -> Vec<ExportFormat> {
        if requested.is_empty() {
            self.config.default_formats.clone()
        } else {
            requested.to_vec()
        }
    }

    /// Fill in missing speaker notes from the slide's visible text.
    ///
    /// Suggestions are advisory, so they go through the TTL'd cache and a
    /// generator failure just leaves the notes empty.
    async fn suggest_notes(&self, slides: &mut [Slide]) {
        for slide in slides.iter_mut() {
            if slide.notes.is_some() {
                continue;
            }
            let text = flatten_text(slide);
            if text.trim().is_empty() {
                continue;
            }
            let mut request = GenerateRequest::from_prompt(format!(
                "Write concise speaker notes for a slide containing: {text}"
            ));
            request.max_length = Some(80);

            let key = match cache_key("notes", &request) {
                Ok(key) => key,
                Err(e) => {
                    log::warn!("could not key note suggestion: {e}");
                    continue;
                }
            };
            let generator = self.generator.clone();
            let call_timeout = self.config.call_timeout;
            let suggested = self
                .cache
                .get_or_compute_json::<String, _, _>(&key, Some(self.config.cache_ttl), || {
                    async move {
                        let generated =
                            tokio::time::timeout(call_timeout, generator.generate(&request))
                                .await
                                .map_err(|_| Error::Timeout(call_timeout))??;
                        Ok(generated.content)
                    }
                })
                .await;
            match suggested {
                Ok(notes) if !notes.is_empty() => slide.notes = Some(notes),
                Ok(_) => {}
                Err(e) => log::warn!("note suggestion skipped for '{}': {e}", slide.title),
            }
        }
    }

    /// Produce every requested format; record successes in the store and
    /// collect failures per format.
    #[allow(clippy::type_complexity)]
    async fn run_exports(
        &self,
        presentation: &mut Presentation,
        formats: &[ExportFormat],
    ) -> Result<(BTreeMap<ExportFormat, ArtifactRef>, BTreeMap<ExportFormat, String>)> {
        let bag = self.collect_assets(presentation).await?;
        let results = self.exporter.export(presentation, &bag, formats).await;

        let mut artifacts = BTreeMap::new();
        let mut format_errors = BTreeMap::new();
        for (format, result) in results {
            match result {
                Ok(bytes) => {
                    let artifact = self
                        .store
                        .record_export(&presentation.id, format, bytes)
                        .await?;
                    presentation.exports.insert(format, artifact.clone());
                    artifacts.insert(format, artifact);
                }
                Err(e) => {
                    format_errors.insert(format, e.to_string());
                }
            }
        }
        Ok((artifacts, format_errors))
    }

    /// Gather resolved asset payloads for embedding into exports.
    async fn collect_assets(&self, presentation: &Presentation) -> Result<AssetBag> {
        let mut bag = AssetBag::new();
        for slide in &presentation.slides {
            for element in &slide.elements {
                let Some(record) = &element.asset else {
                    continue;
                };
                if bag.contains_key(&record.stored_ref) {
                    continue;
                }
                if let Some(bytes) = self.store.get_asset_bytes(&record.stored_ref).await? {
                    bag.insert(record.stored_ref.clone(), bytes);
                }
            }
        }
        Ok(bag)
    }
}

/// Add a generated-image element to slides whose layout template reserves
/// an image region but which carry no image themselves. The prompt is
/// derived from the slide's flattened text, so identical slides share one
/// generation through the content-addressed asset path.
fn suggest_images(slides: &mut [Slide]) {
    for slide in slides.iter_mut() {
        if slide.has_kind(deck_core::ElementKind::Image) {
            continue;
        }
        let Some(layout) = slide.layout else {
            continue;
        };
        let Some(image_region) = deck_core::layout::template(layout).image else {
            continue;
        };
        let text = flatten_text(slide);
        if text.trim().is_empty() {
            continue;
        }
        let prompt: String = text.split_whitespace().take(24).collect::<Vec<_>>().join(" ");
        slide.elements.push(deck_core::Element::new(
            image_region,
            deck_core::ElementContent::Image {
                source: deck_core::AssetSource::Generated {
                    prompt: format!("Illustration for a slide about: {prompt}"),
                    style: None,
                },
                alt: Some(slide.title.clone()).filter(|t| !t.is_empty()),
            },
        ));
    }
}

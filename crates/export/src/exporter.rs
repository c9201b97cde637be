//! Format orchestration.
//!
//! Builds the shared markup once, then produces each requested format
//! independently. A failure in one format never blocks the others; the
//! caller receives a per-format result map.

use crate::markup::build_markup;
use crate::pptx::{AssetBag, PptxWriter};
use crate::render::RenderBackend;
use crate::{document, video};
use deck_core::{ExportFormat, Presentation, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Multi-format exporter.
#[derive(Clone)]
pub struct Exporter {
    render: Arc<dyn RenderBackend>,
    concurrency: usize,
    call_timeout: Duration,
    video_slide_secs: f64,
}

impl Exporter {
    pub fn new(
        render: Arc<dyn RenderBackend>,
        concurrency: usize,
        call_timeout: Duration,
        video_slide_secs: f64,
    ) -> Self {
        Self {
            render,
            concurrency,
            call_timeout,
            video_slide_secs,
        }
    }

    /// Export the presentation to every requested format. Duplicate format
    /// requests collapse; each format carries its own result.
    pub async fn export(
        &self,
        presentation: &Presentation,
        assets: &AssetBag,
        formats: &[ExportFormat],
    ) -> BTreeMap<ExportFormat, Result<Vec<u8>>> {
        let markup = build_markup(presentation);
        let notes: Vec<Option<String>> = presentation
            .slides
            .iter()
            .map(|slide| slide.notes.clone())
            .collect();

        let mut results = BTreeMap::new();
        for format in formats {
            if results.contains_key(format) {
                continue;
            }
            let result = match format {
                ExportFormat::Pptx => PptxWriter::new().write(presentation, assets),
                ExportFormat::Pdf => {
                    document::build_document(
                        self.render.clone(),
                        &markup,
                        &notes,
                        self.concurrency,
                        self.call_timeout,
                    )
                    .await
                }
                ExportFormat::Mp4 => {
                    video::build_video(
                        self.render.clone(),
                        &markup,
                        self.video_slide_secs,
                        self.concurrency,
                        self.call_timeout,
                    )
                    .await
                }
            };
            if let Err(err) = &result {
                log::warn!("export to {format} failed: {err}");
            }
            results.insert(*format, result);
        }
        results
    }
}

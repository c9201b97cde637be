//! Paginated-document (PDF) export.
//!
//! Every frame is rendered to a fixed-size page image by the render
//! backend, then the backend assembles the pages into one document.
//! Speaker notes ride along as page metadata.

use crate::markup::DeckMarkup;
use crate::render::{render_frames, Page, RenderBackend};
use deck_core::Result;
use std::sync::Arc;
use std::time::Duration;

/// Render all frames and assemble them into a paginated document.
pub async fn build_document(
    backend: Arc<dyn RenderBackend>,
    markup: &DeckMarkup,
    notes: &[Option<String>],
    concurrency: usize,
    call_timeout: Duration,
) -> Result<Vec<u8>> {
    let images = render_frames(backend.clone(), &markup.frames, concurrency, call_timeout).await?;
    let pages: Vec<Page> = images
        .into_iter()
        .enumerate()
        .map(|(idx, image)| Page {
            image,
            notes: notes.get(idx).cloned().flatten(),
        })
        .collect();
    backend.assemble_document(pages).await
}

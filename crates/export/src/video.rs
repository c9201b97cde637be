//! Video export.
//!
//! Slides become still frames shown for a fixed duration each; the render
//! backend encodes the sequence. Notes are not representable in video and
//! are dropped for this format.

use crate::markup::DeckMarkup;
use crate::render::{render_frames, RenderBackend};
use deck_core::Result;
use std::sync::Arc;
use std::time::Duration;

/// Render all frames and encode them into a video.
pub async fn build_video(
    backend: Arc<dyn RenderBackend>,
    markup: &DeckMarkup,
    slide_secs: f64,
    concurrency: usize,
    call_timeout: Duration,
) -> Result<Vec<u8>> {
    let frames = render_frames(backend.clone(), &markup.frames, concurrency, call_timeout).await?;
    backend.encode_video(frames, slide_secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::build_markup;
    use crate::render::offline::OfflineRenderer;
    use deck_core::{Presentation, Slide};

    #[tokio::test]
    async fn test_video_carries_every_slide_at_fixed_duration() {
        let mut p = Presentation::new("p1", "Deck");
        for i in 0..3 {
            p.add_slide(Slide::new(format!("Slide {}", i + 1)));
        }
        let markup = build_markup(&p);

        let backend = Arc::new(OfflineRenderer::new());
        let bytes = build_video(backend, &markup, 5.0, 2, Duration::from_secs(5))
            .await
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("video:5s/slide"));
        assert_eq!(text.matches("page:").count(), 3);
    }
}

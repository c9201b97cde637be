//! Render backend collaborator seam.
//!
//! Paginated-document and video exports delegate pixel work to an external
//! headless renderer / encoder. The pipeline only speaks this trait; test
//! doubles and offline stand-ins are plain structs.

use crate::markup::FrameSpec;
use deck_core::{BoxFuture, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One rendered page plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Fixed-size page image bytes.
    pub image: Vec<u8>,
    /// Speaker notes attached as metadata, never drawn into the image.
    pub notes: Option<String>,
}

/// External rendering and encoding collaborator.
pub trait RenderBackend: Send + Sync {
    /// Render one frame to a fixed-size page image.
    fn render_frame<'a>(&'a self, frame: &'a FrameSpec) -> BoxFuture<'a, Result<Vec<u8>>>;

    /// Concatenate rendered pages into one paginated document.
    fn assemble_document<'a>(&'a self, pages: Vec<Page>) -> BoxFuture<'a, Result<Vec<u8>>>;

    /// Concatenate still frames into a video at a fixed per-slide duration.
    fn encode_video<'a>(
        &'a self,
        frames: Vec<Vec<u8>>,
        slide_secs: f64,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Render every frame through a bounded worker pool, preserving slide
/// order in the result regardless of completion order. Each render call
/// runs under the configured deadline.
pub async fn render_frames(
    backend: Arc<dyn RenderBackend>,
    frames: &[FrameSpec],
    concurrency: usize,
    call_timeout: Duration,
) -> Result<Vec<Vec<u8>>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (idx, frame) in frames.iter().cloned().enumerate() {
        let backend = backend.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("render pool semaphore closed");
            let image = tokio::time::timeout(call_timeout, backend.render_frame(&frame))
                .await
                .map_err(|_| Error::Timeout(call_timeout))??;
            Ok::<(usize, Vec<u8>), Error>((idx, image))
        });
    }

    let mut rendered: Vec<(usize, Vec<u8>)> = Vec::with_capacity(frames.len());
    while let Some(joined) = set.join_next().await {
        let (idx, image) = joined.map_err(|e| Error::Internal(e.to_string()))??;
        rendered.push((idx, image));
    }
    rendered.sort_by_key(|(idx, _)| *idx);
    Ok(rendered.into_iter().map(|(_, image)| image).collect())
}

/// Deterministic in-process stand-ins for environments without a real
/// renderer or encoder. Output is structured text, not pixels, which is
/// enough for the pipeline and its tests to exercise every seam.
pub mod offline {
    use super::*;

    #[derive(Debug, Clone, Default)]
    pub struct OfflineRenderer;

    impl OfflineRenderer {
        pub fn new() -> Self {
            Self
        }
    }

    impl RenderBackend for OfflineRenderer {
        fn render_frame<'a>(&'a self, frame: &'a FrameSpec) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                let mut out = format!("page:{}:{}\n", frame.index, frame.title);
                for element in &frame.elements {
                    if let Some(text) = &element.text {
                        out.push_str(text);
                        out.push('\n');
                    }
                }
                Ok(out.into_bytes())
            })
        }

        fn assemble_document<'a>(&'a self, pages: Vec<Page>) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                let mut out = String::new();
                for page in &pages {
                    out.push_str(&String::from_utf8_lossy(&page.image));
                    if let Some(notes) = &page.notes {
                        out.push_str("notes:");
                        out.push_str(notes);
                        out.push('\n');
                    }
                }
                Ok(out.into_bytes())
            })
        }

        fn encode_video<'a>(
            &'a self,
            frames: Vec<Vec<u8>>,
            slide_secs: f64,
        ) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move {
                let mut out = format!("video:{slide_secs}s/slide\n");
                for frame in &frames {
                    out.push_str(&String::from_utf8_lossy(frame));
                }
                Ok(out.into_bytes())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::offline::OfflineRenderer;
    use super::*;
    use crate::markup::PxRect;

    fn frame(index: usize) -> FrameSpec {
        FrameSpec {
            index,
            title: format!("Slide {index}"),
            title_rect: PxRect {
                x: 96,
                y: 43,
                w: 1728,
                h: 151,
            },
            layout: None,
            background: "FFFFFF".to_string(),
            elements: Vec::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rendered_frames_keep_slide_order() {
        struct JitteryRenderer;
        impl RenderBackend for JitteryRenderer {
            fn render_frame<'a>(&'a self, frame: &'a FrameSpec) -> BoxFuture<'a, Result<Vec<u8>>> {
                let index = frame.index;
                Box::pin(async move {
                    // Later slides finish first.
                    let delay = 40u64.saturating_sub(index as u64 * 5);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(format!("{index}").into_bytes())
                })
            }
            fn assemble_document<'a>(&'a self, _: Vec<Page>) -> BoxFuture<'a, Result<Vec<u8>>> {
                Box::pin(async { Ok(Vec::new()) })
            }
            fn encode_video<'a>(
                &'a self,
                _: Vec<Vec<u8>>,
                _: f64,
            ) -> BoxFuture<'a, Result<Vec<u8>>> {
                Box::pin(async { Ok(Vec::new()) })
            }
        }

        let frames: Vec<FrameSpec> = (1..=6).map(frame).collect();
        let images = render_frames(
            Arc::new(JitteryRenderer),
            &frames,
            4,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let order: Vec<String> = images
            .into_iter()
            .map(|b| String::from_utf8(b).unwrap())
            .collect();
        assert_eq!(order, vec!["1", "2", "3", "4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_slow_render_times_out() {
        struct StuckRenderer;
        impl RenderBackend for StuckRenderer {
            fn render_frame<'a>(&'a self, _: &'a FrameSpec) -> BoxFuture<'a, Result<Vec<u8>>> {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                })
            }
            fn assemble_document<'a>(&'a self, _: Vec<Page>) -> BoxFuture<'a, Result<Vec<u8>>> {
                Box::pin(async { Ok(Vec::new()) })
            }
            fn encode_video<'a>(
                &'a self,
                _: Vec<Vec<u8>>,
                _: f64,
            ) -> BoxFuture<'a, Result<Vec<u8>>> {
                Box::pin(async { Ok(Vec::new()) })
            }
        }

        let frames = vec![frame(1)];
        let err = render_frames(
            Arc::new(StuckRenderer),
            &frames,
            1,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_offline_renderer_is_deterministic() {
        let backend = OfflineRenderer::new();
        let f = frame(1);
        let a = backend.render_frame(&f).await.unwrap();
        let b = backend.render_frame(&f).await.unwrap();
        assert_eq!(a, b);
        assert!(String::from_utf8(a).unwrap().starts_with("page:1:Slide 1"));
    }
}

//! End-to-end pipeline scenarios over in-memory collaborators.

use deck_core::{
    BoxFuture, BumpKind, Element, ElementContent, Error, ExportFormat, RawSlide, Region, Result,
    Version,
};
use deck_export::render::offline::OfflineRenderer;
use deck_export::{read_pptx, FrameSpec, Page, RenderBackend};
use deck_pipeline::collab::offline::{OfflineFetcher, OfflineGenerator};
use deck_pipeline::{BuildRequest, DeckService, MemoryStore, PipelineConfig, UpdateRequest};
use std::sync::Arc;

fn service_with_render(render: Arc<dyn RenderBackend>) -> DeckService {
    DeckService::new(
        PipelineConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(OfflineGenerator::new()),
        Arc::new(OfflineFetcher::new()),
        render,
    )
}

fn service() -> DeckService {
    service_with_render(Arc::new(OfflineRenderer::new()))
}

fn narrated_slides(count: usize) -> Vec<RawSlide> {
    (1..=count)
        .map(|n| RawSlide::Structured {
            title: Some(format!("Section {n}")),
            elements: vec![Element::text(
                Region::full_content(),
                format!("Body of section {n}"),
            )],
            notes: Some(format!("Say this on slide {n}")),
        })
        .collect()
}

#[tokio::test]
async fn exported_deck_round_trips_order_count_and_notes() {
    let service = service();
    let outcome = service
        .build(BuildRequest::new("Narrated Deck", narrated_slides(5)))
        .await
        .unwrap();

    let bytes = service
        .get_artifact(&outcome.presentation_id, ExportFormat::Pptx)
        .await
        .unwrap()
        .expect("pptx artifact stored");
    let slides = read_pptx(&bytes).unwrap();

    assert_eq!(slides.len(), 5);
    for (i, slide) in slides.iter().enumerate() {
        let n = i + 1;
        assert!(slide
            .texts
            .iter()
            .any(|t| t.contains(&format!("Section {n}"))));
        assert_eq!(
            slide.notes.as_deref(),
            Some(format!("Say this on slide {n}").as_str())
        );
        // Notes are metadata; they never appear as visible shape text.
        assert!(!slide.texts.iter().any(|t| t.contains("Say this")));
    }
}

#[tokio::test]
async fn unreachable_image_degrades_slide_but_deck_still_exports() {
    let service = service();
    let mut raw = narrated_slides(2);
    raw.push(RawSlide::Structured {
        title: Some("Broken image".to_string()),
        elements: vec![Element::new(
            Region::full_content(),
            ElementContent::Image {
                source: deck_core::AssetSource::Url(
                    "https://nowhere.example/missing.png".to_string(),
                ),
                alt: Some("missing diagram".to_string()),
            },
        )],
        notes: None,
    });

    let outcome = service
        .build(BuildRequest::new("Partially Degraded", raw))
        .await
        .unwrap();
    assert_eq!(outcome.degraded_slides, 1);
    assert!(outcome.format_errors.is_empty());

    let stored = service.get(&outcome.presentation_id).await.unwrap();
    assert_eq!(stored.degraded_slides(), vec![2]);
    let record = stored.slides[2].elements[0].asset.as_ref().unwrap();
    assert!(record.placeholder);

    // The placeholder payload itself was persisted and is embeddable.
    let bytes = service
        .get_artifact(&outcome.presentation_id, ExportFormat::Pptx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read_pptx(&bytes).unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_updates_produce_a_gapless_history() {
    let service = service();
    let outcome = service
        .build(BuildRequest::new("Contended", narrated_slides(1)))
        .await
        .unwrap();
    let id = outcome.presentation_id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            service
                .update(
                    &id,
                    UpdateRequest {
                        title: Some(format!("Contended {i}")),
                        description: format!("writer {i}"),
                        bump: BumpKind::Patch,
                        ..UpdateRequest::default()
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let versions = service.list_versions(&id).await.unwrap();
    let labels: Vec<String> = versions.iter().map(|v| v.version.to_string()).collect();
    let expected: Vec<String> = (0..=8).map(|p| format!("1.0.{p}")).collect();
    assert_eq!(labels, expected);
}

#[tokio::test]
async fn failing_video_encoder_does_not_block_other_formats() {
    struct NoEncoder;
    impl RenderBackend for NoEncoder {
        fn render_frame<'a>(&'a self, frame: &'a FrameSpec) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move { OfflineRenderer::new().render_frame(frame).await })
        }
        fn assemble_document<'a>(&'a self, pages: Vec<Page>) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async move { OfflineRenderer::new().assemble_document(pages).await })
        }
        fn encode_video<'a>(&'a self, _: Vec<Vec<u8>>, _: f64) -> BoxFuture<'a, Result<Vec<u8>>> {
            Box::pin(async {
                Err(Error::ExportFormat {
                    format: "mp4".to_string(),
                    message: "no encoder installed".to_string(),
                })
            })
        }
    }

    let service = service_with_render(Arc::new(NoEncoder));
    let mut request = BuildRequest::new("Mixed Formats", narrated_slides(2));
    request.formats = vec![ExportFormat::Pptx, ExportFormat::Pdf, ExportFormat::Mp4];
    let outcome = service.build(request).await.unwrap();

    assert!(outcome.artifacts.contains_key(&ExportFormat::Pptx));
    assert!(outcome.artifacts.contains_key(&ExportFormat::Pdf));
    assert!(!outcome.artifacts.contains_key(&ExportFormat::Mp4));
    assert!(outcome.format_errors[&ExportFormat::Mp4].contains("no encoder"));

    // Nothing was stored for the failed format.
    let mp4 = service
        .get_artifact(&outcome.presentation_id, ExportFormat::Mp4)
        .await
        .unwrap();
    assert!(mp4.is_none());
}

#[tokio::test]
async fn revert_then_revert_again() {
    let service = service();
    let outcome = service
        .build(BuildRequest::new("History", narrated_slides(1)))
        .await
        .unwrap();
    let id = outcome.presentation_id;

    service
        .update(
            &id,
            UpdateRequest {
                title: Some("History, second draft".to_string()),
                description: "second draft".to_string(),
                bump: BumpKind::Minor,
                ..UpdateRequest::default()
            },
        )
        .await
        .unwrap();

    let restored = service.revert(&id, &Version::initial()).await.unwrap();
    assert_eq!(restored.title, "History");

    // The pre-revert snapshot lets us get the second draft back.
    let latest_draft = service
        .list_versions(&id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .max()
        .unwrap();
    let undone = service.revert(&id, &latest_draft).await.unwrap();
    assert_eq!(undone.title, "History, second draft");
}

#[tokio::test]
async fn garbage_collection_keeps_referenced_assets() {
    let service = service();
    let raw = vec![RawSlide::Structured {
        title: Some("Generated art".to_string()),
        elements: vec![Element::new(
            Region::full_content(),
            ElementContent::Image {
                source: deck_core::AssetSource::Generated {
                    prompt: "abstract waves".to_string(),
                    style: None,
                },
                alt: None,
            },
        )],
        notes: None,
    }];
    let outcome = service.build(BuildRequest::new("Art", raw)).await.unwrap();
    let id = outcome.presentation_id;

    // Everything referenced: nothing to collect.
    assert_eq!(service.collect_garbage(&id).await.unwrap(), 0);

    // Replace the slide set; the old asset becomes unreferenced.
    service
        .update(
            &id,
            UpdateRequest {
                slides: Some(vec![RawSlide::Plain("text only now".to_string())]),
                description: "drop the image".to_string(),
                bump: BumpKind::Major,
                ..UpdateRequest::default()
            },
        )
        .await
        .unwrap();
    assert!(service.collect_garbage(&id).await.unwrap() >= 2);
}

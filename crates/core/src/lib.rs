//! Core domain types, slide schema normalization, and layout heuristics
//! for the presentation pipeline.

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod layout;
pub mod normalize;
pub mod types;

pub use error::{Error, Result};
pub use layout::{apply_layout, recommend, LayoutTemplate, LayoutTemplateId};
pub use normalize::{flatten_text, has_bullet_marker, word_count, SlideNormalizer};
pub use types::{
    ArtifactRef, AssetKind, AssetRecord, AssetSource, AssetStatus, BumpKind, Change, ChangeOp,
    ChartKind, Element, ElementContent, ElementKind, ElementStyle, ExportFormat,
    GenerateRequest, GeneratedContent, Presentation, RawSlide, Region, Slide, Theme, Version,
    VersionMeta, VersionRecord,
};

/// Boxed, sendable future used by collaborator trait seams so they stay
/// object-safe and test doubles remain plain structs.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

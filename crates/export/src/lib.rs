//! Multi-format presentation export.
//!
//! Canonical slides are projected into a shared intermediate markup on a
//! fixed 1920x1080 logical canvas, then written out per format: native
//! slide-deck archives (.pptx), paginated documents via a render backend,
//! and fixed-duration videos via the same backend.

pub mod document;
pub mod exporter;
pub mod markup;
pub mod pptx;
pub mod render;
pub mod video;

pub use exporter::Exporter;
pub use markup::{build_markup, DeckMarkup, FrameElement, FrameSpec, PxRect};
pub use pptx::{read_pptx, AssetBag, PptxWriter, ReadSlide};
pub use render::{Page, RenderBackend};

//! Presentation build, enhancement, and persistence pipeline.
//!
//! Stages: schema normalization and layout heuristics (from `deck-core`),
//! cached content generation, concurrent asset resolution with placeholder
//! degradation, durable storage over an object-store abstraction, and an
//! append-only version history. [`DeckService`] ties the stages together
//! and drives `deck-export` for artifacts.

pub mod assets;
pub mod cache;
pub mod collab;
pub mod config;
pub mod service;
pub mod store;
pub mod version;

pub use assets::AssetPipeline;
pub use cache::{cache_key, Cache};
pub use collab::{AssetFetcher, ContentGenerator};
pub use config::PipelineConfig;
pub use service::{BuildOutcome, BuildRequest, DeckService, ExportOutcome, UpdateRequest};
pub use store::{FsStore, MemoryStore, ObjectStore, PresentationStore};
pub use version::VersionManager;

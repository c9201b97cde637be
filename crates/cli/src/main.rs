//! CLI for building, exporting, and versioning presentations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deck_core::{BumpKind, ExportFormat, RawSlide, Theme, Version};
use deck_export::render::offline::OfflineRenderer;
use deck_pipeline::collab::offline::{OfflineFetcher, OfflineGenerator};
use deck_pipeline::{BuildRequest, DeckService, FsStore, PipelineConfig, UpdateRequest};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build, export, and version presentations from structured slide input.
#[derive(Parser, Debug)]
#[command(name = "deck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store directory (default: $DECK_STORE_DIR or ./deck-store)
    #[arg(short, long)]
    store_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a presentation from a JSON deck file
    Build {
        /// Input deck file (JSON: title, optional theme, slides)
        input: PathBuf,

        /// Use this presentation id instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Formats to export (comma-separated: pptx,pdf,mp4)
        #[arg(short, long)]
        formats: Option<String>,

        /// Fill in missing speaker notes
        #[arg(short, long)]
        notes: bool,

        /// Suggest generated images for layouts that reserve an image region
        #[arg(short, long)]
        images: bool,

        /// Copy export artifacts into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a stored presentation
    Export {
        id: String,

        /// Formats to export (comma-separated: pptx,pdf,mp4)
        #[arg(short, long)]
        formats: Option<String>,

        /// Copy export artifacts into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Update title or slides of a stored presentation
    Update {
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// Replacement deck file (JSON); slides replace the stored ones
        #[arg(long)]
        input: Option<PathBuf>,

        /// Version component to bump (major, minor, patch)
        #[arg(long, default_value = "patch")]
        bump: String,

        /// Change description recorded with the version
        #[arg(short, long, default_value = "update")]
        message: String,
    },

    /// Show a stored presentation
    Show { id: String },

    /// List the version history of a presentation
    Versions { id: String },

    /// Roll a presentation back to a version (e.g. 1.0.0)
    Revert { id: String, version: String },

    /// Remove stored assets no slide references
    Gc { id: String },
}

/// On-disk deck input.
#[derive(Debug, Deserialize)]
struct DeckFile {
    title: String,
    #[serde(default)]
    theme: Option<Theme>,
    slides: Vec<RawSlide>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let mut config = PipelineConfig::from_env();
    if let Some(dir) = &args.store_dir {
        config.store_root = Some(dir.clone());
    }
    let store_root = config
        .store_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("./deck-store"));
    if args.verbose {
        eprintln!("Store: {}", store_root.display());
    }

    let service = DeckService::new(
        config,
        Arc::new(FsStore::new(store_root)),
        Arc::new(OfflineGenerator::new()),
        Arc::new(OfflineFetcher::new()),
        Arc::new(OfflineRenderer::new()),
    );

    match args.command {
        Command::Build {
            input,
            id,
            formats,
            notes,
            images,
            output,
        } => {
            let deck = read_deck(&input)?;
            log::debug!("loaded {} raw slides from {}", deck.slides.len(), input.display());
            let mut request = BuildRequest::new(deck.title, deck.slides);
            request.id = id;
            request.theme = deck.theme;
            request.formats = parse_formats(formats.as_deref())?;
            request.enhance_notes = notes;
            request.suggest_images = images;

            let outcome = service.build(request).await?;
            println!(
                "Built {} ({} slides, version {}, {}ms)",
                outcome.presentation_id,
                outcome.stats.slide_count,
                outcome.version,
                outcome.stats.generation_time_ms
            );
            if outcome.degraded_slides > 0 {
                eprintln!(
                    "Warning: {} slide(s) degraded to placeholder assets",
                    outcome.degraded_slides
                );
            }
            report_exports(&outcome.artifacts, &outcome.format_errors);
            if let Some(dir) = output {
                copy_artifacts(&service, &outcome.presentation_id, &outcome.artifacts, &dir)
                    .await?;
            }
        }

        Command::Export {
            id,
            formats,
            output,
        } => {
            let outcome = service
                .export(&id, &parse_formats(formats.as_deref())?)
                .await?;
            report_exports(&outcome.artifacts, &outcome.format_errors);
            if let Some(dir) = output {
                copy_artifacts(&service, &id, &outcome.artifacts, &dir).await?;
            }
        }

        Command::Update {
            id,
            title,
            input,
            bump,
            message,
        } => {
            let slides = match input {
                Some(path) => Some(read_deck(&path)?.slides),
                None => None,
            };
            let bump = parse_bump(&bump)?;
            let updated = service
                .update(
                    &id,
                    UpdateRequest {
                        title,
                        theme: None,
                        slides,
                        description: message,
                        bump,
                    },
                )
                .await?;
            let latest = updated
                .versions
                .last()
                .map(|v| v.version.to_string())
                .unwrap_or_default();
            println!("Updated {id} to version {latest}");
        }

        Command::Show { id } => {
            let presentation = service.get(&id).await?;
            println!("{}: {}", presentation.id, presentation.title);
            println!("Theme: {}", presentation.theme.name);
            for (idx, slide) in presentation.slides.iter().enumerate() {
                let layout = slide
                    .layout
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}. {} [{}] ({} elements)",
                    idx + 1,
                    slide.title,
                    layout,
                    slide.elements.len()
                );
            }
            for (format, artifact) in &presentation.exports {
                println!("Export: {format} ({} bytes)", artifact.size_bytes);
            }
        }

        Command::Versions { id } => {
            for meta in service.list_versions(&id).await? {
                println!(
                    "{}  {}  {}",
                    meta.version,
                    meta.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    meta.description
                );
            }
        }

        Command::Revert { id, version } => {
            let version: Version = version
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid version: {e}"))?;
            let restored = service.revert(&id, &version).await?;
            println!("Reverted {id} to {version} ({})", restored.title);
        }

        Command::Gc { id } => {
            let removed = service.collect_garbage(&id).await?;
            println!("Removed {removed} unreferenced asset object(s)");
        }
    }

    Ok(())
}

/// Read and parse a JSON deck file.
fn read_deck(path: &Path) -> Result<DeckFile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse deck file {}", path.display()))
}

/// Parse a comma-separated format list; empty means configured defaults.
fn parse_formats(spec: Option<&str>) -> Result<Vec<ExportFormat>> {
    let Some(spec) = spec else {
        return Ok(Vec::new());
    };
    spec.split(',')
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| {
            f.parse()
                .map_err(|e| anyhow::anyhow!("unknown format '{f}': {e}"))
        })
        .collect()
}

fn parse_bump(spec: &str) -> Result<BumpKind> {
    match spec {
        "major" => Ok(BumpKind::Major),
        "minor" => Ok(BumpKind::Minor),
        "patch" => Ok(BumpKind::Patch),
        other => anyhow::bail!("unknown bump '{other}' (expected major, minor, or patch)"),
    }
}

fn report_exports(
    artifacts: &std::collections::BTreeMap<ExportFormat, deck_core::ArtifactRef>,
    errors: &std::collections::BTreeMap<ExportFormat, String>,
) {
    for (format, artifact) in artifacts {
        println!("Exported {format}: {} bytes", artifact.size_bytes);
    }
    for (format, message) in errors {
        eprintln!("Export to {format} failed: {message}");
    }
}

/// Copy stored artifacts into an output directory.
async fn copy_artifacts(
    service: &DeckService,
    id: &str,
    artifacts: &std::collections::BTreeMap<ExportFormat, deck_core::ArtifactRef>,
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    for format in artifacts.keys() {
        let Some(bytes) = service.get_artifact(id, *format).await? else {
            continue;
        };
        let path = dir.join(format.file_name());
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Written to: {}", path.display());
    }
    Ok(())
}

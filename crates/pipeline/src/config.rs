//! Pipeline configuration.
//!
//! Built from environment variables (a `.env` file is honored) with
//! defaults suitable for local runs. Components receive the config by
//! value; nothing reads the environment after startup.

use deck_core::ExportFormat;
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the build/export pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the filesystem object store. `None` selects the
    /// in-memory store.
    pub store_root: Option<PathBuf>,

    /// Bounded worker-pool size for asset resolution and frame rendering.
    pub worker_count: usize,

    /// Deadline applied to every external-collaborator call.
    pub call_timeout: Duration,

    /// Formats exported when a request does not name any.
    pub default_formats: Vec<ExportFormat>,

    /// Advisory TTL for cached generation results (speaker-note
    /// suggestions). Content-addressed assets ignore this.
    pub cache_ttl: Duration,

    /// Seconds each slide is shown in video exports.
    pub video_slide_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_root: None,
            worker_count: 4,
            call_timeout: Duration::from_secs(30),
            default_formats: vec![ExportFormat::Pptx],
            cache_ttl: Duration::from_secs(15 * 60),
            video_slide_secs: 5.0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DECK_STORE_DIR") {
            if !dir.trim().is_empty() {
                config.store_root = Some(PathBuf::from(dir));
            }
        }
        if let Some(n) = parse_var::<usize>("DECK_WORKERS") {
            config.worker_count = n.max(1);
        }
        if let Some(secs) = parse_var::<u64>("DECK_TIMEOUT_SECS") {
            config.call_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64>("DECK_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<f64>("DECK_VIDEO_SLIDE_SECS") {
            if secs > 0.0 {
                config.video_slide_secs = secs;
            }
        }
        if let Ok(formats) = std::env::var("DECK_DEFAULT_FORMATS") {
            let parsed: Vec<ExportFormat> = formats
                .split(',')
                .filter_map(|f| f.trim().parse().ok())
                .collect();
            if !parsed.is_empty() {
                config.default_formats = parsed;
            }
        }
        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

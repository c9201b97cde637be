//! Domain types for presentations, slides, assets, and versions.

use crate::layout::LayoutTemplateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A presentation aggregate: ordered slides plus theme, export artifacts,
/// and version metadata.
///
/// Owned exclusively by the presentation store; callers hold copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    /// Stable identifier (random hex).
    pub id: String,

    /// Display title.
    pub title: String,

    /// Visual theme applied at export time.
    #[serde(default)]
    pub theme: Theme,

    /// Slides in presentation order.
    pub slides: Vec<Slide>,

    /// Export artifacts keyed by format. Derived, never authoritative:
    /// always regenerable from `slides` + `theme`.
    #[serde(default)]
    pub exports: BTreeMap<ExportFormat, ArtifactRef>,

    /// Lightweight version history (full snapshots live in the store).
    #[serde(default)]
    pub versions: Vec<VersionMeta>,
}

impl Presentation {
    /// Create an empty presentation with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            theme: Theme::default(),
            slides: Vec::new(),
            exports: BTreeMap::new(),
            versions: Vec::new(),
        }
    }

    /// Add a slide to the presentation.
    pub fn add_slide(&mut self, slide: Slide) {
        self.slides.push(slide);
    }

    /// Slide indexes (0-based) whose asset resolution was degraded.
    pub fn degraded_slides(&self) -> Vec<usize> {
        self.slides
            .iter()
            .enumerate()
            .filter(|(_, s)| s.asset_status == AssetStatus::Degraded)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Visual theme. Aesthetics are out of scope; these fields exist so exports
/// carry a consistent background and text treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    /// Background color as `RRGGBB` hex.
    pub background: String,
    /// Body text color as `RRGGBB` hex.
    pub text_color: String,
    /// Accent color as `RRGGBB` hex.
    pub accent: String,
    pub font: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            background: "FFFFFF".to_string(),
            text_color: "1A1A1A".to_string(),
            accent: "2563EB".to_string(),
            font: "Calibri".to_string(),
        }
    }
}

/// A slide as accepted from callers, before normalization.
///
/// Two variants carry equivalent semantics: a flat bullet list and a nested
/// element tree. The flat variant is an input-only convenience; after
/// normalization only the canonical [`Slide`] exists internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSlide {
    /// Already-structured slide content.
    Structured {
        #[serde(default)]
        title: Option<String>,
        elements: Vec<Element>,
        #[serde(default)]
        notes: Option<String>,
    },
    /// Title plus a list of bullet strings.
    Flat {
        #[serde(default)]
        title: Option<String>,
        bullets: Vec<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    /// A bare list of lines.
    Lines(Vec<String>),
    /// A single block of text.
    Plain(String),
    /// Anything else. Normalization degrades this to an empty content
    /// element rather than erroring.
    Other(serde_json::Value),
}

/// The canonical slide representation every pipeline stage operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Slide title (may be empty).
    #[serde(default)]
    pub title: String,

    /// Positioned content elements.
    pub elements: Vec<Element>,

    /// Optional speaker notes. Attached to exports as metadata, never
    /// burned into visible pixels.
    #[serde(default)]
    pub notes: Option<String>,

    /// Layout chosen by the heuristic engine, if any.
    #[serde(default)]
    pub layout: Option<LayoutTemplateId>,

    /// Set when the user customized the layout by hand. The heuristic
    /// engine never silently reformats such slides.
    #[serde(default)]
    pub user_overridden: bool,

    /// Result of asset resolution for this slide.
    #[serde(default)]
    pub asset_status: AssetStatus,
}

impl Slide {
    /// Create a slide with a title and no elements.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
            notes: None,
            layout: None,
            user_overridden: false,
            asset_status: AssetStatus::Ok,
        }
    }

    /// Whether any element is of the given kind.
    pub fn has_kind(&self, kind: ElementKind) -> bool {
        self.elements.iter().any(|e| e.kind() == kind)
    }
}

/// A positioned piece of slide content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Bounding box in percentage units of the slide canvas.
    pub position: Region,

    /// Kind-specific payload. Serialized with a `kind` tag.
    #[serde(flatten)]
    pub content: ElementContent,

    /// Text styling hints.
    #[serde(default)]
    pub style: ElementStyle,

    /// Resolved asset record, filled by the asset pipeline for elements
    /// that declare a source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetRecord>,
}

impl Element {
    /// Create an element from content, spanning the given region.
    pub fn new(position: Region, content: ElementContent) -> Self {
        Self {
            position,
            content,
            style: ElementStyle::default(),
            asset: None,
        }
    }

    /// Create a text element.
    pub fn text(position: Region, text: impl Into<String>) -> Self {
        Self::new(position, ElementContent::Text { text: text.into() })
    }

    /// The element kind, derived from its content.
    pub fn kind(&self) -> ElementKind {
        match self.content {
            ElementContent::Text { .. } => ElementKind::Text,
            ElementContent::Image { .. } => ElementKind::Image,
            ElementContent::Chart { .. } => ElementKind::Chart,
            ElementContent::Icon { .. } => ElementKind::Icon,
            ElementContent::Map { .. } => ElementKind::Map,
            ElementContent::Process { .. } => ElementKind::Process,
        }
    }

    /// The declared asset source, if this element references one.
    pub fn declared_source(&self) -> Option<(AssetKind, &AssetSource)> {
        match &self.content {
            ElementContent::Image { source, .. } => Some((AssetKind::Image, source)),
            ElementContent::Chart {
                source: Some(source),
                ..
            } => Some((AssetKind::Chart, source)),
            ElementContent::Icon {
                source: Some(source),
                ..
            } => Some((AssetKind::Icon, source)),
            _ => None,
        }
    }
}

/// Kind-specific element payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementContent {
    /// Plain text, possibly multi-line with bullet markers.
    Text { text: String },
    /// An image resolved through the asset pipeline.
    Image {
        source: AssetSource,
        #[serde(default)]
        alt: Option<String>,
    },
    /// A data chart rendered natively by export backends. A declared
    /// `source` points to a pre-rendered chart image instead.
    Chart {
        chart: ChartKind,
        labels: Vec<String>,
        values: Vec<f64>,
        #[serde(default)]
        source: Option<AssetSource>,
    },
    /// A named icon, optionally backed by fetched/generated bytes.
    Icon {
        name: String,
        #[serde(default)]
        source: Option<AssetSource>,
    },
    /// A geographic map region.
    Map { region: String },
    /// An ordered step/process sequence.
    Process { steps: Vec<String> },
}

/// Element kinds, derived from [`ElementContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Image,
    Chart,
    Icon,
    Map,
    Process,
}

/// Native chart kinds supported by the slide-deck backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Line,
    Area,
}

impl ChartKind {
    /// OOXML chart element name for this kind.
    pub fn ooxml_name(&self) -> &'static str {
        match self {
            ChartKind::Bar => "barChart",
            ChartKind::Pie => "pieChart",
            ChartKind::Line => "lineChart",
            ChartKind::Area => "areaChart",
        }
    }
}

/// Text styling hints carried per element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A rectangle in percentage units of the slide canvas.
///
/// All fields are within `[0, 100]` after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// The standard title band.
    pub fn title_band() -> Self {
        Self::new(5.0, 4.0, 90.0, 14.0)
    }

    /// The full content region below the title band.
    pub fn full_content() -> Self {
        Self::new(5.0, 20.0, 90.0, 74.0)
    }

    /// Clamp all coordinates into `[0, 100]`.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| {
            if v.is_finite() {
                v.clamp(0.0, 100.0)
            } else {
                0.0
            }
        };
        Self {
            x: clamp(self.x),
            y: clamp(self.y),
            w: clamp(self.w),
            h: clamp(self.h),
        }
    }
}

/// Where a declared asset comes from: a remote URL or a generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetSource {
    Url(String),
    Generated {
        prompt: String,
        #[serde(default)]
        style: Option<String>,
    },
}

impl AssetSource {
    /// Stable textual form used for content addressing.
    pub fn address(&self) -> String {
        match self {
            AssetSource::Url(url) => format!("url:{}", url.trim()),
            AssetSource::Generated { prompt, style } => format!(
                "prompt:{}|style:{}",
                prompt.split_whitespace().collect::<Vec<_>>().join(" "),
                style.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Asset kinds, matching the store's `slides/assets/*` sub-directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Chart,
    Icon,
}

impl AssetKind {
    /// Sub-directory name under `slides/assets/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Chart => "charts",
            AssetKind::Icon => "icons",
        }
    }
}

/// Provenance record for one stored asset. Immutable once stored;
/// garbage-collected only when no slide references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub kind: AssetKind,
    pub source: AssetSource,
    /// Object-store key of the payload bytes.
    pub stored_ref: String,
    pub size_bytes: u64,
    /// SHA-256 of the declared source (content address).
    pub content_hash: String,
    /// True when resolution failed and a placeholder was substituted.
    #[serde(default)]
    pub placeholder: bool,
    pub created_at: DateTime<Utc>,
}

/// Asset resolution status of a slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Ok,
    /// At least one asset fell back to a placeholder. Surfaced to callers,
    /// never raised.
    Degraded,
}

/// Output artifact formats.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Slide-deck binary (OOXML).
    Pptx,
    /// Paginated document.
    Pdf,
    /// Frame-sequence video.
    Mp4,
}

impl ExportFormat {
    /// Detect format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pptx" => Some(Self::Pptx),
            "pdf" => Some(Self::Pdf),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pptx => "pptx",
            Self::Pdf => "pdf",
            Self::Mp4 => "mp4",
        }
    }

    /// Export file name under the `exports/` keyspace.
    pub fn file_name(&self) -> String {
        format!("presentation.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_extension(s.trim()).ok_or_else(|| format!("unknown format: {s}"))
    }
}

/// Reference to a produced export artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub format: ExportFormat,
    /// Object-store key of the artifact bytes.
    pub key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Semantic version triple. Strictly increasing per presentation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// The version of every presentation's first snapshot.
    pub fn initial() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }

    /// The next version after this one for the given bump kind.
    pub fn bump(self, kind: BumpKind) -> Self {
        match kind {
            BumpKind::Major => Self {
                major: self.major + 1,
                minor: 0,
                patch: 0,
            },
            BumpKind::Minor => Self {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
            },
            BumpKind::Patch => Self {
                major: self.major,
                minor: self.minor,
                patch: self.patch + 1,
            },
        }
    }

    /// File stem under the `versions/` keyspace, e.g. `version_1_0_2`.
    pub fn file_stem(&self) -> String {
        format!("version_{}_{}_{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(format!("invalid version: {s}"));
        }
        let parse = |p: &str| p.parse::<u32>().map_err(|_| format!("invalid version: {s}"));
        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}

/// Which component of the version to increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BumpKind {
    Major,
    Minor,
    #[default]
    Patch,
}

/// Lightweight version entry kept on the presentation aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// A full snapshot of presentation state at a point in time.
///
/// `revert` replays `snapshot`; `change_log` is informational only and is
/// never read for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub change_log: Vec<Change>,
    pub snapshot: Presentation,
}

impl VersionRecord {
    /// The lightweight entry for this record.
    pub fn meta(&self) -> VersionMeta {
        VersionMeta {
            version: self.version,
            timestamp: self.timestamp,
            description: self.description.clone(),
        }
    }
}

/// One informational entry in a version's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_index: Option<usize>,
    pub detail: String,
}

/// Change log operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    SlideAdded,
    SlideRemoved,
    SlideEdited,
    TitleChanged,
    ThemeChanged,
    Reverted,
}

/// Request sent to the content-generation collaborator.
///
/// Field order is irrelevant for caching: cache keys are computed over the
/// canonical (sorted-field) JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl GenerateRequest {
    /// A request carrying only a prompt.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            tone: None,
            audience: None,
            format: None,
            language: None,
            max_length: None,
        }
    }
}

/// Response from the content-generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
    pub tokens_used: u64,
    pub cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_and_bump() {
        let v = Version::initial();
        assert_eq!(v.to_string(), "1.0.0");
        assert!(v.bump(BumpKind::Patch) > v);
        assert_eq!(v.bump(BumpKind::Patch).to_string(), "1.0.1");
        assert_eq!(v.bump(BumpKind::Minor).to_string(), "1.1.0");
        assert_eq!(v.bump(BumpKind::Major).to_string(), "2.0.0");
        // Minor and major bumps reset lower components.
        let v = Version {
            major: 1,
            minor: 2,
            patch: 3,
        };
        assert_eq!(v.bump(BumpKind::Minor).to_string(), "1.3.0");
        assert_eq!(v.bump(BumpKind::Major).to_string(), "2.0.0");
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(
            "2.1.3".parse::<Version>().unwrap(),
            Version {
                major: 2,
                minor: 1,
                patch: 3
            }
        );
        assert!("2.1".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
    }

    #[test]
    fn test_region_clamp() {
        let r = Region::new(-5.0, 120.0, 50.0, f64::NAN).clamped();
        assert_eq!(r.x, 0.0);
        assert_eq!(r.y, 100.0);
        assert_eq!(r.w, 50.0);
        assert_eq!(r.h, 0.0);
    }

    #[test]
    fn test_export_format_roundtrip() {
        assert_eq!(ExportFormat::from_extension("PPTX"), Some(ExportFormat::Pptx));
        assert_eq!(ExportFormat::Pdf.file_name(), "presentation.pdf");
        assert_eq!("mp4".parse::<ExportFormat>().unwrap(), ExportFormat::Mp4);
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_raw_slide_untagged_deserialization() {
        let structured: RawSlide = serde_json::from_str(
            r#"{"title":"T","elements":[{"position":{"x":0,"y":0,"w":50,"h":50},"kind":"text","text":"hi"}]}"#,
        )
        .unwrap();
        assert!(matches!(structured, RawSlide::Structured { .. }));

        let flat: RawSlide =
            serde_json::from_str(r#"{"title":"T","bullets":["a","b"]}"#).unwrap();
        assert!(matches!(flat, RawSlide::Flat { .. }));

        let lines: RawSlide = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert!(matches!(lines, RawSlide::Lines(_)));

        let plain: RawSlide = serde_json::from_str(r#""just text""#).unwrap();
        assert!(matches!(plain, RawSlide::Plain(_)));

        let other: RawSlide = serde_json::from_str(r#"{"unexpected":true}"#).unwrap();
        assert!(matches!(other, RawSlide::Other(_)));
    }

    #[test]
    fn test_element_kind_serde_tag() {
        let e = Element::text(Region::full_content(), "body");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "body");
        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ElementKind::Text);
    }

    #[test]
    fn test_asset_source_address_normalizes_whitespace() {
        let a = AssetSource::Generated {
            prompt: "a   mountain\tlake".to_string(),
            style: None,
        };
        let b = AssetSource::Generated {
            prompt: "a mountain lake".to_string(),
            style: None,
        };
        assert_eq!(a.address(), b.address());
    }
}

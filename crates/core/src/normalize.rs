//! Slide schema normalization.
//!
//! Converts any accepted slide representation (flat bullet list, bare text,
//! or nested element tree) into the one canonical [`Slide`] form that every
//! downstream stage operates on. Normalization is total: malformed input
//! degrades to an empty content element rather than erroring.

use crate::types::{Element, ElementContent, RawSlide, Region, Slide};
use regex::Regex;
use std::sync::LazyLock;

/// Bullet marker prepended to each flat bullet line.
pub const BULLET_MARKER: &str = "\u{2022} ";

/// Regex matching an explicit bullet or numbered-list marker at a line start.
static BULLET_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[\u{2022}\u{25CF}\u{25AA}\-\*\u{2013}]\s+|\d+[.)]\s+)").unwrap()
});

/// Regex to collapse runs of spaces and tabs into one space.
static WHITESPACE_COLLAPSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Slide schema normalizer.
///
/// `normalize` is idempotent: feeding a canonical slide back through it
/// (via [`RawSlide::from`]) returns an equal slide.
#[derive(Debug, Clone, Default)]
pub struct SlideNormalizer;

impl SlideNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one raw slide into canonical form. Never fails.
    pub fn normalize(&self, raw: RawSlide) -> Slide {
        match raw {
            RawSlide::Structured {
                title,
                elements,
                notes,
            } => {
                let mut slide = Slide::new(clean_title(title));
                slide.notes = non_empty(notes);
                slide.elements = elements
                    .into_iter()
                    .map(|mut e| {
                        e.position = e.position.clamped();
                        e
                    })
                    .collect();
                slide
            }
            RawSlide::Flat {
                title,
                bullets,
                notes,
            } => {
                let mut slide = Slide::new(clean_title(title));
                slide.notes = non_empty(notes);
                slide.elements = vec![bullets_element(&bullets)];
                slide
            }
            RawSlide::Lines(lines) => {
                let mut slide = Slide::new("");
                slide.elements = vec![bullets_element(&lines)];
                slide
            }
            RawSlide::Plain(text) => {
                let mut slide = Slide::new("");
                slide.elements = vec![Element::text(
                    Region::full_content(),
                    collapse_whitespace(&text),
                )];
                slide
            }
            RawSlide::Other(value) => {
                // Best effort: salvage a title if one is present, then
                // degrade to an empty content element.
                log::debug!("normalizing unrecognized slide shape");
                let title = value
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let mut slide = Slide::new(collapse_whitespace(title));
                slide.elements = vec![Element::text(Region::full_content(), "")];
                slide
            }
        }
    }

    /// Normalize a sequence of raw slides, preserving order.
    pub fn normalize_all(&self, raw: Vec<RawSlide>) -> Vec<Slide> {
        raw.into_iter().map(|r| self.normalize(r)).collect()
    }
}

/// Synthesize the single text element for flat bullet input, spanning the
/// full content region with explicit list markers.
fn bullets_element(bullets: &[String]) -> Element {
    let text = bullets
        .iter()
        .map(|b| collapse_whitespace(b))
        .filter(|b| !b.is_empty())
        .map(|b| format!("{BULLET_MARKER}{b}"))
        .collect::<Vec<_>>()
        .join("\n");
    Element::text(Region::full_content(), text)
}

fn clean_title(title: Option<String>) -> String {
    collapse_whitespace(title.as_deref().unwrap_or_default())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Collapse space/tab runs and trim, preserving line breaks.
fn collapse_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .lines()
        .map(|line| WHITESPACE_COLLAPSE_REGEX.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Flatten a canonical slide to plain text.
///
/// This is the one shared extraction point for every downstream consumer
/// (layout heuristics, speaker-note generation, image-prompt generation),
/// so word-count and bullet-density logic behaves identically regardless of
/// which input variant the slide came from.
pub fn flatten_text(slide: &Slide) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !slide.title.is_empty() {
        parts.push(slide.title.clone());
    }
    for element in &slide.elements {
        match &element.content {
            ElementContent::Text { text } => {
                if !text.trim().is_empty() {
                    parts.push(collapse_whitespace(text));
                }
            }
            ElementContent::Chart { labels, .. } => {
                if !labels.is_empty() {
                    parts.push(labels.join(", "));
                }
            }
            ElementContent::Process { steps } => {
                for step in steps {
                    parts.push(collapse_whitespace(step));
                }
            }
            ElementContent::Image { alt: Some(alt), .. } => {
                if !alt.trim().is_empty() {
                    parts.push(collapse_whitespace(alt));
                }
            }
            _ => {}
        }
    }
    parts.join("\n")
}

/// Word count of the slide's flattened text.
pub fn word_count(slide: &Slide) -> usize {
    flatten_text(slide).split_whitespace().count()
}

/// Whether the slide's flattened text contains an explicit bullet marker.
pub fn has_bullet_marker(slide: &Slide) -> bool {
    BULLET_MARKER_REGEX.is_match(&flatten_text(slide))
}

impl From<Slide> for RawSlide {
    /// Canonical slides re-enter the normalizer as the structured variant,
    /// which is what makes `normalize` idempotent.
    fn from(slide: Slide) -> Self {
        RawSlide::Structured {
            title: Some(slide.title),
            elements: slide.elements,
            notes: slide.notes,
        }
    }
}

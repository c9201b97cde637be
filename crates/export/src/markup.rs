//! Shared intermediate markup representation.
//!
//! Every export backend consumes the same resolved markup: percentage
//! positions from the canonical slides are projected onto a fixed logical
//! canvas of 1920x1080 units. Speaker notes deliberately do not appear in
//! frames; they attach to slide-deck and document artifacts as metadata and
//! are never burned into visible pixels.

use deck_core::{
    ChartKind, ElementContent, ElementKind, LayoutTemplateId, Presentation, Region, Theme,
};
use serde::{Deserialize, Serialize};

/// Logical canvas width in units.
pub const CANVAS_WIDTH: u32 = 1920;
/// Logical canvas height in units.
pub const CANVAS_HEIGHT: u32 = 1080;

/// A rectangle in logical canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PxRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PxRect {
    /// Project a percentage region onto the canvas.
    pub fn from_region(region: Region) -> Self {
        let region = region.clamped();
        let scale = |pct: f64, span: u32| ((pct / 100.0) * f64::from(span)).round() as u32;
        Self {
            x: scale(region.x, CANVAS_WIDTH),
            y: scale(region.y, CANVAS_HEIGHT),
            w: scale(region.w, CANVAS_WIDTH),
            h: scale(region.h, CANVAS_HEIGHT),
        }
    }
}

/// Resolved markup for a whole presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckMarkup {
    pub title: String,
    pub theme: Theme,
    pub frames: Vec<FrameSpec>,
}

/// One slide resolved against the canvas. This is what render backends
/// receive for page images and video frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSpec {
    /// 1-based slide number.
    pub index: usize,
    pub title: String,
    /// Where the title is drawn, from the layout template's title region.
    pub title_rect: PxRect,
    pub layout: Option<LayoutTemplateId>,
    /// Background color as `RRGGBB` hex.
    pub background: String,
    pub elements: Vec<FrameElement>,
}

/// One positioned element of a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameElement {
    pub rect: PxRect,
    pub kind: ElementKind,
    /// Renderable text for text-like kinds (text, process steps, map
    /// region, image alt, icon name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Object-store key of resolved asset bytes, when the element has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub bold: bool,
}

/// Chart series carried through to backends with the same label/value
/// pairing the slide declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

/// Resolve canonical slides plus theme into the shared markup.
pub fn build_markup(presentation: &Presentation) -> DeckMarkup {
    let frames = presentation
        .slides
        .iter()
        .enumerate()
        .map(|(idx, slide)| {
            let elements = slide
                .elements
                .iter()
                .map(|element| {
                    let (text, chart) = match &element.content {
                        ElementContent::Text { text } => (Some(text.clone()), None),
                        ElementContent::Image { alt, .. } => (alt.clone(), None),
                        ElementContent::Icon { name, .. } => (Some(name.clone()), None),
                        ElementContent::Map { region } => (Some(region.clone()), None),
                        ElementContent::Process { steps } => (Some(steps.join("\n")), None),
                        ElementContent::Chart {
                            chart,
                            labels,
                            values,
                            ..
                        } => (
                            None,
                            Some(ChartSpec {
                                kind: *chart,
                                labels: labels.clone(),
                                values: values.clone(),
                            }),
                        ),
                    };
                    FrameElement {
                        rect: PxRect::from_region(element.position),
                        kind: element.kind(),
                        text,
                        asset_key: element.asset.as_ref().map(|a| a.stored_ref.clone()),
                        chart,
                        font_size: element.style.font_size,
                        bold: element.style.bold,
                    }
                })
                .collect();
            let template =
                deck_core::layout::template(slide.layout.unwrap_or(LayoutTemplateId::Minimal));
            FrameSpec {
                index: idx + 1,
                title: slide.title.clone(),
                title_rect: PxRect::from_region(template.title),
                layout: slide.layout,
                background: presentation.theme.background.clone(),
                elements,
            }
        })
        .collect();

    DeckMarkup {
        title: presentation.title.clone(),
        theme: presentation.theme.clone(),
        frames,
    }
}

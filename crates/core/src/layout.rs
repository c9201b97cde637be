//! Layout heuristic engine.
//!
//! Deterministically picks a layout template from slide content. The rules
//! overlap, so they are evaluated in a fixed order and the first match wins.

use crate::normalize::{has_bullet_marker, word_count};
use crate::types::{ElementKind, Region, Slide};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a layout template from the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutTemplateId {
    TwoColumnText,
    CenteredHeadline,
    GridPoints,
    ImageRight,
    DataFocused,
    Infographic,
    Minimal,
}

impl LayoutTemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoColumnText => "two-column-text",
            Self::CenteredHeadline => "centered-headline",
            Self::GridPoints => "grid-points",
            Self::ImageRight => "image-right",
            Self::DataFocused => "data-focused",
            Self::Infographic => "infographic",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for LayoutTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable layout template: named regions in percentage units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTemplate {
    pub id: LayoutTemplateId,
    pub title: Region,
    pub content: Region,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

/// Look up a template from the fixed catalog.
pub fn template(id: LayoutTemplateId) -> LayoutTemplate {
    let base = LayoutTemplate {
        id,
        title: Region::title_band(),
        content: Region::full_content(),
        image: None,
        chart: None,
        background: None,
    };
    match id {
        LayoutTemplateId::TwoColumnText => LayoutTemplate {
            content: Region::new(5.0, 20.0, 43.0, 74.0),
            image: Some(Region::new(52.0, 20.0, 43.0, 74.0)),
            ..base
        },
        LayoutTemplateId::CenteredHeadline => LayoutTemplate {
            title: Region::new(10.0, 35.0, 80.0, 20.0),
            content: Region::new(15.0, 58.0, 70.0, 20.0),
            ..base
        },
        LayoutTemplateId::GridPoints => LayoutTemplate {
            content: Region::new(5.0, 22.0, 90.0, 72.0),
            ..base
        },
        LayoutTemplateId::ImageRight => LayoutTemplate {
            content: Region::new(5.0, 20.0, 52.0, 74.0),
            image: Some(Region::new(60.0, 20.0, 35.0, 60.0)),
            ..base
        },
        LayoutTemplateId::DataFocused => LayoutTemplate {
            content: Region::new(5.0, 20.0, 30.0, 74.0),
            chart: Some(Region::new(38.0, 20.0, 57.0, 70.0)),
            ..base
        },
        LayoutTemplateId::Infographic => LayoutTemplate {
            content: Region::new(5.0, 24.0, 90.0, 66.0),
            ..base
        },
        LayoutTemplateId::Minimal => base,
    }
}

/// Recommend a layout for a canonical slide.
///
/// Pure function of slide content: no randomness, no I/O. The rule order
/// matters because conditions overlap; do not reorder.
pub fn recommend(slide: &Slide) -> LayoutTemplateId {
    let words = word_count(slide);

    if words > 150 {
        return LayoutTemplateId::TwoColumnText;
    }
    if words < 20 && slide.title.chars().count() < 50 {
        return LayoutTemplateId::CenteredHeadline;
    }
    if has_bullet_marker(slide) || slide.elements.len() > 5 {
        return LayoutTemplateId::GridPoints;
    }
    if slide.has_kind(ElementKind::Image) && words > 200 {
        return LayoutTemplateId::ImageRight;
    }
    if slide.has_kind(ElementKind::Chart) || slide.has_kind(ElementKind::Map) {
        return LayoutTemplateId::DataFocused;
    }
    if slide.has_kind(ElementKind::Process) {
        return LayoutTemplateId::Infographic;
    }
    LayoutTemplateId::Minimal
}

/// Attach a recommendation to the slide's layout field.
///
/// Skips slides the user customized (`user_overridden`) and slides that
/// already carry a layout, unless `overwrite` is explicitly requested.
/// Returns the applied template id, or `None` when the slide was skipped.
pub fn apply_layout(slide: &mut Slide, overwrite: bool) -> Option<LayoutTemplateId> {
    if slide.user_overridden && !overwrite {
        return None;
    }
    if slide.layout.is_some() && !overwrite {
        return None;
    }
    let id = recommend(slide);
    slide.layout = Some(id);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetSource, ChartKind, Element, ElementContent};

    fn text_slide(title: &str, words: usize) -> Slide {
        let mut slide = Slide::new(title);
        let body = vec!["word"; words].join(" ");
        slide.elements.push(Element::text(Region::full_content(), body));
        slide
    }

    #[test]
    fn test_long_text_wins_first() {
        let slide = text_slide("A very long discussion", 200);
        assert_eq!(recommend(&slide), LayoutTemplateId::TwoColumnText);
    }

    #[test]
    fn test_short_text_short_title_centered() {
        let slide = text_slide("Welcome", 5);
        assert_eq!(recommend(&slide), LayoutTemplateId::CenteredHeadline);
    }

    #[test]
    fn test_short_text_long_title_not_centered() {
        let title = "A".repeat(60);
        let slide = text_slide(&title, 5);
        assert_ne!(recommend(&slide), LayoutTemplateId::CenteredHeadline);
    }

    #[test]
    fn test_bullet_marker_grid_points() {
        let mut slide = Slide::new("Agenda items for the quarterly planning session");
        slide.elements.push(Element::text(
            Region::full_content(),
            "\u{2022} one two three four five\n\u{2022} six seven eight nine ten\n\u{2022} eleven twelve thirteen fourteen fifteen sixteen",
        ));
        assert_eq!(recommend(&slide), LayoutTemplateId::GridPoints);
    }

    #[test]
    fn test_many_elements_grid_points() {
        let mut slide = Slide::new("A title that is comfortably over fifty characters long");
        for i in 0..6 {
            slide.elements.push(Element::text(
                Region::full_content(),
                format!("item number {i} with several words attached"),
            ));
        }
        assert_eq!(recommend(&slide), LayoutTemplateId::GridPoints);
    }

    #[test]
    fn test_chart_data_focused() {
        let mut slide = Slide::new("Quarterly revenue figures broken down by product line");
        slide.elements.push(Element::new(
            Region::full_content(),
            ElementContent::Chart {
                chart: ChartKind::Line,
                labels: (0..25).map(|i| format!("point{i}")).collect(),
                values: vec![0.0; 25],
                source: None,
            },
        ));
        assert_eq!(recommend(&slide), LayoutTemplateId::DataFocused);
    }

    #[test]
    fn test_map_data_focused() {
        let mut slide = Slide::new("Regional rollout of the new product offering plan");
        slide.elements.push(Element::new(
            Region::full_content(),
            ElementContent::Map {
                region: "emea".to_string(),
            },
        ));
        // Pad past the short-text rule without triggering bullets.
        slide.elements.push(Element::text(
            Region::full_content(),
            vec!["word"; 25].join(" "),
        ));
        assert_eq!(recommend(&slide), LayoutTemplateId::DataFocused);
    }

    #[test]
    fn test_process_infographic() {
        let mut slide = Slide::new("Deployment steps for the release train this quarter");
        slide.elements.push(Element::new(
            Region::full_content(),
            ElementContent::Process {
                steps: (0..8)
                    .map(|i| format!("step {i} does something useful here"))
                    .collect(),
            },
        ));
        assert_eq!(recommend(&slide), LayoutTemplateId::Infographic);
    }

    #[test]
    fn test_fallback_minimal() {
        let mut slide = Slide::new("A title that is comfortably over fifty characters long");
        slide.elements.push(Element::text(
            Region::full_content(),
            vec!["word"; 30].join(" "),
        ));
        assert_eq!(recommend(&slide), LayoutTemplateId::Minimal);
    }

    #[test]
    fn test_recommend_is_pure() {
        let slide = text_slide("Welcome", 5);
        assert_eq!(recommend(&slide), recommend(&slide));
    }

    #[test]
    fn test_spec_scenario_long_bullet_slide() {
        // A slide with 200 words of bullet text and no image picks the
        // two-column layout; short bullet slides elsewhere stay compact.
        let long = text_slide("Deep dive", 200);
        assert_eq!(recommend(&long), LayoutTemplateId::TwoColumnText);

        let mut short = Slide::new("Summary of the work we got done in this sprint cycle");
        short.elements.push(Element::text(
            Region::full_content(),
            "\u{2022} shipped the exporter\n\u{2022} fixed the cache\n\u{2022} cleaned up the store layout and tightened the tests",
        ));
        let got = recommend(&short);
        assert!(
            got == LayoutTemplateId::GridPoints || got == LayoutTemplateId::Minimal,
            "unexpected layout {got}"
        );
    }

    #[test]
    fn test_apply_layout_respects_user_override() {
        let mut slide = text_slide("Welcome", 5);
        slide.user_overridden = true;
        slide.layout = Some(LayoutTemplateId::Minimal);

        assert_eq!(apply_layout(&mut slide, false), None);
        assert_eq!(slide.layout, Some(LayoutTemplateId::Minimal));

        // Overwrite must be explicit.
        assert_eq!(
            apply_layout(&mut slide, true),
            Some(LayoutTemplateId::CenteredHeadline)
        );
    }

    #[test]
    fn test_apply_layout_skips_already_laid_out() {
        let mut slide = text_slide("Welcome", 5);
        slide.layout = Some(LayoutTemplateId::GridPoints);
        assert_eq!(apply_layout(&mut slide, false), None);
        assert_eq!(slide.layout, Some(LayoutTemplateId::GridPoints));
    }

    #[test]
    fn test_image_with_generated_source_counts_as_image() {
        let mut slide = Slide::new("Photo walkthrough of the venue and the surrounding area");
        slide.elements.push(Element::new(
            Region::full_content(),
            ElementContent::Image {
                source: AssetSource::Generated {
                    prompt: "venue".to_string(),
                    style: None,
                },
                alt: None,
            },
        ));
        slide.elements.push(Element::text(
            Region::full_content(),
            vec!["word"; 30].join(" "),
        ));
        // Not enough words for image-right, not a chart: falls through.
        assert_eq!(recommend(&slide), LayoutTemplateId::Minimal);
    }

    #[test]
    fn test_templates_have_distinct_content_regions() {
        let two_col = template(LayoutTemplateId::TwoColumnText);
        assert!(two_col.content.w < 50.0);
        assert!(two_col.image.is_some());

        let data = template(LayoutTemplateId::DataFocused);
        assert!(data.chart.is_some());

        let minimal = template(LayoutTemplateId::Minimal);
        assert_eq!(minimal.content, Region::full_content());
    }
}

//! PPTX (Office Open XML) slide-deck backend.
//!
//! Writes .pptx files: ZIP archives of XML parts. Each canonical element
//! maps to a native primitive: text boxes, pictures (from resolved asset
//! bytes), and chart parts carrying the same label/value series the slide
//! declared. Speaker notes become notes-slide parts, never visible shapes.
//!
//! A small reader lives here too so exported decks can be verified
//! (slide order, text, notes) without external tooling.

use crate::markup::{build_markup, ChartSpec, FrameElement, FrameSpec};
use deck_core::{ChartKind, ElementKind, Error, Presentation, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// Resolved asset payloads keyed by object-store key (`stored_ref`).
pub type AssetBag = BTreeMap<String, Vec<u8>>;

/// EMU per logical canvas unit (12192000 EMU / 1920 units, 16:9).
const EMU_PER_UNIT: i64 = 6350;
const SLIDE_CX: i64 = 12_192_000;
const SLIDE_CY: i64 = 6_858_000;

fn emu(units: u32) -> i64 {
    i64::from(units) * EMU_PER_UNIT
}

/// Writer for the slide-deck binary format.
#[derive(Debug, Clone, Default)]
pub struct PptxWriter;

impl PptxWriter {
    pub fn new() -> Self {
        Self
    }

    /// Serialize the presentation into .pptx bytes.
    pub fn write(&self, presentation: &Presentation, assets: &AssetBag) -> Result<Vec<u8>> {
        let markup = build_markup(presentation);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions = FileOptions::default();

        let mut media: Vec<(String, Vec<u8>)> = Vec::new(); // (name, bytes)
        let mut media_index: BTreeMap<String, usize> = BTreeMap::new();
        let mut charts: Vec<String> = Vec::new();
        let mut notes_slides: Vec<usize> = Vec::new();

        // Slide parts first; they decide which media/chart parts exist.
        let mut slide_parts: Vec<(String, String)> = Vec::new(); // (xml, rels)
        for (idx, frame) in markup.frames.iter().enumerate() {
            let notes = presentation.slides[idx].notes.as_deref();
            let (slide_xml, rels_xml) = build_slide(
                frame,
                notes.is_some(),
                assets,
                &mut media,
                &mut media_index,
                &mut charts,
            );
            if notes.is_some() {
                notes_slides.push(frame.index);
            }
            slide_parts.push((slide_xml, rels_xml));
        }

        write_part(&mut zip, "[Content_Types].xml", options, &content_types(
            markup.frames.len(),
            &notes_slides,
            charts.len(),
        ))?;
        write_part(&mut zip, "_rels/.rels", options, ROOT_RELS)?;
        write_part(
            &mut zip,
            "ppt/presentation.xml",
            options,
            &presentation_xml(markup.frames.len()),
        )?;
        write_part(
            &mut zip,
            "ppt/_rels/presentation.xml.rels",
            options,
            &presentation_rels(markup.frames.len()),
        )?;

        for (idx, (slide_xml, rels_xml)) in slide_parts.iter().enumerate() {
            let n = idx + 1;
            write_part(&mut zip, &format!("ppt/slides/slide{n}.xml"), options, slide_xml)?;
            write_part(
                &mut zip,
                &format!("ppt/slides/_rels/slide{n}.xml.rels"),
                options,
                rels_xml,
            )?;
            if let Some(notes) = presentation.slides[idx].notes.as_deref() {
                write_part(
                    &mut zip,
                    &format!("ppt/notesSlides/notesSlide{n}.xml"),
                    options,
                    &notes_slide_xml(notes),
                )?;
            }
        }

        for (name, bytes) in &media {
            zip.start_file(format!("ppt/media/{name}"), options)
                .map_err(|e| Error::Zip(e.to_string()))?;
            zip.write_all(bytes)?;
        }
        for (idx, chart_xml) in charts.iter().enumerate() {
            write_part(
                &mut zip,
                &format!("ppt/charts/chart{}.xml", idx + 1),
                options,
                chart_xml,
            )?;
        }

        let cursor = zip.finish().map_err(|e| Error::Zip(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

fn write_part<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    options: FileOptions,
    content: &str,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| Error::Zip(e.to_string()))?;
    zip.write_all(content.as_bytes())?;
    Ok(())
}

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#;

fn content_types(slide_count: usize, notes_slides: &[usize], chart_count: usize) -> String {
    let mut overrides = String::new();
    overrides.push_str(
        r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#,
    );
    for n in 1..=slide_count {
        overrides.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        ));
    }
    for n in notes_slides {
        overrides.push_str(&format!(
            r#"<Override PartName="/ppt/notesSlides/notesSlide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml"/>"#
        ));
    }
    for n in 1..=chart_count {
        overrides.push_str(&format!(
            r#"<Override PartName="/ppt/charts/chart{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.drawingml.chart+xml"/>"#
        ));
    }
    format!(
        r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/>{overrides}</Types>"#
    )
}

fn presentation_xml(slide_count: usize) -> String {
    let mut slide_ids = String::new();
    for n in 1..=slide_count {
        slide_ids.push_str(&format!(
            r#"<p:sldId id="{}" r:id="rId{n}"/>"#,
            255 + n
        ));
    }
    format!(
        r#"{XML_DECL}
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="{SLIDE_CX}" cy="{SLIDE_CY}"/></p:presentation>"#
    )
}

fn presentation_rels(slide_count: usize) -> String {
    let mut rels = String::new();
    for n in 1..=slide_count {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{n}.xml"/>"#
        ));
    }
    format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

/// Build one slide part and its relationships.
fn build_slide(
    frame: &FrameSpec,
    has_notes: bool,
    assets: &AssetBag,
    media: &mut Vec<(String, Vec<u8>)>,
    media_index: &mut BTreeMap<String, usize>,
    charts: &mut Vec<String>,
) -> (String, String) {
    let mut shapes = String::new();
    let mut rels = String::new();
    let mut rel_id = 0usize;
    let mut shape_id = 1usize;

    let mut next_shape_id = |name: &str| {
        shape_id += 1;
        format!(r#"<p:cNvPr id="{shape_id}" name="{}"/>"#, escape(name))
    };

    if !frame.title.is_empty() {
        shapes.push_str(&text_shape(
            &next_shape_id("Title"),
            frame.title_rect.x,
            frame.title_rect.y,
            frame.title_rect.w,
            frame.title_rect.h,
            &frame.title,
            Some(3200),
            true,
        ));
    }

    for element in &frame.elements {
        match element.kind {
            ElementKind::Image | ElementKind::Icon => {
                let key = element.asset_key.as_deref();
                let bytes = key.and_then(|k| assets.get(k));
                if let (Some(key), Some(bytes)) = (key, bytes) {
                    let index = *media_index.entry(key.to_string()).or_insert_with(|| {
                        media.push((format!("image{}.png", media.len() + 1), bytes.clone()));
                        media.len()
                    });
                    rel_id += 1;
                    rels.push_str(&format!(
                        r#"<Relationship Id="rId{rel_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image{index}.png"/>"#
                    ));
                    shapes.push_str(&picture_shape(
                        &next_shape_id("Picture"),
                        element,
                        rel_id,
                    ));
                } else if let Some(text) = element.text.as_deref() {
                    // No payload available: fall back to the element's
                    // textual stand-in so the slide stays renderable.
                    shapes.push_str(&text_shape(
                        &next_shape_id("MissingAsset"),
                        element.rect.x,
                        element.rect.y,
                        element.rect.w,
                        element.rect.h,
                        text,
                        font_hundredths(element),
                        element.bold,
                    ));
                }
            }
            ElementKind::Chart => {
                if let Some(chart) = &element.chart {
                    charts.push(chart_xml(chart));
                    let chart_number = charts.len();
                    rel_id += 1;
                    rels.push_str(&format!(
                        r#"<Relationship Id="rId{rel_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart" Target="../charts/chart{chart_number}.xml"/>"#
                    ));
                    shapes.push_str(&chart_frame(&next_shape_id("Chart"), element, rel_id));
                }
            }
            ElementKind::Text | ElementKind::Map | ElementKind::Process => {
                if let Some(text) = element.text.as_deref() {
                    shapes.push_str(&text_shape(
                        &next_shape_id("Content"),
                        element.rect.x,
                        element.rect.y,
                        element.rect.w,
                        element.rect.h,
                        text,
                        font_hundredths(element),
                        element.bold,
                    ));
                }
            }
        }
    }

    if has_notes {
        rel_id += 1;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{rel_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide" Target="../notesSlides/notesSlide{}.xml"/>"#,
            frame.index
        ));
    }

    let slide_xml = format!(
        r#"{XML_DECL}
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:cSld><p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#,
        frame.background
    );
    let rels_xml = format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    );
    (slide_xml, rels_xml)
}

fn font_hundredths(element: &FrameElement) -> Option<i64> {
    element.font_size.map(|pt| (pt * 100.0).round() as i64)
}

fn xfrm(x: u32, y: u32, w: u32, h: u32) -> String {
    format!(
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        emu(x),
        emu(y),
        emu(w),
        emu(h)
    )
}

#[allow(clippy::too_many_arguments)]
fn text_shape(
    cnvpr: &str,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    text: &str,
    size_hundredths: Option<i64>,
    bold: bool,
) -> String {
    let mut paragraphs = String::new();
    for line in text.split('\n') {
        let mut rpr = String::from(r#"<a:rPr lang="en-US""#);
        if let Some(sz) = size_hundredths {
            rpr.push_str(&format!(r#" sz="{sz}""#));
        }
        if bold {
            rpr.push_str(r#" b="1""#);
        }
        rpr.push_str("/>");
        paragraphs.push_str(&format!(
            r#"<a:p><a:r>{rpr}<a:t>{}</a:t></a:r></a:p>"#,
            escape(line)
        ));
    }
    format!(
        r#"<p:sp><p:nvSpPr>{cnvpr}<p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr wrap="square"/><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#,
        xfrm(x, y, w, h)
    )
}

fn picture_shape(cnvpr: &str, element: &FrameElement, rel_id: usize) -> String {
    format!(
        r#"<p:pic><p:nvPicPr>{cnvpr}<p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
        xfrm(element.rect.x, element.rect.y, element.rect.w, element.rect.h)
    )
}

fn chart_frame(cnvpr: &str, element: &FrameElement, rel_id: usize) -> String {
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr>{cnvpr}<p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></p:xfrm><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:id="rId{rel_id}"/></a:graphicData></a:graphic></p:graphicFrame>"#,
        emu(element.rect.x),
        emu(element.rect.y),
        emu(element.rect.w),
        emu(element.rect.h)
    )
}

/// Build one chart part carrying the declared label/value series.
fn chart_xml(chart: &ChartSpec) -> String {
    let count = chart.labels.len().min(chart.values.len());
    let mut cats = String::new();
    let mut vals = String::new();
    for i in 0..count {
        cats.push_str(&format!(
            r#"<c:pt idx="{i}"><c:v>{}</c:v></c:pt>"#,
            escape(&chart.labels[i])
        ));
        vals.push_str(&format!(
            r#"<c:pt idx="{i}"><c:v>{}</c:v></c:pt>"#,
            chart.values[i]
        ));
    }
    let series = format!(
        r#"<c:ser><c:idx val="0"/><c:order val="0"/><c:cat><c:strRef><c:f>Sheet1!$A$1</c:f><c:strCache><c:ptCount val="{count}"/>{cats}</c:strCache></c:strRef></c:cat><c:val><c:numRef><c:f>Sheet1!$B$1</c:f><c:numCache><c:ptCount val="{count}"/>{vals}</c:numCache></c:numRef></c:val></c:ser>"#
    );
    let plot = match chart.kind {
        ChartKind::Bar => format!(r#"<c:barChart><c:barDir val="col"/>{series}</c:barChart>"#),
        ChartKind::Pie => format!(r#"<c:pieChart>{series}</c:pieChart>"#),
        ChartKind::Line => format!(r#"<c:lineChart>{series}</c:lineChart>"#),
        ChartKind::Area => format!(r#"<c:areaChart>{series}</c:areaChart>"#),
    };
    format!(
        r#"{XML_DECL}
<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><c:chart><c:plotArea><c:layout/>{plot}</c:plotArea></c:chart></c:chartSpace>"#
    )
}

fn notes_slide_xml(notes: &str) -> String {
    let mut paragraphs = String::new();
    for line in notes.split('\n') {
        paragraphs.push_str(&format!(
            r#"<a:p><a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r></a:p>"#,
            escape(line)
        ));
    }
    format!(
        r#"{XML_DECL}
<p:notes xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="2" name="Notes"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody></p:sp></p:spTree></p:cSld></p:notes>"#
    )
}

/// One slide as read back from an exported archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSlide {
    /// Text content per shape, paragraphs joined with `\n`.
    pub texts: Vec<String>,
    pub notes: Option<String>,
}

/// Read slide order, text, and notes back out of a .pptx archive.
pub fn read_pptx(bytes: &[u8]) -> Result<Vec<ReadSlide>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Zip(e.to_string()))?;

    let rels = read_archive_file(&mut archive, "ppt/_rels/presentation.xml.rels")?;
    let slide_paths = ordered_slide_paths(&rels)?;

    let mut slides = Vec::with_capacity(slide_paths.len());
    for (idx, path) in slide_paths.iter().enumerate() {
        let xml = read_archive_file(&mut archive, path)?;
        let texts = extract_shape_texts(&xml)?;

        let n = idx + 1;
        let rels_path = format!("ppt/slides/_rels/slide{n}.xml.rels");
        let notes = match read_archive_file(&mut archive, &rels_path) {
            Ok(rels_xml) => match notes_target(&rels_xml)? {
                Some(target) => {
                    let notes_xml = read_archive_file(&mut archive, &target)?;
                    let parts = extract_shape_texts(&notes_xml)?;
                    Some(parts.join("\n")).filter(|s| !s.is_empty())
                }
                None => None,
            },
            Err(_) => None,
        };
        slides.push(ReadSlide { texts, notes });
    }
    Ok(slides)
}

fn read_archive_file<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::Zip(format!("missing part '{path}': {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// Slide part paths in presentation order, taken from the relationship ids.
fn ordered_slide_paths(rels_xml: &str) -> Result<Vec<String>> {
    let mut slides: Vec<(usize, String)> = Vec::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut id = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                        _ => {}
                    }
                }
                if rel_type.ends_with("/slide") {
                    let order = trailing_number(&id).unwrap_or(usize::MAX);
                    slides.push((order, format!("ppt/{target}")));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e.to_string())),
            _ => {}
        }
    }
    slides.sort_by_key(|(order, _)| *order);
    Ok(slides.into_iter().map(|(_, path)| path).collect())
}

fn notes_target(rels_xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut rel_type = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                        _ => {}
                    }
                }
                if rel_type.ends_with("/notesSlide") {
                    return Ok(Some(target.replace("../", "ppt/")));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(Error::Xml(e.to_string())),
            _ => {}
        }
    }
}

/// Extract per-shape text from a slide or notes part.
fn extract_shape_texts(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut current = String::new();
    let mut in_shape = false;
    let mut in_text = false;
    let mut paragraph_open = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => {
                    in_shape = true;
                    current.clear();
                }
                b"p" if in_shape => {
                    if paragraph_open || !current.is_empty() {
                        current.push('\n');
                    }
                    paragraph_open = true;
                }
                b"t" if in_shape => in_text = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_text {
                    current.push_str(&e.unescape().map_err(|err| Error::Xml(err.to_string()))?);
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => {
                    if !current.is_empty() {
                        texts.push(current.clone());
                    }
                    in_shape = false;
                    paragraph_open = false;
                    current.clear();
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(texts)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Trailing digits of a string like `rId12`.
fn trailing_number(s: &str) -> Option<usize> {
    let digits: String = s
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    digits.parse().ok()
}

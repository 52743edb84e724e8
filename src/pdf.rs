use printpdf::*;
use std::{fs::File, io::BufWriter, path::Path};
use thiserror::Error;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const TOP: f32 = 275.0;
const BOTTOM: f32 = 20.0;
const BODY_SIZE: f32 = 11.0;
const HEADING_SIZE: f32 = 13.0;
const LINE_HEIGHT: f32 = 5.5;
/// Rough capacity of one body line at 11pt across the text width.
const WRAP_COLUMNS: usize = 92;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("font error: {0}")]
    Font(String),
    #[error("pdf error: {0}")]
    Render(String),
}

#[derive(Debug, PartialEq)]
enum Line {
    Heading(String),
    Body(String),
    Blank,
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F; the rest of its range is Latin-1.
const WIN_ANSI_EXTRAS: &str = "€‚ƒ„…†‡ˆ‰Š‹ŒŽ‘’“”•–—˜™š›œžŸ";

/// Lays out a lesson plan as an A4 PDF, wrapping long lines and breaking pages.
///
/// Builtin Helvetica is WinAnsi-encoded, so without `font_path` any text outside that
/// encoding (Cyrillic, for one) is refused rather than silently dropped.
pub fn generate_pdf(title: &str, text: &str, font_path: Option<&Path>) -> Result<Vec<u8>, ExportError> {
    if font_path.is_none() {
        if let Some(c) = title.chars().chain(text.chars()).find(|c| !builtin_font_can_encode(*c)) {
            return Err(ExportError::Font(format!(
                "the builtin font cannot encode '{c}'; set PDF_FONT_PATH to a TTF font that covers this text"
            )));
        }
    }

    let (doc, first_page, first_layer) = PdfDocument::new(truncate(title, 64), Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = match font_path {
        Some(path) => {
            let file = File::open(path).map_err(|e| ExportError::Font(format!("{}: {}", path.display(), e)))?;
            doc.add_external_font(file).map_err(|e| ExportError::Font(e.to_string()))?
        }
        None => doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| ExportError::Font(e.to_string()))?,
    };

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    layer.use_text(truncate(title, 80), 18.0, Mm(MARGIN), Mm(TOP), &font);
    let mut y = TOP - 12.0;
    let mut page_no = 1;

    for line in layout(text) {
        if y < BOTTOM {
            page_no += 1;
            let (page, layer_idx) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {page_no}"));
            layer = doc.get_page(page).get_layer(layer_idx);
            y = TOP;
        }
        match line {
            Line::Heading(t) => {
                layer.use_text(t, HEADING_SIZE, Mm(MARGIN), Mm(y), &font);
                y -= LINE_HEIGHT + 1.5;
            }
            Line::Body(t) => {
                layer.use_text(t, BODY_SIZE, Mm(MARGIN), Mm(y), &font);
                y -= LINE_HEIGHT;
            }
            Line::Blank => y -= LINE_HEIGHT / 2.0,
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| ExportError::Render(e.to_string()))?;
    }
    Ok(buf)
}

fn builtin_font_can_encode(c: char) -> bool {
    c.is_whitespace() || matches!(u32::from(c), 0x20..=0x7E | 0xA0..=0xFF) || WIN_ANSI_EXTRAS.contains(c)
}

fn layout(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let trimmed = raw.trim_end();
        if trimmed.trim().is_empty() {
            lines.push(Line::Blank);
        } else if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            lines.extend(wrap(heading, WRAP_COLUMNS).into_iter().map(Line::Heading));
        } else {
            lines.extend(wrap(trimmed, WRAP_COLUMNS).into_iter().map(Line::Body));
        }
    }
    lines
}

/// Greedy word wrap counted in chars; words longer than a line are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut len = 0;
    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if len > 0 {
                out.push(std::mem::take(&mut current));
                len = 0;
            }
            out.push(chars.drain(..width).collect());
        }
        if chars.is_empty() {
            continue;
        }
        if len > 0 && len + 1 + chars.len() > width {
            out.push(std::mem::take(&mut current));
            len = 0;
        }
        if len > 0 {
            current.push(' ');
            len += 1;
        }
        len += chars.len();
        current.extend(chars);
    }
    if len > 0 {
        out.push(current);
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}

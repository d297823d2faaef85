//! PDF rendering of report documents.
//!
//! Layout is computed separately from drawing: [`layout`] assigns every
//! line a page and a baseline, and [`render`] draws that layout with the
//! document's embedded TrueType font, or the built-in Helvetica faces when
//! it has none.

use std::path::Path;
use std::sync::Arc;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};

use crate::{ReportDocument, ReportError};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 10.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const LINE_HEIGHT_MM: f32 = 10.0;

/// Title font size in points.
pub const TITLE_SIZE_PT: f32 = 14.0;

/// Row font size in points.
pub const ROW_SIZE_PT: f32 = 11.0;

/// A positioned line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    /// Text to draw.
    pub text: String,
    /// Font size in points.
    pub size_pt: f32,
    /// Whether the bold face is used.
    pub bold: bool,
    /// Baseline height from the bottom of the page.
    pub y_mm: f32,
}

/// Lays the document out on A4 pages, starting a new page when the
/// current one is full.
#[must_use]
pub fn layout(document: &ReportDocument) -> Vec<Vec<PlacedLine>> {
    let top = PAGE_HEIGHT_MM - MARGIN_MM - LINE_HEIGHT_MM;

    let mut pages = vec![vec![PlacedLine {
        text: document.title.clone(),
        size_pt: TITLE_SIZE_PT,
        bold: true,
        y_mm: top,
    }]];
    let mut y = top - LINE_HEIGHT_MM;

    for row in &document.rows {
        if y < BOTTOM_MARGIN_MM {
            pages.push(Vec::new());
            y = top;
        }
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine {
                text: row.line(),
                size_pt: ROW_SIZE_PT,
                bold: false,
                y_mm: y,
            });
        }
        y -= LINE_HEIGHT_MM;
    }

    pages
}

fn pdf_error(e: impl std::fmt::Display) -> ReportError {
    ReportError::Pdf {
        message: e.to_string(),
    }
}

/// Whether the built-in faces can draw `text`. They use `WinAnsi`
/// encoding, so anything past Latin-1 (Gujarati ward names, say) comes out
/// garbled.
fn builtin_can_draw(text: &str) -> bool {
    text.chars().all(|c| c <= '\u{ff}')
}

/// Reads a TrueType font for embedding in reports.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the file cannot be read, or
/// [`ReportError::Pdf`] if it is not a font that can be embedded.
pub fn load_font(path: &Path) -> Result<Arc<[u8]>, ReportError> {
    let bytes = std::fs::read(path)?;
    PdfDocument::empty("font check")
        .add_external_font(bytes.as_slice())
        .map_err(|e| ReportError::Pdf {
            message: format!("{} is not an embeddable font: {e}", path.display()),
        })?;

    log::info!("Using report font {} ({} bytes)", path.display(), bytes.len());
    Ok(Arc::from(bytes))
}

/// Bold and regular faces for the document.
fn fonts(
    doc: &PdfDocumentReference,
    document: &ReportDocument,
) -> Result<(IndirectFontRef, IndirectFontRef), ReportError> {
    if let Some(font) = &document.font {
        let face = doc.add_external_font(&font[..]).map_err(pdf_error)?;
        return Ok((face.clone(), face));
    }

    let unsupported = std::iter::once(document.title.as_str())
        .chain(document.rows.iter().map(|row| row.ward_name.as_str()))
        .filter(|text| !builtin_can_draw(text))
        .count();
    if unsupported > 0 {
        log::warn!(
            "'{}' has {unsupported} line(s) outside Latin-1; set REPORT_FONT to a TrueType font to render them",
            document.title
        );
    }

    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;
    Ok((bold, regular))
}

/// Renders the document to PDF bytes.
///
/// # Errors
///
/// Returns [`ReportError::Pdf`] if the fonts cannot be embedded or the
/// document cannot be serialized.
pub fn render(document: &ReportDocument) -> Result<Vec<u8>, ReportError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        document.title.as_str(),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Page 1",
    );
    let (bold, regular) = fonts(&doc, document)?;

    for (i, lines) in layout(document).into_iter().enumerate() {
        let (page, layer) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", i + 1),
            )
        };
        let layer = doc.get_page(page).get_layer(layer);

        for line in lines {
            let font = if line.bold { &bold } else { &regular };
            layer.use_text(line.text, line.size_pt, Mm(MARGIN_MM), Mm(line.y_mm), font);
        }
    }

    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    log::debug!(
        "Rendered '{}' ({} rows, {} bytes)",
        document.title,
        document.rows.len(),
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportRow;

    fn rows(count: usize) -> Vec<ReportRow> {
        (1..=count)
            .map(|rank| ReportRow {
                rank,
                ward_name: format!("Ward {rank}"),
                score: 0.5,
            })
            .collect()
    }

    #[test]
    fn ten_rows_fit_on_one_page() {
        let pages = layout(&ReportDocument::new("Top 10 Heat Risk Wards", rows(10)));

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].len(), 11);
        assert!(pages[0][0].bold);
        assert!((pages[0][0].size_pt - TITLE_SIZE_PT).abs() < f32::EPSILON);
        assert_eq!(pages[0][1].text, "1. Ward 1 | Priority: 0.50");
        assert!(pages[0].windows(2).all(|w| w[1].y_mm < w[0].y_mm));
    }

    #[test]
    fn long_reports_continue_on_new_pages() {
        let pages = layout(&ReportDocument::new("Everything", rows(60)));

        assert!(pages.len() > 1);
        let drawn: usize = pages.iter().map(Vec::len).sum();
        assert_eq!(drawn, 61);
        assert!(
            pages
                .iter()
                .flatten()
                .all(|line| line.y_mm >= BOTTOM_MARGIN_MM && line.y_mm < PAGE_HEIGHT_MM)
        );
        assert_eq!(pages[1][0].text, format!("{}. Ward {} | Priority: 0.50", pages[0].len(), pages[0].len()));
    }

    #[test]
    fn renders_pdf_bytes() {
        let bytes = render(&ReportDocument::new(
            "Top 10 Heat Risk Wards - Ahmedabad",
            rows(3),
        ))
        .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn latin1_names_fit_the_builtin_faces() {
        assert!(builtin_can_draw("1. Naranpura | Priority: 0.91"));
        assert!(builtin_can_draw("Sabarmatí"));
        assert!(!builtin_can_draw("1. મણિનગર | Priority: 0.91"));
        assert!(!builtin_can_draw("Ωmega Nagar"));
    }

    #[test]
    fn unparsable_embedded_font_is_a_pdf_error() {
        let font: Arc<[u8]> = Arc::from(&b"definitely not a font"[..]);
        let document = ReportDocument::new("Top 10 Heat Risk Wards", rows(3)).with_font(Some(font));

        assert!(matches!(render(&document), Err(ReportError::Pdf { .. })));
    }

    #[test]
    fn load_font_rejects_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = load_font(&dir.path().join("missing.ttf")).unwrap_err();
        assert!(matches!(missing, ReportError::Io(_)));

        let bogus = dir.path().join("bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let err = load_font(&bogus).unwrap_err();
        let ReportError::Pdf { message } = err else {
            panic!("expected a PDF error, got {err:?}");
        };
        assert!(message.contains("bogus.ttf"), "{message}");
    }

    #[test]
    fn renders_empty_reports() {
        let bytes = render(&ReportDocument::new("Top 10 Heat Risk Wards", Vec::new())).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}

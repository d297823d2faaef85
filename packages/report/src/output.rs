//! Writing rendered reports to the report directory.

use std::path::{Path, PathBuf};

use crate::{ReportDocument, ReportError, ReportRow, pdf};

/// A fresh report file name, `top10_wards_<6 hex chars>.pdf`.
#[must_use]
pub fn report_file_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("top10_wards_{}.pdf", &id[..6])
}

/// Renders `rows` under `title` and writes the PDF into `dir`, creating
/// the directory if needed. Returns the path of the written file.
///
/// # Errors
///
/// Returns [`ReportError`] if rendering or writing fails.
pub fn write_report(dir: &Path, rows: Vec<ReportRow>, title: &str) -> Result<PathBuf, ReportError> {
    write_document(dir, &ReportDocument::new(title, rows))
}

/// Renders `document` and writes the PDF into `dir`, creating the
/// directory if needed. Returns the path of the written file.
///
/// # Errors
///
/// Returns [`ReportError`] if rendering or writing fails.
pub fn write_document(dir: &Path, document: &ReportDocument) -> Result<PathBuf, ReportError> {
    let bytes = pdf::render(document)?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name());
    std::fs::write(&path, bytes)?;

    log::info!("Wrote report {}", path.display());
    Ok(path)
}

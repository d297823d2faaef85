#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ranked heat priority reports.
//!
//! Scored wards are ranked with [`rank::top_n`], laid out and rendered to a
//! PDF with [`pdf::render`], and written to the report directory with
//! [`output::write_report`].

pub mod output;
pub mod pdf;
pub mod rank;

use std::sync::Arc;

pub use output::{write_document, write_report};
pub use pdf::load_font;
pub use rank::{ReportRow, top_n};

/// Number of wards listed in a report.
pub const REPORT_SIZE: usize = 10;

/// Errors that can occur while producing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The PDF could not be rendered.
    #[error("PDF rendering error: {message}")]
    Pdf {
        /// Description of the failure.
        message: String,
    },

    /// The report could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A titled list of ranked rows, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    /// Page heading.
    pub title: String,
    /// Ranked rows in display order.
    pub rows: Vec<ReportRow>,
    /// TrueType font embedded for all text. The built-in Helvetica faces
    /// are used when unset; they only cover Latin-1.
    pub font: Option<Arc<[u8]>>,
}

impl ReportDocument {
    /// Creates a document.
    #[must_use]
    pub fn new(title: impl Into<String>, rows: Vec<ReportRow>) -> Self {
        Self {
            title: title.into(),
            rows,
            font: None,
        }
    }

    /// Embeds `font` (TrueType bytes) instead of the built-in faces.
    #[must_use]
    pub fn with_font(mut self, font: Option<Arc<[u8]>>) -> Self {
        self.font = font;
        self
    }
}

/// The report heading, naming the city when one is configured.
#[must_use]
pub fn report_title(city: Option<&str>) -> String {
    match city.map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => format!("Top {REPORT_SIZE} Heat Risk Wards - {city}"),
        None => format!("Top {REPORT_SIZE} Heat Risk Wards"),
    }
}

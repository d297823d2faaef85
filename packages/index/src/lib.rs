#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite heat-index evaluation.
//!
//! A [`CompositeScheme`](heat_priority_index_models::CompositeScheme) is
//! evaluated against a [`RasterEngine`]: the [`evaluator`] resolves every
//! layer and (when the scheme asks for it) the region-wide maximum, then
//! the [`scorer`] reduces the composite surface to per-ward statistics.
//!
//! The production engine talks to Earth Engine (`heat_priority_earthengine`).
//! [`fixture::FixtureEngine`] evaluates the same pipeline over in-memory
//! grids.

pub mod engine;
pub mod evaluator;
pub mod fixture;
pub mod raster;
pub mod registry;
pub mod scorer;

pub use engine::{CompositeExpression, RasterEngine};
pub use evaluator::evaluate;
pub use scorer::score_wards;

use heat_priority_index_models::InvalidSchemeError;
use thiserror::Error;

/// Errors that can occur while evaluating a composite index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The scheme failed validation.
    #[error(transparent)]
    InvalidScheme(#[from] InvalidSchemeError),

    /// No scheme with the requested id is registered.
    #[error("Unknown composite scheme '{id}'")]
    UnknownScheme {
        /// The requested scheme id.
        id: String,
    },

    /// A layer's data source is missing, empty after filtering, or lacks a
    /// required band.
    #[error("Layer '{layer}' is unavailable: {message}")]
    UpstreamUnavailable {
        /// Id of the failing layer.
        layer: String,
        /// What the engine reported.
        message: String,
    },

    /// A region statistic came back empty or unusable.
    #[error("Empty statistic: {statistic}")]
    EmptyStatistic {
        /// Which statistic was empty.
        statistic: String,
    },

    /// The spatial reduction failed.
    #[error("Reduction failed: {message}")]
    Reduction {
        /// Description of the failure.
        message: String,
    },

    /// A scheme file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A scheme file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

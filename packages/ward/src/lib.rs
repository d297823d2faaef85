#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ward boundary loading.
//!
//! Wards reach the service two ways: as a `GeoJSON` `FeatureCollection` in
//! a request body ([`collection`]), or from a zipped ESRI shapefile bundled
//! with the deployment and loaded once at startup ([`archive`]). Shapefile
//! coordinates are reprojected to WGS84 longitude/latitude using the
//! archive's `.prj` definition ([`projection`]).
//!
//! Every produced ward carries a non-empty display name; see
//! [`heat_priority_ward_models::resolve_ward_name`].

pub mod archive;
pub mod collection;
pub mod projection;

pub use collection::{from_feature_collection, from_geojson, to_feature_collection};

use thiserror::Error;

/// Errors that can occur while loading wards.
#[derive(Debug, Error)]
pub enum WardError {
    /// The ward payload is empty or contains unusable geometry.
    #[error("Malformed input: {message}")]
    MalformedInput {
        /// Description of what is wrong with the input.
        message: String,
    },

    /// The coordinate reference system is unsupported or malformed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of the problem.
        message: String,
    },

    /// The archive does not have the expected layout.
    #[error("Archive error: {message}")]
    Archive {
        /// Description of the problem.
        message: String,
    },

    /// Reading the archive failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container could not be read.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The shapefile contents could not be decoded.
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// JSON payload could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WardError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }
}

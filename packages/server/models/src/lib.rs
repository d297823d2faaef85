#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the heat priority server.
//!
//! Field names follow the wire format the map frontend already speaks:
//! snake case for ward payloads, camel case for server metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /ward-priority` and `POST /top10-pdf`.
///
/// An empty body, or one without `geojson`, scores the bundled wards.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WardRequest {
    /// A `GeoJSON` `FeatureCollection` of ward polygons.
    #[serde(default)]
    pub geojson: Option<Value>,
}

/// Body of `POST /explain-ward`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExplainRequest {
    /// Ward display name.
    #[serde(default)]
    pub ward_name: Option<String>,
    /// Heat priority score.
    #[serde(default)]
    pub p75: Option<f64>,
}

/// Response of `POST /explain-ward`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainResponse {
    /// Ward display name.
    pub ward_name: String,
    /// The explanation.
    pub analysis: String,
    /// `"generated"` or `"fallback"`.
    pub source: String,
}

/// Response of `POST /top10-pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// File name of the report, served under `/reports/`.
    pub file: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Always `true` when the server responds.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Identifier of the active composite scheme.
    pub scheme: String,
    /// Number of bundled reference wards, if loaded.
    pub reference_wards: Option<usize>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

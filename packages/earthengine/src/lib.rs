#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Earth Engine REST raster engine.
//!
//! Composite schemes are compiled into Earth Engine expression graphs
//! ([`compile`], [`expression`]) and evaluated with the `value:compute` and
//! `table:computeFeatures` endpoints of the v1 REST API through an
//! authenticated [`session::EarthEngineSession`]. [`EarthEngine`] adapts
//! the session to the [`heat_priority_index::RasterEngine`] trait.

pub mod auth;
pub mod compile;
pub mod engine;
pub mod expression;
pub mod session;

pub use auth::{Credentials, ServiceAccountKey};
pub use engine::EarthEngine;
pub use session::{EarthEngineConfig, EarthEngineSession};

use thiserror::Error;

/// Errors that can occur while talking to Earth Engine.
#[derive(Debug, Error)]
pub enum EarthEngineError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication was rejected.
    #[error("Authentication failed: {message}")]
    Auth {
        /// Description of the failure.
        message: String,
    },

    /// The API returned an error response.
    #[error("Earth Engine API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Missing or invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The service-account assertion could not be signed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

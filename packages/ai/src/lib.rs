#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! LLM-written explanations of ward heat-risk scores.
//!
//! Supports DeepSeek and any other `OpenAI`-compatible chat completions
//! server (via `AI_BASE_URL`), `OpenAI` itself, and Anthropic Claude. When
//! no provider is configured, or a call fails, [`narrative::explain_ward`]
//! returns a fixed fallback text instead of an error.

pub mod narrative;
pub mod providers;

pub use narrative::{Narrative, explain_ward};
pub use providers::{ChatRequest, LlmProvider, create_provider_from_env};

use thiserror::Error;

/// Errors raised while talking to an LLM provider.
///
/// [`explain_ward`] never returns these; they surface from provider
/// construction and from [`LlmProvider::chat`].
#[derive(Debug, Error)]
pub enum AiError {
    /// The provider could not be reached or timed out.
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider response was not the expected JSON.
    #[error("Unexpected LLM response: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider answered with an error or an unusable completion.
    #[error("LLM provider error: {message}")]
    Provider {
        /// Message reported by the provider.
        message: String,
    },

    /// Provider settings are missing or inconsistent.
    #[error("AI configuration error: {message}")]
    Config {
        /// What is misconfigured.
        message: String,
    },
}

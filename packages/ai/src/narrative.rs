//! Ward heat-risk explanations.

use serde::Serialize;

use crate::providers::{ChatRequest, LlmProvider};

const SYSTEM_PROMPT: &str = "You are an expert climate analyst.";

const TEMPERATURE: f64 = 0.4;

/// Generous cap for a 120-word answer.
const MAX_TOKENS: u32 = 400;

/// An explanation of a ward's score, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Narrative {
    /// Written by the LLM provider.
    Generated {
        /// The explanation.
        text: String,
    },
    /// The fixed fallback text.
    Fallback {
        /// The explanation.
        text: String,
        /// Why no generated text is available.
        reason: String,
    },
}

impl Narrative {
    /// The explanation text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Generated { text } | Self::Fallback { text, .. } => text,
        }
    }

    /// `"generated"` or `"fallback"`.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::Generated { .. } => "generated",
            Self::Fallback { .. } => "fallback",
        }
    }
}

/// The user prompt for `ward_name` at `score`.
#[must_use]
pub fn user_prompt(ward_name: &str, score: f64) -> String {
    format!(
        "You are an urban climate risk expert for Indian cities.\n\
         \n\
         Ward: {ward_name}\n\
         Heat priority score (0-1): {score:.2}\n\
         \n\
         Explain clearly:\n\
         1. What this score indicates\n\
         2. Why this ward is vulnerable\n\
         3. Three realistic mitigation actions for Indian cities\n\
         \n\
         Limit to 120 words."
    )
}

/// The text used when no generated explanation is available.
#[must_use]
pub fn fallback_text(ward_name: &str) -> String {
    format!(
        "{ward_name} shows elevated heat vulnerability due to high surface temperatures, \
         dense urban development, and limited vegetation. Mitigation should focus on \
         increasing tree cover, cool roofs, and shaded public infrastructure."
    )
}

fn fallback(ward_name: &str, reason: impl Into<String>) -> Narrative {
    let reason = reason.into();
    log::warn!("Using fallback explanation for '{ward_name}': {reason}");
    Narrative::Fallback {
        text: fallback_text(ward_name),
        reason,
    }
}

/// Asks `provider` to explain a ward's score in one attempt.
///
/// Never fails: a missing provider, a provider error or an empty answer
/// all yield [`Narrative::Fallback`].
pub async fn explain_ward(
    provider: Option<&dyn LlmProvider>,
    ward_name: &str,
    score: f64,
) -> Narrative {
    let Some(provider) = provider else {
        return fallback(ward_name, "no LLM provider configured");
    };

    let request = ChatRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: user_prompt(ward_name, score),
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    };

    log::debug!("Requesting explanation for '{ward_name}' from {}", provider.name());

    match provider.chat(&request).await {
        Ok(text) if !text.trim().is_empty() => Narrative::Generated {
            text: text.trim().to_string(),
        },
        Ok(_) => fallback(ward_name, "provider returned an empty response"),
        Err(e) => fallback(ward_name, e.to_string()),
    }
}

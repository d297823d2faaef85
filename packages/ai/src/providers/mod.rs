//! LLM provider abstraction and implementations.
//!
//! Supports `OpenAI`-compatible chat completions (DeepSeek, `OpenAI`,
//! self-hosted servers) and Anthropic Claude via a common trait.

pub mod anthropic;
pub mod openai;

use std::time::Duration;

use crate::AiError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A single-turn chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System prompt.
    pub system: String,
    /// The user message.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

/// Trait for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Sends a chat request and returns the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`AiError`] if the request fails or the provider returns an
    /// error response.
    async fn chat(&self, request: &ChatRequest) -> Result<String, AiError>;
}

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// DeepSeek's `OpenAI`-compatible API.
    DeepSeek,
    /// `OpenAI`.
    OpenAi,
    /// Anthropic Claude.
    Anthropic,
}

impl ProviderKind {
    fn parse(name: &str) -> Result<Self, AiError> {
        match name.to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "openai" | "gpt" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(AiError::Config {
                message: format!(
                    "Unknown AI provider: {other}. Use 'deepseek', 'openai', or 'anthropic'."
                ),
            }),
        }
    }

    const fn key_var(self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    const fn default_model(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    const fn default_base_url(self) -> &'static str {
        match self {
            Self::DeepSeek => openai::DEEPSEEK_BASE_URL,
            Self::OpenAi => openai::OPENAI_BASE_URL,
            Self::Anthropic => anthropic::ANTHROPIC_BASE_URL,
        }
    }
}

/// Resolved provider settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider family.
    pub kind: ProviderKind,
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ProviderConfig {
    /// Resolves settings from a variable lookup.
    ///
    /// If `AI_PROVIDER` is set, that provider is used and its key is
    /// required. Otherwise the first of `DEEPSEEK_API_KEY`,
    /// `OPENAI_API_KEY` and `ANTHROPIC_API_KEY` that is set picks the
    /// provider. `AI_MODEL`, `AI_BASE_URL` and `AI_TIMEOUT_SECS` override
    /// the defaults.
    ///
    /// Returns `Ok(None)` when no provider is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if `AI_PROVIDER` names an unknown
    /// provider or one whose key is not set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, AiError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kind = if let Some(name) = var("AI_PROVIDER") {
            ProviderKind::parse(&name)?
        } else if let Some(kind) = [
            ProviderKind::DeepSeek,
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
        ]
        .into_iter()
        .find(|kind| var(kind.key_var()).is_some())
        {
            log::info!("Auto-detected AI provider: {kind:?} ({} found)", kind.key_var());
            kind
        } else {
            return Ok(None);
        };

        let api_key = var(kind.key_var()).ok_or_else(|| AiError::Config {
            message: format!("{} environment variable not set", kind.key_var()),
        })?;

        let timeout_secs = var("AI_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Some(Self {
            kind,
            api_key,
            model: var("AI_MODEL").unwrap_or_else(|| kind.default_model().to_string()),
            base_url: var("AI_BASE_URL")
                .unwrap_or_else(|| kind.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }))
    }
}

/// Builds the provider described by `config`.
///
/// # Errors
///
/// Returns [`AiError::Http`] if the HTTP client cannot be built.
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn LlmProvider>, AiError> {
    let client = reqwest::Client::builder().timeout(config.timeout).build()?;

    let provider: Box<dyn LlmProvider> = match config.kind {
        ProviderKind::DeepSeek | ProviderKind::OpenAi => Box::new(openai::OpenAiProvider::new(
            client,
            config.api_key,
            config.model,
            config.base_url,
        )),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(
            client,
            config.api_key,
            config.model,
            config.base_url,
        )),
    };

    Ok(provider)
}

/// Creates an LLM provider based on environment variables.
///
/// See [`ProviderConfig::from_lookup`] for the variables read. Returns
/// `Ok(None)` when no credentials are configured, in which case every
/// narrative is the fallback text.
///
/// # Errors
///
/// Returns [`AiError::Config`] if the configuration is inconsistent.
pub fn create_provider_from_env() -> Result<Option<Box<dyn LlmProvider>>, AiError> {
    let Some(config) = ProviderConfig::from_lookup(|name| std::env::var(name).ok())? else {
        log::warn!(
            "No AI credentials detected. Set one of: DEEPSEEK_API_KEY, OPENAI_API_KEY, \
             or ANTHROPIC_API_KEY. Ward explanations will use the fallback text."
        );
        return Ok(None);
    };

    log::info!(
        "Using AI provider {:?} with model {} at {}",
        config.kind,
        config.model,
        config.base_url
    );
    create_provider(config).map(Some)
}

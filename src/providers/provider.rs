//! Provider trait for the relay's model backends.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// One completed model call. `session_id` is only set by providers that
/// support session continuity; the HTTP providers are stateless.
#[derive(Clone, Debug)]
pub struct Completion {
    pub text: String,
    pub session_id: Option<String>,
}

impl Completion {
    pub fn stateless(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
        }
    }
}

/// Model backend trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Check if the provider is available (CLI installed or API configured).
    async fn is_available(&self) -> bool;

    /// Complete a prompt. `resume` carries a prior session id for providers
    /// that support continuity; others ignore it.
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        resume: Option<&str>,
    ) -> Result<Completion>;

    /// Get the default model.
    fn default_model(&self) -> Option<&str>;
}

impl ProviderError {
    pub fn other(s: impl Into<String>) -> Self {
        ProviderError::Other(s.into())
    }
}

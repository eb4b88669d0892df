//! Model providers: the primary Claude CLI plus the two fallback HTTP
//! backends, and the router that chains them.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub mod claude;
pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod router;

pub use provider::{Completion, Provider, ProviderError};
pub use router::ProviderRouter;

use crate::config::Settings;

/// The configurable provider set. `Claude` is the primary; the other two
/// are the fixed fallback chain.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Claude,
    Openrouter,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Openrouter => "openrouter",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(ProviderKind::Claude),
            "openrouter" => Ok(ProviderKind::Openrouter),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Which backend served a routed call. `Error` is a sentinel used only
/// when the whole chain is exhausted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServedBy {
    Claude,
    Openrouter,
    Ollama,
    Error,
}

impl ServedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedBy::Claude => "claude",
            ServedBy::Openrouter => "openrouter",
            ServedBy::Ollama => "ollama",
            ServedBy::Error => "error",
        }
    }
}

impl std::fmt::Display for ServedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one routed call through the fallback chain.
#[derive(Clone, Debug)]
pub struct ProviderResult {
    pub text: String,
    pub provider: ServedBy,
    pub duration_ms: u64,
}

/// Build a provider instance for a configured kind.
pub fn create_provider(kind: ProviderKind, settings: &Settings) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Claude => {
            if let Some(path) = &settings.models.claude.cli_path {
                Arc::new(claude::ClaudeProvider::with_cli_path(path.clone()))
            } else {
                Arc::new(claude::ClaudeProvider::new())
            }
        }
        ProviderKind::Openrouter => {
            if let Some(key) = &settings.models.openrouter.api_key {
                Arc::new(openrouter::OpenRouterProvider::with_api_key(key.clone()))
            } else {
                Arc::new(openrouter::OpenRouterProvider::new())
            }
        }
        ProviderKind::Ollama => {
            if let Some(url) = &settings.models.ollama.base_url {
                Arc::new(ollama::OllamaProvider::with_base_url(url.clone()))
            } else {
                Arc::new(ollama::OllamaProvider::new())
            }
        }
    }
}

//! Provider routing and the fallback chain.
//!
//! Order per call: the agent's preferred provider first when it is not the
//! primary, then the primary Claude CLI (with session continuity), then
//! OpenRouter with a fixed fallback model, then Ollama. A provider that
//! already failed earlier in the call is not retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::provider::{Completion, Provider, ProviderError};
use super::{create_provider, ProviderKind, ProviderResult, ServedBy};
use crate::agents::AgentSlug;
use crate::config::Settings;
use crate::models::ModelConfigStore;
use crate::session::SessionStore;
use crate::store::Store;
use crate::usage::TokenUsageTracker;

/// Model used when falling back to the gateway after a primary failure.
const FALLBACK_GATEWAY_MODEL: &str = "anthropic/claude-sonnet-4";

/// User-facing message when the primary fails and fallback is disabled.
const NO_FALLBACK_MESSAGE: &str =
    "Error: Claude is temporarily unavailable. No fallback providers configured.";

/// Hard cap per provider attempt. A stuck subprocess or unresponsive
/// endpoint must not hang the relay; the Claude command is spawned with
/// kill_on_drop so the timeout takes it down.
fn call_timeout(tag: ServedBy) -> Duration {
    match tag {
        ServedBy::Claude => Duration::from_secs(120),
        ServedBy::Openrouter => Duration::from_secs(60),
        ServedBy::Ollama => Duration::from_secs(120),
        ServedBy::Error => Duration::from_secs(0),
    }
}

pub struct ProviderRouter {
    claude: Arc<dyn Provider>,
    openrouter: Arc<dyn Provider>,
    ollama: Arc<dyn Provider>,
    models: Arc<ModelConfigStore>,
    sessions: Arc<SessionStore>,
    usage: TokenUsageTracker,
    fallback_enabled: bool,
}

impl ProviderRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        claude: Arc<dyn Provider>,
        openrouter: Arc<dyn Provider>,
        ollama: Arc<dyn Provider>,
        models: Arc<ModelConfigStore>,
        sessions: Arc<SessionStore>,
        usage: TokenUsageTracker,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            claude,
            openrouter,
            ollama,
            models,
            sessions,
            usage,
            fallback_enabled,
        }
    }

    /// Build a router from settings and shared state.
    pub fn from_settings(
        settings: &Settings,
        store: Option<Arc<Store>>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self::new(
            create_provider(ProviderKind::Claude, settings),
            create_provider(ProviderKind::Openrouter, settings),
            create_provider(ProviderKind::Ollama, settings),
            Arc::new(ModelConfigStore::new(store.clone())),
            sessions,
            TokenUsageTracker::new(store),
            settings.models.fallback_enabled(),
        )
    }

    /// Route one prompt for an agent through the chain. Never errors: chain
    /// exhaustion comes back as an `error`-tagged result with a plain
    /// message.
    pub async fn call(&self, agent: AgentSlug, prompt: &str, resume: bool) -> ProviderResult {
        let config = self.models.get(agent.as_str());
        let started = Instant::now();
        let mut attempted: Vec<ServedBy> = Vec::new();

        // Agent-preferred provider first, when it is not the primary.
        if let Some(cfg) = &config {
            let preferred = match cfg.provider {
                ProviderKind::Openrouter => Some(ServedBy::Openrouter),
                ProviderKind::Ollama => Some(ServedBy::Ollama),
                ProviderKind::Claude => None,
            };
            if let Some(tag) = preferred {
                if let Some(result) = self
                    .attempt(tag, agent, prompt, Some(&cfg.model), &mut attempted)
                    .await
                {
                    return result;
                }
            }
        }

        // Primary Claude CLI, with session continuity.
        let claude_model = config
            .as_ref()
            .filter(|c| c.provider == ProviderKind::Claude)
            .map(|c| c.model.clone());
        let resume_id = if resume { self.sessions.get(agent) } else { None };

        match self
            .timed_complete(
                ServedBy::Claude,
                prompt,
                claude_model.as_deref(),
                resume_id.as_deref(),
            )
            .await
        {
            Ok((completion, duration_ms)) => {
                // Stateless calls (board fan-out) leave the agent's ongoing
                // conversation session untouched.
                if resume {
                    if let Some(session_id) = &completion.session_id {
                        if let Err(e) = self.sessions.set(agent, session_id) {
                            tracing::warn!("Failed to persist session for {}: {}", agent, e);
                        }
                    }
                }
                self.record_usage(agent, ServedBy::Claude, claude_model.as_deref(), prompt, &completion.text);
                return ProviderResult {
                    text: completion.text,
                    provider: ServedBy::Claude,
                    duration_ms,
                };
            }
            Err(_) => attempted.push(ServedBy::Claude),
        }

        if !self.fallback_enabled {
            return ProviderResult {
                text: NO_FALLBACK_MESSAGE.to_string(),
                provider: ServedBy::Error,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        // Fixed fallback order: gateway, then local. A provider already
        // tried as the agent preference is not retried.
        if !attempted.contains(&ServedBy::Openrouter) {
            if let Some(result) = self
                .attempt(
                    ServedBy::Openrouter,
                    agent,
                    prompt,
                    Some(FALLBACK_GATEWAY_MODEL),
                    &mut attempted,
                )
                .await
            {
                return result;
            }
        }

        if !attempted.contains(&ServedBy::Ollama) {
            if let Some(result) = self
                .attempt(ServedBy::Ollama, agent, prompt, None, &mut attempted)
                .await
            {
                return result;
            }
        }

        let names: Vec<&str> = attempted.iter().map(|t| t.as_str()).collect();
        ProviderResult {
            text: format!(
                "Error: all providers failed (attempted: {})",
                names.join(", ")
            ),
            provider: ServedBy::Error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// One non-primary attempt: returns the final result on success,
    /// records the failure otherwise.
    async fn attempt(
        &self,
        tag: ServedBy,
        agent: AgentSlug,
        prompt: &str,
        model: Option<&str>,
        attempted: &mut Vec<ServedBy>,
    ) -> Option<ProviderResult> {
        match self.timed_complete(tag, prompt, model, None).await {
            Ok((completion, duration_ms)) => {
                self.record_usage(agent, tag, model, prompt, &completion.text);
                Some(ProviderResult {
                    text: completion.text,
                    provider: tag,
                    duration_ms,
                })
            }
            Err(_) => {
                attempted.push(tag);
                None
            }
        }
    }

    fn provider_for(&self, tag: ServedBy) -> &Arc<dyn Provider> {
        match tag {
            ServedBy::Openrouter => &self.openrouter,
            ServedBy::Ollama => &self.ollama,
            _ => &self.claude,
        }
    }

    async fn timed_complete(
        &self,
        tag: ServedBy,
        prompt: &str,
        model: Option<&str>,
        resume: Option<&str>,
    ) -> Result<(Completion, u64), ProviderError> {
        let provider = self.provider_for(tag);
        let started = Instant::now();
        tracing::debug!("Attempting provider {}", tag);

        let result = tokio::time::timeout(
            call_timeout(tag),
            provider.complete(prompt, model, resume),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(completion)) => {
                tracing::info!("Provider {} succeeded in {}ms", tag, duration_ms);
                Ok((completion, duration_ms))
            }
            Ok(Err(e)) => {
                tracing::warn!("Provider {} failed after {}ms: {}", tag, duration_ms, e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!("Provider {} timed out after {}ms", tag, duration_ms);
                Err(ProviderError::Timeout)
            }
        }
    }

    fn record_usage(
        &self,
        agent: AgentSlug,
        tag: ServedBy,
        model: Option<&str>,
        prompt: &str,
        response: &str,
    ) {
        let model = model
            .or_else(|| self.provider_for(tag).default_model())
            .unwrap_or("default");
        self.usage
            .record(agent.as_str(), tag.as_str(), model, prompt, response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelConfig;
    use crate::store::test_store;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted provider that records every attempt in a shared log.
    struct MockProvider {
        name: &'static str,
        succeed: bool,
        session_id: Option<String>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn complete(
            &self,
            _prompt: &str,
            _model: Option<&str>,
            _resume: Option<&str>,
        ) -> super::super::provider::Result<Completion> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.succeed {
                Ok(Completion {
                    text: format!("answer from {}", self.name),
                    session_id: self.session_id.clone(),
                })
            } else {
                Err(ProviderError::ApiError("scripted failure".to_string()))
            }
        }

        fn default_model(&self) -> Option<&str> {
            Some("test-model")
        }
    }

    struct Harness {
        router: ProviderRouter,
        sessions: Arc<SessionStore>,
        log: Arc<Mutex<Vec<String>>>,
        _dir: TempDir,
    }

    fn harness(
        claude_ok: bool,
        openrouter_ok: bool,
        ollama_ok: bool,
        fallback_enabled: bool,
        preference: Option<ProviderKind>,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = test_store(dir.path());
        let sessions = Arc::new(SessionStore::new(dir.path()));

        let models = Arc::new(ModelConfigStore::new(Some(store.clone())));
        if let Some(provider) = preference {
            models
                .set(&ModelConfig {
                    agent: "general".to_string(),
                    provider,
                    model: "preferred-model".to_string(),
                    enabled: true,
                })
                .unwrap();
        }

        let mock = |name: &'static str, succeed: bool, session_id: Option<String>| {
            Arc::new(MockProvider {
                name,
                succeed,
                session_id,
                log: log.clone(),
            })
        };

        let router = ProviderRouter::new(
            mock(
                "claude",
                claude_ok,
                Some("6fa3c2de-1b4a-4e8f-9c3d-2a5b6c7d8e9f".to_string()),
            ),
            mock("openrouter", openrouter_ok, None),
            mock("ollama", ollama_ok, None),
            models,
            sessions.clone(),
            TokenUsageTracker::new(Some(store)),
            fallback_enabled,
        );

        Harness {
            router,
            sessions,
            log,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn fallback_follows_the_fixed_order() {
        let h = harness(false, false, true, true, None);
        let result = h.router.call(AgentSlug::General, "hi", false).await;

        assert_eq!(result.provider, ServedBy::Ollama);
        assert_eq!(result.text, "answer from ollama");
        assert_eq!(
            *h.log.lock().unwrap(),
            vec!["claude", "openrouter", "ollama"]
        );
    }

    #[tokio::test]
    async fn first_success_wins_and_stops_the_chain() {
        let h = harness(false, true, true, true, None);
        let result = h.router.call(AgentSlug::General, "hi", false).await;

        assert_eq!(result.provider, ServedBy::Openrouter);
        assert_eq!(*h.log.lock().unwrap(), vec!["claude", "openrouter"]);
    }

    #[tokio::test]
    async fn agent_preference_is_tried_before_primary() {
        let h = harness(true, false, false, true, Some(ProviderKind::Ollama));
        let result = h.router.call(AgentSlug::General, "hi", false).await;

        assert_eq!(result.provider, ServedBy::Claude);
        // Preferred ollama first, then the primary; ollama is not retried.
        assert_eq!(*h.log.lock().unwrap(), vec!["ollama", "claude"]);
    }

    #[tokio::test]
    async fn disabled_fallback_returns_fixed_message() {
        let h = harness(false, true, true, false, None);
        let result = h.router.call(AgentSlug::General, "hi", false).await;

        assert_eq!(result.provider, ServedBy::Error);
        assert_eq!(
            result.text,
            "Error: Claude is temporarily unavailable. No fallback providers configured."
        );
        assert_eq!(*h.log.lock().unwrap(), vec!["claude"]);
    }

    #[tokio::test]
    async fn exhausted_chain_enumerates_attempts() {
        let h = harness(false, false, false, true, None);
        let result = h.router.call(AgentSlug::General, "hi", false).await;

        assert_eq!(result.provider, ServedBy::Error);
        assert!(result.text.contains("claude, openrouter, ollama"));
    }

    #[tokio::test]
    async fn stateless_call_does_not_touch_the_session() {
        let h = harness(true, false, false, true, None);
        h.sessions.set(AgentSlug::General, "ongoing-chat").unwrap();

        let result = h.router.call(AgentSlug::General, "hi", false).await;
        assert_eq!(result.provider, ServedBy::Claude);
        assert_eq!(
            h.sessions.get(AgentSlug::General).as_deref(),
            Some("ongoing-chat")
        );
    }

    #[tokio::test]
    async fn primary_success_persists_the_session_id() {
        let h = harness(true, false, false, true, None);
        assert!(h.sessions.get(AgentSlug::General).is_none());

        let result = h.router.call(AgentSlug::General, "hi", true).await;
        assert_eq!(result.provider, ServedBy::Claude);
        assert_eq!(
            h.sessions.get(AgentSlug::General).as_deref(),
            Some("6fa3c2de-1b4a-4e8f-9c3d-2a5b6c7d8e9f")
        );
    }
}

//! The relay pipeline: one inbound message through routing, memory
//! intents, and action extraction, producing a reply for the transport.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::{describe, ActionQueue};
use crate::agents::{AgentRegistry, AgentSlug};
use crate::directives::intents::MemoryIntentProcessor;
use crate::directives::parser::extract_actions;
use crate::providers::{ProviderResult, ProviderRouter, ServedBy};
use crate::session::SessionStore;
use crate::store::Store;

/// Seam between the relay and the provider layer.
#[async_trait]
pub trait RelayCaller: Send + Sync {
    async fn call(&self, agent: AgentSlug, prompt: &str, resume: bool) -> ProviderResult;
}

#[async_trait]
impl RelayCaller for ProviderRouter {
    async fn call(&self, agent: AgentSlug, prompt: &str, resume: bool) -> ProviderResult {
        ProviderRouter::call(self, agent, prompt, resume).await
    }
}

/// An action queued from this reply, ready for the approval UI.
#[derive(Clone, Debug)]
pub struct QueuedAction {
    pub id: String,
    pub description: String,
}

/// What goes back to the transport: cleaned text plus any actions
/// awaiting approval.
#[derive(Clone, Debug)]
pub struct RelayReply {
    pub text: String,
    pub provider: ServedBy,
    pub duration_ms: u64,
    pub queued_actions: Vec<QueuedAction>,
}

pub struct Relay {
    caller: Arc<dyn RelayCaller>,
    registry: AgentRegistry,
    sessions: Arc<SessionStore>,
    intents: MemoryIntentProcessor,
    queue: ActionQueue,
}

impl Relay {
    pub fn new(
        caller: Arc<dyn RelayCaller>,
        registry: AgentRegistry,
        sessions: Arc<SessionStore>,
        store: Option<Arc<Store>>,
    ) -> Self {
        Self {
            caller,
            registry,
            sessions,
            intents: MemoryIntentProcessor::new(store.clone()),
            queue: ActionQueue::new(store),
        }
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Handle one inbound message for an agent.
    ///
    /// Directive extraction runs on the full, final response only; an
    /// error result from the chain passes through untouched so tags never
    /// get scraped out of an error message.
    pub async fn handle_message(&self, agent: AgentSlug, text: &str) -> RelayReply {
        let prompt = self.build_prompt(agent, text);
        let result = self.caller.call(agent, &prompt, true).await;

        if result.provider == ServedBy::Error {
            return RelayReply {
                text: result.text,
                provider: ServedBy::Error,
                duration_ms: result.duration_ms,
                queued_actions: Vec::new(),
            };
        }

        let after_memory = self.intents.process_intents(&result.text);
        let parsed = extract_actions(&after_memory);

        let mut queued_actions = Vec::new();
        for directive in &parsed.actions {
            if let Some(id) = self.queue.queue_action(directive) {
                queued_actions.push(QueuedAction {
                    id,
                    description: describe(directive),
                });
            }
        }

        tracing::info!(
            "Relayed message for {} via {} in {}ms ({} action(s) queued)",
            agent,
            result.provider,
            result.duration_ms,
            queued_actions.len()
        );

        RelayReply {
            text: parsed.cleaned_text,
            provider: result.provider,
            duration_ms: result.duration_ms,
            queued_actions,
        }
    }

    /// A fresh session gets the persona prompt prefixed; a resumed one
    /// already carries it in the provider-side history.
    fn build_prompt(&self, agent: AgentSlug, text: &str) -> String {
        if self.sessions.get(agent).is_some() {
            text.to_string()
        } else {
            let profile = self.registry.get(agent);
            format!("{}\n\n{}", profile.system_prompt, text)
        }
    }
}

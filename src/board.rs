//! Board meetings: fan one question out to every specialist persona in
//! parallel, then synthesize their answers through the orchestrator.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::agents::{AgentRegistry, AgentSlug};
use crate::providers::{ProviderResult, ProviderRouter, ServedBy};

/// Placeholder filling a specialist's slot when its call fails.
const UNAVAILABLE_PLACEHOLDER: &str = "[agent was unable to respond]";

/// Returned when the synthesis call itself fails. The meeting still
/// carries every individual response.
const SYNTHESIS_FALLBACK: &str =
    "The board was unable to produce a synthesis. Please review the individual responses.";

/// Seam between the board and the provider layer, so meetings can be
/// tested against scripted callers.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(&self, agent: AgentSlug, prompt: &str) -> ProviderResult;
}

#[async_trait]
impl ModelCaller for ProviderRouter {
    async fn call(&self, agent: AgentSlug, prompt: &str) -> ProviderResult {
        // Board prompts are self-contained; no session resume.
        ProviderRouter::call(self, agent, prompt, false).await
    }
}

#[derive(Clone, Debug)]
pub struct AgentResponse {
    pub agent: String,
    pub response: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BoardMeetingResult {
    pub question: String,
    pub responses: Vec<AgentResponse>,
    pub synthesis: String,
    pub total_duration_ms: u64,
}

fn specialist_prompt(system_prompt: &str, profile_context: Option<&str>, question: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");
    if let Some(context) = profile_context {
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "You are answering as one member of an advisory board. \
         Give your perspective in under 300 words.\n\nQuestion: ",
    );
    prompt.push_str(question);
    prompt
}

fn synthesis_prompt(system_prompt: &str, question: &str, responses: &[AgentResponse]) -> String {
    let mut prompt = String::new();
    prompt.push_str(system_prompt);
    prompt.push_str("\n\nThe board was asked: ");
    prompt.push_str(question);
    prompt.push_str("\n\nEach member responded:\n");
    for r in responses {
        prompt.push_str("\n--- ");
        prompt.push_str(&r.agent);
        prompt.push_str(" ---\n");
        prompt.push_str(&r.response);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nIdentify where the board agrees, where it disagrees, and give one \
         clear recommendation. Keep it under 250 words.",
    );
    prompt
}

/// Run one board meeting: parallel specialist fan-out, then a strictly
/// ordered synthesis call. Never errors; a failed branch is replaced with
/// a placeholder and the meeting proceeds.
pub async fn run_board_meeting(
    caller: Arc<dyn ModelCaller>,
    registry: &AgentRegistry,
    question: &str,
    profile_context: Option<&str>,
) -> BoardMeetingResult {
    let started = Instant::now();
    let specialists = registry.specialists();

    let mut set = JoinSet::new();
    for (index, profile) in specialists.iter().enumerate() {
        let caller = caller.clone();
        let slug = profile.slug;
        let name = profile.name.clone();
        let prompt = specialist_prompt(&profile.system_prompt, profile_context, question);

        set.spawn(async move {
            let call_started = Instant::now();
            let result = caller.call(slug, &prompt).await;
            let duration_ms = call_started.elapsed().as_millis() as u64;

            let response = if result.provider == ServedBy::Error {
                AgentResponse {
                    agent: name,
                    response: UNAVAILABLE_PLACEHOLDER.to_string(),
                    duration_ms,
                    error: Some(result.text),
                }
            } else {
                AgentResponse {
                    agent: name,
                    response: result.text,
                    duration_ms,
                    error: None,
                }
            };
            (index, response)
        });
    }

    // Collect every branch; a panicked task fills its slot with the
    // placeholder like any other failure.
    let mut slots: Vec<Option<AgentResponse>> = vec![None; specialists.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, response)) => slots[index] = Some(response),
            Err(e) => tracing::error!("Board specialist task panicked: {}", e),
        }
    }

    let responses: Vec<AgentResponse> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| AgentResponse {
                agent: specialists[index].name.clone(),
                response: UNAVAILABLE_PLACEHOLDER.to_string(),
                duration_ms: 0,
                error: Some("task panicked".to_string()),
            })
        })
        .collect();

    let failed = responses.iter().filter(|r| r.error.is_some()).count();
    tracing::info!(
        "Board fan-out complete: {} responses, {} failed",
        responses.len(),
        failed
    );

    let chief = registry.get(AgentSlug::Chief);
    let prompt = synthesis_prompt(&chief.system_prompt, question, &responses);
    let synthesis_result = caller.call(AgentSlug::Chief, &prompt).await;
    let synthesis = if synthesis_result.provider == ServedBy::Error {
        tracing::warn!("Board synthesis failed: {}", synthesis_result.text);
        SYNTHESIS_FALLBACK.to_string()
    } else {
        synthesis_result.text
    };

    BoardMeetingResult {
        question: question.to_string(),
        responses,
        synthesis,
        total_duration_ms: started.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted caller: named agents fail, everyone else answers. Records
    /// every prompt it receives.
    struct ScriptedCaller {
        failing: HashSet<AgentSlug>,
        slow: Option<AgentSlug>,
        prompts: Mutex<Vec<(AgentSlug, String)>>,
    }

    impl ScriptedCaller {
        fn new(failing: &[AgentSlug]) -> Self {
            Self {
                failing: failing.iter().copied().collect(),
                slow: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelCaller for ScriptedCaller {
        async fn call(&self, agent: AgentSlug, prompt: &str) -> ProviderResult {
            self.prompts
                .lock()
                .unwrap()
                .push((agent, prompt.to_string()));

            if self.slow == Some(agent) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            if self.failing.contains(&agent) {
                ProviderResult {
                    text: "Error: all providers failed (attempted: claude)".to_string(),
                    provider: ServedBy::Error,
                    duration_ms: 1,
                }
            } else {
                ProviderResult {
                    text: format!("{} says yes", agent),
                    provider: ServedBy::Claude,
                    duration_ms: 1,
                }
            }
        }
    }

    #[tokio::test]
    async fn every_specialist_gets_a_slot() {
        let caller = Arc::new(ScriptedCaller::new(&[]));
        let registry = AgentRegistry::defaults();

        let result = run_board_meeting(caller, &registry, "Should we move?", None).await;

        assert_eq!(result.responses.len(), AgentSlug::specialists().len());
        assert!(result.responses.iter().all(|r| r.error.is_none()));
        assert_eq!(result.synthesis, "chief says yes");
    }

    #[tokio::test]
    async fn one_failing_specialist_is_isolated() {
        let caller = Arc::new(ScriptedCaller::new(&[AgentSlug::Legal]));
        let registry = AgentRegistry::defaults();

        let result = run_board_meeting(caller.clone(), &registry, "Sign the lease?", None).await;

        assert_eq!(result.responses.len(), AgentSlug::specialists().len());
        let failed: Vec<_> = result
            .responses
            .iter()
            .filter(|r| r.error.is_some())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].agent, "Legal Counsel");
        assert_eq!(failed[0].response, "[agent was unable to respond]");

        // Synthesis still runs and its prompt carries every member,
        // placeholder included.
        let prompts = caller.prompts.lock().unwrap();
        let (_, synthesis_prompt) = prompts
            .iter()
            .find(|(slug, _)| *slug == AgentSlug::Chief)
            .expect("synthesis call");
        for profile in registry.specialists() {
            assert!(synthesis_prompt.contains(&profile.name));
        }
        assert!(synthesis_prompt.contains("[agent was unable to respond]"));
    }

    #[tokio::test]
    async fn slow_specialist_does_not_drop_anyone() {
        let mut caller = ScriptedCaller::new(&[]);
        caller.slow = Some(AgentSlug::Health);
        let registry = AgentRegistry::defaults();

        let result =
            run_board_meeting(Arc::new(caller), &registry, "Marathon in June?", None).await;

        assert_eq!(result.responses.len(), AgentSlug::specialists().len());
        assert!(result.total_duration_ms >= 50);
        // Slot order follows the specialist listing, not completion order.
        let names: Vec<_> = result.responses.iter().map(|r| r.agent.as_str()).collect();
        let expected: Vec<_> = registry
            .specialists()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn failed_synthesis_falls_back_to_fixed_text() {
        let caller = Arc::new(ScriptedCaller::new(&[AgentSlug::Chief]));
        let registry = AgentRegistry::defaults();

        let result = run_board_meeting(caller, &registry, "Pivot?", None).await;

        assert!(result.responses.iter().all(|r| r.error.is_none()));
        assert_eq!(
            result.synthesis,
            "The board was unable to produce a synthesis. Please review the individual responses."
        );
    }

    #[tokio::test]
    async fn profile_context_reaches_specialist_prompts() {
        let caller = Arc::new(ScriptedCaller::new(&[]));
        let registry = AgentRegistry::defaults();

        run_board_meeting(
            caller.clone(),
            &registry,
            "Buy or rent?",
            Some("The principal lives in Lisbon."),
        )
        .await;

        let prompts = caller.prompts.lock().unwrap();
        for (slug, prompt) in prompts.iter() {
            if *slug != AgentSlug::Chief {
                assert!(prompt.contains("The principal lives in Lisbon."));
            }
        }
    }
}

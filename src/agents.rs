//! Agent personas: the closed slug set, system prompts, and topic bindings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Conversational persona slug. The set is closed; `Chief` is the
/// orchestrator and is excluded from specialist listings.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentSlug {
    General,
    Research,
    Finance,
    Health,
    Legal,
    Creative,
    Chief,
}

impl AgentSlug {
    /// The default slug used when a message carries no routing metadata.
    pub const DEFAULT: AgentSlug = AgentSlug::General;

    pub fn all() -> &'static [AgentSlug] {
        &[
            AgentSlug::General,
            AgentSlug::Research,
            AgentSlug::Finance,
            AgentSlug::Health,
            AgentSlug::Legal,
            AgentSlug::Creative,
            AgentSlug::Chief,
        ]
    }

    /// Every agent except the orchestrator.
    pub fn specialists() -> Vec<AgentSlug> {
        Self::all()
            .iter()
            .copied()
            .filter(|s| *s != AgentSlug::Chief)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentSlug::General => "general",
            AgentSlug::Research => "research",
            AgentSlug::Finance => "finance",
            AgentSlug::Health => "health",
            AgentSlug::Legal => "legal",
            AgentSlug::Creative => "creative",
            AgentSlug::Chief => "chief",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentSlug::General => "Assistant",
            AgentSlug::Research => "Research Lead",
            AgentSlug::Finance => "Finance Lead",
            AgentSlug::Health => "Health Coach",
            AgentSlug::Legal => "Legal Counsel",
            AgentSlug::Creative => "Creative Director",
            AgentSlug::Chief => "Chief of Staff",
        }
    }
}

impl std::fmt::Display for AgentSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentSlug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(AgentSlug::General),
            "research" => Ok(AgentSlug::Research),
            "finance" => Ok(AgentSlug::Finance),
            "health" => Ok(AgentSlug::Health),
            "legal" => Ok(AgentSlug::Legal),
            "creative" => Ok(AgentSlug::Creative),
            "chief" => Ok(AgentSlug::Chief),
            _ => Err(format!("Unknown agent slug: {}", s)),
        }
    }
}

/// A loaded persona: slug, display name, system prompt, optional chat topic.
#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub slug: AgentSlug,
    pub name: String,
    pub system_prompt: String,
    pub topic_id: Option<i64>,
}

/// Registry of all personas, loaded once at startup.
pub struct AgentRegistry {
    agents: HashMap<AgentSlug, AgentProfile>,
}

impl AgentRegistry {
    /// Load prompts from `<home>/agents/<slug>.md` and topic bindings from
    /// `<home>/topics.json`. Missing files fall back to generated defaults.
    pub fn load(home: &Path) -> Self {
        let topics = load_topic_map(home);
        let mut agents = HashMap::new();

        for slug in AgentSlug::all() {
            let prompt_path = home.join("agents").join(format!("{}.md", slug.as_str()));
            let system_prompt = match std::fs::read_to_string(&prompt_path) {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => {
                    tracing::debug!(
                        "No prompt file for {}, using generated default",
                        slug.as_str()
                    );
                    default_prompt(*slug)
                }
            };

            agents.insert(
                *slug,
                AgentProfile {
                    slug: *slug,
                    name: slug.display_name().to_string(),
                    system_prompt,
                    topic_id: topics.get(slug.as_str()).copied(),
                },
            );
        }

        Self { agents }
    }

    /// Build a registry from generated defaults only (no filesystem).
    pub fn defaults() -> Self {
        let mut agents = HashMap::new();
        for slug in AgentSlug::all() {
            agents.insert(
                *slug,
                AgentProfile {
                    slug: *slug,
                    name: slug.display_name().to_string(),
                    system_prompt: default_prompt(*slug),
                    topic_id: None,
                },
            );
        }
        Self { agents }
    }

    pub fn get(&self, slug: AgentSlug) -> &AgentProfile {
        // The map is populated for every slug at construction.
        &self.agents[&slug]
    }

    /// All specialist profiles, in slug order, orchestrator excluded.
    pub fn specialists(&self) -> Vec<&AgentProfile> {
        AgentSlug::specialists()
            .into_iter()
            .map(|s| self.get(s))
            .collect()
    }

    /// Bind a chat topic to an agent at runtime.
    pub fn bind_topic(&mut self, slug: AgentSlug, topic_id: i64) {
        if let Some(profile) = self.agents.get_mut(&slug) {
            profile.topic_id = Some(topic_id);
        }
    }

    /// Resolve an agent from a chat topic id.
    pub fn by_topic(&self, topic_id: i64) -> Option<&AgentProfile> {
        self.agents
            .values()
            .find(|p| p.topic_id == Some(topic_id))
    }
}

fn load_topic_map(home: &Path) -> HashMap<String, i64> {
    let path = home.join("topics.json");
    if !path.exists() {
        return HashMap::new();
    }

    match std::fs::read_to_string(&path)
        .ok()
        .and_then(|c| serde_json::from_str::<HashMap<String, i64>>(&c).ok())
    {
        Some(map) => map,
        None => {
            tracing::warn!("Failed to parse {}, ignoring topic map", path.display());
            HashMap::new()
        }
    }
}

/// Generated default persona prompt for a slug.
pub fn default_prompt(slug: AgentSlug) -> String {
    let focus = match slug {
        AgentSlug::General => "day-to-day assistance, scheduling, and correspondence",
        AgentSlug::Research => "research, fact-finding, and summarizing sources",
        AgentSlug::Finance => "personal finance, budgets, and investments",
        AgentSlug::Health => "fitness, nutrition, and wellbeing",
        AgentSlug::Legal => "contracts, obligations, and legal risk",
        AgentSlug::Creative => "writing, naming, and creative direction",
        AgentSlug::Chief => "synthesizing specialist input into one clear recommendation",
    };
    format!(
        "You are {}, a trusted personal assistant persona focused on {}. \
         Be concise and practical.",
        slug.display_name(),
        focus
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialists_exclude_orchestrator() {
        let specialists = AgentSlug::specialists();
        assert_eq!(specialists.len(), AgentSlug::all().len() - 1);
        assert!(!specialists.contains(&AgentSlug::Chief));
    }

    #[test]
    fn slug_round_trips_through_str() {
        for slug in AgentSlug::all() {
            assert_eq!(slug.as_str().parse::<AgentSlug>().unwrap(), *slug);
        }
        assert!("warlord".parse::<AgentSlug>().is_err());
    }

    #[test]
    fn default_registry_has_every_slug() {
        let registry = AgentRegistry::defaults();
        for slug in AgentSlug::all() {
            assert!(!registry.get(*slug).system_prompt.is_empty());
        }
    }

    #[test]
    fn topic_binding_resolves() {
        let mut registry = AgentRegistry::defaults();
        registry.bind_topic(AgentSlug::Research, 42);
        assert_eq!(registry.by_topic(42).unwrap().slug, AgentSlug::Research);
        assert!(registry.by_topic(7).is_none());
    }
}

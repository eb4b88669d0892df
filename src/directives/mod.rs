//! Directives: structured instructions embedded in model output as
//! bracketed tags, extracted before text reaches the user.

pub mod intents;
pub mod parser;

pub use intents::MemoryIntentProcessor;
pub use parser::{extract_actions, extract_memory_directives, ParsedActions};

/// An action directive parsed from an `[ACTION: ...]` tag.
///
/// `fields` preserves the order the segments appeared in, but equality of
/// two directives is equality of the key/value mapping.
#[derive(Clone, Debug)]
pub struct ActionDirective {
    /// Lowercased action type, e.g. `send_email`.
    pub kind: String,
    /// Lowercased keys mapped to trimmed values, in order of appearance.
    pub fields: Vec<(String, String)>,
}

impl ActionDirective {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A memory directive parsed from a `[REMEMBER: ...]`, `[GOAL: ...]`, or
/// `[DONE: ...]` tag.
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryDirective {
    /// A fact to store verbatim.
    Remember(String),
    /// A goal plus optional deadline text.
    Goal {
        text: String,
        deadline: Option<String>,
    },
    /// A search string used to mark one matching goal complete.
    Done(String),
}

//! Memory intent processing: remember/goal/done tags become store writes.

use std::sync::Arc;

use super::parser::extract_memory_directives;
use super::MemoryDirective;
use crate::store::Store;

/// Consumes memory directives embedded in a response and returns the
/// tag-stripped text. Every store write is independent: one failure is
/// logged and the rest still run, and the cleaned text is returned no
/// matter how many writes failed.
pub struct MemoryIntentProcessor {
    store: Option<Arc<Store>>,
}

impl MemoryIntentProcessor {
    pub fn new(store: Option<Arc<Store>>) -> Self {
        Self { store }
    }

    /// Process all memory tags in `text` and return the cleaned text.
    pub fn process_intents(&self, text: &str) -> String {
        let (cleaned, directives) = extract_memory_directives(text);

        let Some(store) = &self.store else {
            if !directives.is_empty() {
                tracing::warn!(
                    "Store unavailable, dropping {} memory directive(s)",
                    directives.len()
                );
            }
            return cleaned;
        };

        for directive in directives {
            match directive {
                MemoryDirective::Remember(fact) => {
                    if let Err(e) = store.insert_fact(&fact) {
                        tracing::warn!("Failed to store fact: {}", e);
                    } else {
                        tracing::debug!("Stored fact: {}", fact);
                    }
                }
                MemoryDirective::Goal { text, deadline } => {
                    if let Err(e) = store.insert_goal(&text, deadline.as_deref()) {
                        tracing::warn!("Failed to store goal: {}", e);
                    } else {
                        tracing::debug!("Stored goal: {} (deadline: {:?})", text, deadline);
                    }
                }
                MemoryDirective::Done(search) => match store.find_pending_goal(&search) {
                    Ok(Some((id, content))) => {
                        if let Err(e) = store.complete_goal(&id) {
                            tracing::warn!("Failed to complete goal {}: {}", id, e);
                        } else {
                            tracing::info!("Completed goal: {}", content);
                        }
                    }
                    // No matching goal is a silent no-op, not an error.
                    Ok(None) => {
                        tracing::debug!("No pending goal matching '{}'", search);
                    }
                    Err(e) => {
                        tracing::warn!("Goal lookup failed for '{}': {}", search, e);
                    }
                },
            }
        }

        cleaned
    }
}

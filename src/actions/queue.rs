//! Action queue: pending/approved/denied/executed lifecycle with
//! at-most-once execution on approval.

use std::sync::Arc;

use super::{describe, executor, ActionStatus, PendingAction};
use crate::directives::ActionDirective;
use crate::store::Store;

/// Structured result of an approve/deny call, surfaced to the approval UI
/// instead of a raw error.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub success: bool,
    pub description: String,
}

impl ActionOutcome {
    fn failure(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
        }
    }
}

/// Single point of truth for queued actions.
pub struct ActionQueue {
    store: Option<Arc<Store>>,
}

impl ActionQueue {
    pub fn new(store: Option<Arc<Store>>) -> Self {
        Self { store }
    }

    /// Queue a new pending action. Returns the generated id, or `None` when
    /// the store is unavailable or the insert failed - callers treat `None`
    /// as "not queued", never as a crash.
    pub fn queue_action(&self, directive: &ActionDirective) -> Option<String> {
        let Some(store) = &self.store else {
            tracing::warn!("Store unavailable, dropping action '{}'", directive.kind);
            return None;
        };

        let description = describe(directive);
        let payload = serde_json::to_string(&directive.fields).unwrap_or_else(|_| "[]".to_string());

        match store.insert_action(&directive.kind, &description, &payload) {
            Ok(id) => {
                tracing::info!("Queued action {} ({}): {}", id, directive.kind, description);
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Failed to queue action '{}': {}", directive.kind, e);
                None
            }
        }
    }

    /// Approve a pending action and execute it synchronously.
    ///
    /// The pending->approved transition is a conditional update, so two
    /// concurrent approvals of one id result in exactly one execution; the
    /// loser gets the current status back in the description.
    pub fn approve_action(&self, id: &str) -> ActionOutcome {
        let Some(store) = &self.store else {
            return ActionOutcome::failure("Action store is not available");
        };

        match store.transition_action(id, ActionStatus::Pending, ActionStatus::Approved, None) {
            Ok(true) => {}
            Ok(false) => return self.refusal(store, id),
            Err(e) => return ActionOutcome::failure(format!("Could not update action: {}", e)),
        }

        let action = match store.get_action(id) {
            Ok(Some(a)) => a,
            Ok(None) => return ActionOutcome::failure(format!("Unknown action: {}", id)),
            Err(e) => return ActionOutcome::failure(format!("Could not load action: {}", e)),
        };

        let outcome = executor::execute(&action);
        let terminal = if outcome.ok {
            ActionStatus::Executed
        } else {
            ActionStatus::Failed
        };

        // A crash between the approved and executed writes leaves the action
        // in approved; reconcile_startup surfaces those for manual review
        // rather than re-executing.
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(e) = store.transition_action(id, ActionStatus::Approved, terminal, Some(now)) {
            tracing::error!("Failed to mark action {} {}: {}", id, terminal, e);
        }

        ActionOutcome {
            success: true,
            description: outcome.description,
        }
    }

    /// Deny a pending action. Terminal: nothing is executed.
    pub fn deny_action(&self, id: &str) -> ActionOutcome {
        let Some(store) = &self.store else {
            return ActionOutcome::failure("Action store is not available");
        };

        match store.transition_action(id, ActionStatus::Pending, ActionStatus::Denied, None) {
            Ok(true) => {}
            Ok(false) => return self.refusal(store, id),
            Err(e) => return ActionOutcome::failure(format!("Could not update action: {}", e)),
        }

        let description = match store.get_action(id) {
            Ok(Some(a)) => format!("Denied: {}", a.description),
            _ => "Denied".to_string(),
        };
        tracing::info!("Action {} denied", id);

        ActionOutcome {
            success: true,
            description,
        }
    }

    pub fn get_action(&self, id: &str) -> Option<PendingAction> {
        let store = self.store.as_ref()?;
        store.get_action(id).ok().flatten()
    }

    pub fn pending_actions(&self) -> Vec<PendingAction> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store
            .list_actions_by_status(ActionStatus::Pending)
            .unwrap_or_default()
    }

    /// Startup reconciliation: surface actions stranded in `approved` by a
    /// crash between the approved and executed writes. They are reported,
    /// never re-executed - re-execution risks duplicate side effects.
    pub fn reconcile_startup(&self) -> Vec<PendingAction> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let stranded = store
            .list_actions_by_status(ActionStatus::Approved)
            .unwrap_or_default();
        for action in &stranded {
            tracing::warn!(
                "Action {} ({}) stuck in approved state, needs manual review",
                action.id,
                action.description
            );
        }
        stranded
    }

    /// Build the refusal message for a transition that did not apply:
    /// either the id is unknown or the action is already in a later state.
    fn refusal(&self, store: &Store, id: &str) -> ActionOutcome {
        match store.get_action(id) {
            Ok(Some(action)) => {
                ActionOutcome::failure(format!("Action already {}", action.status))
            }
            Ok(None) => ActionOutcome::failure(format!("Unknown action: {}", id)),
            Err(e) => ActionOutcome::failure(format!("Could not load action: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::parser::extract_actions;
    use crate::store::test_store;
    use tempfile::TempDir;

    fn queue_with_store(dir: &TempDir) -> (ActionQueue, Arc<Store>) {
        let store = test_store(dir.path());
        (ActionQueue::new(Some(store.clone())), store)
    }

    fn sample_directive() -> ActionDirective {
        extract_actions("[ACTION: create_task | TITLE: Buy milk | DUE: tomorrow]")
            .actions
            .remove(0)
    }

    #[test]
    fn approve_executes_exactly_once() {
        let dir = TempDir::new().unwrap();
        let (queue, _store) = queue_with_store(&dir);

        let id = queue.queue_action(&sample_directive()).unwrap();
        assert_eq!(
            queue.get_action(&id).unwrap().status,
            ActionStatus::Pending
        );

        let first = queue.approve_action(&id);
        assert!(first.success);
        assert_eq!(first.description, "Task \"Buy milk\" created");

        let action = queue.get_action(&id).unwrap();
        assert_eq!(action.status, ActionStatus::Executed);
        assert!(action.executed_at.is_some());

        let second = queue.approve_action(&id);
        assert!(!second.success);
        assert_eq!(second.description, "Action already executed");
    }

    #[test]
    fn deny_is_terminal() {
        let dir = TempDir::new().unwrap();
        let (queue, _store) = queue_with_store(&dir);

        let id = queue.queue_action(&sample_directive()).unwrap();
        let denied = queue.deny_action(&id);
        assert!(denied.success);
        assert!(denied.description.contains("Buy milk"));

        // Neither approve nor deny can move a denied action.
        let approve = queue.approve_action(&id);
        assert!(!approve.success);
        assert_eq!(approve.description, "Action already denied");

        let deny_again = queue.deny_action(&id);
        assert!(!deny_again.success);
        assert_eq!(deny_again.description, "Action already denied");
    }

    #[test]
    fn unknown_id_fails_gracefully() {
        let dir = TempDir::new().unwrap();
        let (queue, _store) = queue_with_store(&dir);

        let outcome = queue.approve_action("01NOPE");
        assert!(!outcome.success);
        assert!(outcome.description.contains("Unknown action"));
    }

    #[test]
    fn missing_store_degrades_without_crashing() {
        let queue = ActionQueue::new(None);
        assert!(queue.queue_action(&sample_directive()).is_none());

        let outcome = queue.approve_action("01ANY");
        assert!(!outcome.success);
        assert!(outcome.description.contains("not available"));
        assert!(queue.pending_actions().is_empty());
    }

    #[test]
    fn reconcile_surfaces_only_stranded_approved_actions() {
        let dir = TempDir::new().unwrap();
        let (queue, store) = queue_with_store(&dir);

        let stuck = queue.queue_action(&sample_directive()).unwrap();
        store
            .transition_action(&stuck, ActionStatus::Pending, ActionStatus::Approved, None)
            .unwrap();

        let done = queue.queue_action(&sample_directive()).unwrap();
        queue.approve_action(&done);

        let stranded = queue.reconcile_startup();
        assert_eq!(stranded.len(), 1);
        assert_eq!(stranded[0].id, stuck);
    }
}

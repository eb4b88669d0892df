//! Action execution: the seam where real side-effectors plug in.
//!
//! Today every handler logs and returns a templated confirmation. Execution
//! never propagates an error: handler failures become a descriptive failure
//! string so the approval flow can record the outcome.

use super::{ActionKind, PendingAction};
use crate::error::Error;

/// Result of executing one approved action.
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub ok: bool,
    pub description: String,
}

/// Execute an approved action exactly once. Dispatches on the action kind;
/// unknown kinds fall through to a logged no-op.
pub fn execute(action: &PendingAction) -> ExecutionOutcome {
    let result = match ActionKind::parse(&action.kind) {
        ActionKind::SendEmail => run_send_email(action),
        ActionKind::CreateTask => run_create_task(action),
        ActionKind::AddCalendarEvent => run_add_calendar_event(action),
        ActionKind::SetReminder => run_set_reminder(action),
        ActionKind::Unknown => {
            tracing::info!("No handler for action kind '{}', logged only", action.kind);
            Ok(format!(
                "Action '{}' logged; no handler configured",
                action.kind
            ))
        }
    };

    match result {
        Ok(description) => ExecutionOutcome {
            ok: true,
            description,
        },
        Err(e) => {
            tracing::error!("Action {} failed: {}", action.id, e);
            ExecutionOutcome {
                ok: false,
                description: format!("Action failed: {}", e),
            }
        }
    }
}

fn payload_field<'a>(action: &'a PendingAction, key: &str) -> &'a str {
    action
        .payload
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("?")
}

fn run_send_email(action: &PendingAction) -> Result<String, Error> {
    let to = payload_field(action, "to");
    tracing::info!("Executing send_email to {}", to);
    Ok(format!("Email to {} sent", to))
}

fn run_create_task(action: &PendingAction) -> Result<String, Error> {
    let title = payload_field(action, "title");
    tracing::info!("Executing create_task '{}'", title);
    Ok(format!("Task \"{}\" created", title))
}

fn run_add_calendar_event(action: &PendingAction) -> Result<String, Error> {
    let title = payload_field(action, "title");
    tracing::info!("Executing add_calendar_event '{}'", title);
    Ok(format!("Calendar event \"{}\" added", title))
}

fn run_set_reminder(action: &PendingAction) -> Result<String, Error> {
    let text = payload_field(action, "text");
    tracing::info!("Executing set_reminder '{}'", text);
    Ok(format!("Reminder \"{}\" set", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionStatus;

    fn action(kind: &str, payload: Vec<(String, String)>) -> PendingAction {
        PendingAction {
            id: "01TEST".to_string(),
            kind: kind.to_string(),
            description: String::new(),
            payload,
            status: ActionStatus::Approved,
            created_at: 0,
            executed_at: None,
        }
    }

    #[test]
    fn known_kind_returns_confirmation() {
        let outcome = execute(&action(
            "send_email",
            vec![("to".to_string(), "a@b.com".to_string())],
        ));
        assert!(outcome.ok);
        assert_eq!(outcome.description, "Email to a@b.com sent");
    }

    #[test]
    fn unknown_kind_is_logged_not_rejected() {
        let outcome = execute(&action("water_plants", vec![]));
        assert!(outcome.ok);
        assert!(outcome.description.contains("no handler configured"));
    }
}

//! Actions: directives with external effects, gated behind human approval.

pub mod executor;
pub mod queue;

pub use executor::{execute, ExecutionOutcome};
pub use queue::{ActionOutcome, ActionQueue};

use std::str::FromStr;

use crate::directives::ActionDirective;

/// Action lifecycle state.
///
/// `pending -> approved -> executed` (or `failed`), or `pending -> denied`.
/// `denied`, `executed`, and `failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Approved,
    Denied,
    Executed,
    Failed,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Approved => write!(f, "approved"),
            ActionStatus::Denied => write!(f, "denied"),
            ActionStatus::Executed => write!(f, "executed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "denied" => Ok(ActionStatus::Denied),
            "executed" => Ok(ActionStatus::Executed),
            "failed" => Ok(ActionStatus::Failed),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// A persisted action awaiting (or past) approval.
#[derive(Clone, Debug)]
pub struct PendingAction {
    pub id: String,
    pub kind: String,
    pub description: String,
    /// Original field mapping from the directive, stored verbatim.
    pub payload: Vec<(String, String)>,
    pub status: ActionStatus,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

/// The closed set of action kinds this system knows how to describe and
/// execute. Anything else falls through to the generic arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    SendEmail,
    CreateTask,
    AddCalendarEvent,
    SetReminder,
    Unknown,
}

impl ActionKind {
    pub fn parse(kind: &str) -> ActionKind {
        match kind {
            "send_email" => ActionKind::SendEmail,
            "create_task" => ActionKind::CreateTask,
            "add_calendar_event" => ActionKind::AddCalendarEvent,
            "set_reminder" => ActionKind::SetReminder,
            _ => ActionKind::Unknown,
        }
    }
}

fn field_or_placeholder<'a>(directive: &'a ActionDirective, key: &str) -> &'a str {
    // Best-effort: a missing field never rejects the directive.
    directive.field(key).filter(|v| !v.is_empty()).unwrap_or("?")
}

/// Human-readable summary of a directive, computed once at queue time.
pub fn describe(directive: &ActionDirective) -> String {
    match ActionKind::parse(&directive.kind) {
        ActionKind::SendEmail => format!(
            "Send email to {}: \"{}\"",
            field_or_placeholder(directive, "to"),
            field_or_placeholder(directive, "subject"),
        ),
        ActionKind::CreateTask => format!(
            "Create task: \"{}\" (due {})",
            field_or_placeholder(directive, "title"),
            field_or_placeholder(directive, "due"),
        ),
        ActionKind::AddCalendarEvent => format!(
            "Add calendar event: \"{}\" at {}",
            field_or_placeholder(directive, "title"),
            field_or_placeholder(directive, "time"),
        ),
        ActionKind::SetReminder => format!(
            "Set reminder: \"{}\" at {}",
            field_or_placeholder(directive, "text"),
            field_or_placeholder(directive, "time"),
        ),
        ActionKind::Unknown => {
            if directive.fields.is_empty() {
                directive.kind.clone()
            } else {
                let fields = directive
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {}", directive.kind, fields)
            }
        }
    }
}

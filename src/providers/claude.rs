//! Claude CLI provider: the primary backend, and the only one with
//! session continuity.

use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use super::provider::{Completion, Provider, ProviderError, Result};

pub struct ClaudeProvider {
    cli_path: String,
    default_model: String,
}

impl ClaudeProvider {
    pub fn new() -> Self {
        Self {
            cli_path: "claude".to_string(),
            default_model: "sonnet".to_string(),
        }
    }

    pub fn with_cli_path(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            default_model: "sonnet".to_string(),
        }
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn selected_model_arg(model: Option<&str>) -> Option<String> {
    model
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != "default")
        .map(ToString::to_string)
}

/// Scrape a `Session ID: <uuid>` line from CLI output. Returns the text
/// with the line removed, plus the validated session id if present.
fn split_session_id(stdout: &str) -> (String, Option<String>) {
    let re = match Regex::new(r"(?im)^\s*Session ID:\s*([0-9a-fA-F-]{36})\s*$") {
        Ok(r) => r,
        Err(_) => return (stdout.to_string(), None),
    };

    let Some(caps) = re.captures(stdout) else {
        return (stdout.to_string(), None);
    };

    let candidate = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    if uuid::Uuid::parse_str(candidate).is_err() {
        return (stdout.to_string(), None);
    }

    let whole = caps.get(0).expect("match group 0");
    let mut text = String::with_capacity(stdout.len());
    text.push_str(&stdout[..whole.start()]);
    text.push_str(&stdout[whole.end()..]);

    (text.trim().to_string(), Some(candidate.to_lowercase()))
}

#[async_trait]
impl Provider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.cli_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| true)
            .unwrap_or(false)
    }

    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        resume: Option<&str>,
    ) -> Result<Completion> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p").arg(prompt);

        if let Some(m) = selected_model_arg(model) {
            cmd.arg("--model").arg(m);
        }

        if let Some(session_id) = resume {
            cmd.arg("--resume").arg(session_id);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // The router wraps this call in a timeout; dropping the future
        // must take the subprocess down with it.
        cmd.kill_on_drop(true);

        let output = cmd.output().await?;

        if output.status.success() {
            let raw = String::from_utf8_lossy(&output.stdout).to_string();
            let (text, session_id) = split_session_id(&raw);
            Ok(Completion { text, session_id })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ProviderError::ApiError(stderr.to_string()))
        }
    }

    fn default_model(&self) -> Option<&str> {
        Some(&self.default_model)
    }
}

#[cfg(test)]
mod tests {
    use super::{selected_model_arg, split_session_id};

    #[test]
    fn default_model_does_not_force_override() {
        assert_eq!(selected_model_arg(Some("default")), None);
        assert_eq!(selected_model_arg(Some("")), None);
        assert_eq!(selected_model_arg(Some("opus")), Some("opus".to_string()));
    }

    #[test]
    fn session_id_is_scraped_and_stripped() {
        let stdout = "Here is your answer.\nSession ID: 6fa3c2de-1b4a-4e8f-9c3d-2a5b6c7d8e9f\n";
        let (text, session_id) = split_session_id(stdout);
        assert_eq!(text, "Here is your answer.");
        assert_eq!(
            session_id.as_deref(),
            Some("6fa3c2de-1b4a-4e8f-9c3d-2a5b6c7d8e9f")
        );
    }

    #[test]
    fn output_without_session_line_passes_through() {
        let (text, session_id) = split_session_id("Just an answer.");
        assert_eq!(text, "Just an answer.");
        assert!(session_id.is_none());
    }

    #[test]
    fn invalid_uuid_is_not_scraped() {
        let stdout = "Answer.\nSession ID: not-a-uuid-but-36-characters-long-x\n";
        let (_, session_id) = split_session_id(stdout);
        assert!(session_id.is_none());
    }
}

//! Per-agent session continuity for the Claude CLI provider.
//!
//! Sessions live in a single JSON file. A legacy top-level
//! `sessionId`/`lastActivity` pair predates per-agent entries: writes to the
//! default slug mirror into it, and reads of the default slug fall back to
//! it when no per-agent entry exists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::agents::AgentSlug;
use crate::error::Error;
use crate::lock::with_lock;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionEntry {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "lastActivity")]
    pub last_activity: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct SessionFile {
    /// Legacy single-session shape, mirroring the default slug's entry.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(rename = "lastActivity", skip_serializing_if = "Option::is_none")]
    last_activity: Option<i64>,

    #[serde(default)]
    agents: HashMap<String, SessionEntry>,
}

/// Session identifier store, one active id per agent slug.
///
/// The in-process mutex serializes read-modify-write per file, which covers
/// the per-slug requirement; the file lock guards against a second process.
pub struct SessionStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl SessionStore {
    pub fn new(home: &Path) -> Self {
        Self {
            path: home.join("sessions.json"),
            guard: Mutex::new(()),
        }
    }

    /// Get the active session id for an agent, if any.
    pub fn get(&self, slug: AgentSlug) -> Option<String> {
        let _guard = self.guard.lock().ok()?;
        let file = self.load().ok()?;

        if let Some(entry) = file.agents.get(slug.as_str()) {
            return Some(entry.session_id.clone());
        }

        // Legacy fallback applies to the default slug only.
        if slug == AgentSlug::DEFAULT {
            return file.session_id;
        }
        None
    }

    /// Record a new session id for an agent.
    pub fn set(&self, slug: AgentSlug, session_id: &str) -> Result<(), Error> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::Session("session store mutex poisoned".to_string()))?;

        let mut file = self.load().unwrap_or_default();
        let now = chrono::Utc::now().timestamp_millis();

        file.agents.insert(
            slug.as_str().to_string(),
            SessionEntry {
                session_id: session_id.to_string(),
                last_activity: now,
            },
        );

        if slug == AgentSlug::DEFAULT {
            file.session_id = Some(session_id.to_string());
            file.last_activity = Some(now);
        }

        self.save(&file)?;
        tracing::debug!("Session for {} set to {}", slug, session_id);
        Ok(())
    }

    /// Forget an agent's session, forcing the next call to start fresh.
    pub fn clear(&self, slug: AgentSlug) -> Result<(), Error> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::Session("session store mutex poisoned".to_string()))?;

        let mut file = self.load().unwrap_or_default();
        file.agents.remove(slug.as_str());
        if slug == AgentSlug::DEFAULT {
            file.session_id = None;
            file.last_activity = None;
        }
        self.save(&file)
    }

    /// Slugs with an active session, for the status report.
    pub fn active_slugs(&self) -> Vec<String> {
        let Ok(_guard) = self.guard.lock() else {
            return Vec::new();
        };
        let Ok(file) = self.load() else {
            return Vec::new();
        };
        let mut slugs: Vec<String> = file.agents.keys().cloned().collect();
        if file.session_id.is_some() && !file.agents.contains_key(AgentSlug::DEFAULT.as_str()) {
            slugs.push(AgentSlug::DEFAULT.as_str().to_string());
        }
        slugs.sort();
        slugs
    }

    fn load(&self) -> Result<SessionFile, Error> {
        if !self.path.exists() {
            return Ok(SessionFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, file: &SessionFile) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(file)?;
        with_lock(&self.path, || {
            std::fs::write(&self.path, &content)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sessions_are_scoped_per_slug() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        store.set(AgentSlug::Research, "res-session-1").unwrap();
        store.set(AgentSlug::Finance, "fin-session-1").unwrap();

        assert_eq!(
            store.get(AgentSlug::Research).as_deref(),
            Some("res-session-1")
        );
        assert_eq!(
            store.get(AgentSlug::Finance).as_deref(),
            Some("fin-session-1")
        );

        store.set(AgentSlug::Research, "res-session-2").unwrap();
        assert_eq!(
            store.get(AgentSlug::Research).as_deref(),
            Some("res-session-2")
        );
        assert_eq!(
            store.get(AgentSlug::Finance).as_deref(),
            Some("fin-session-1")
        );
    }

    #[test]
    fn default_slug_mirrors_into_legacy_pair() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        store.set(AgentSlug::Research, "res-session").unwrap();
        store.set(AgentSlug::General, "gen-session").unwrap();

        let raw = std::fs::read_to_string(dir.path().join("sessions.json")).unwrap();
        let file: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(file["sessionId"], "gen-session");
        assert_eq!(file["agents"]["general"]["sessionId"], "gen-session");
        assert_eq!(file["agents"]["research"]["sessionId"], "res-session");
    }

    #[test]
    fn legacy_only_file_is_readable_for_default_slug() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("sessions.json"),
            r#"{"sessionId": "old-session", "lastActivity": 1700000000000}"#,
        )
        .unwrap();

        let store = SessionStore::new(dir.path());
        assert_eq!(store.get(AgentSlug::General).as_deref(), Some("old-session"));
        assert_eq!(store.get(AgentSlug::Research), None);
    }

    #[test]
    fn clear_removes_entry_and_legacy_mirror() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());

        store.set(AgentSlug::General, "gen-session").unwrap();
        store.clear(AgentSlug::General).unwrap();
        assert_eq!(store.get(AgentSlug::General), None);
    }
}

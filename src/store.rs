//! SQLite-backed persistence for actions, memories, model configs, and
//! token usage.
//!
//! The store is a first-class optional collaborator: when the database is
//! disabled or fails to open, every consumer holds `None` and degrades to a
//! documented no-op instead of erroring.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::actions::{ActionStatus, PendingAction};
use crate::config::Settings;
use crate::error::Error;
use crate::models::ModelConfig;

pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (and initialize) the database at `path`.
    pub fn open(path: &Path) -> Result<Store, Error> {
        let store = Store {
            path: path.to_path_buf(),
        };
        // Create the schema up front so later failures are real errors.
        store.connect()?;
        Ok(store)
    }

    /// Open the configured database, degrading to `None` when persistence
    /// is disabled or unavailable.
    pub fn open_default(settings: &Settings) -> Option<Arc<Store>> {
        if !settings.database.enabled {
            tracing::info!("Persistence disabled in settings, running without a store");
            return None;
        }
        let path = match settings.database_path() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Could not resolve database path: {}", e);
                return None;
            }
        };
        match Store::open(&path) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::warn!("Could not open store at {}: {}", path.display(), e);
                None
            }
        }
    }

    fn connect(&self) -> Result<Connection, Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)
            .map_err(|e| Error::Store(format!("sqlite open: {}", e)))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS actions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                executed_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                content TEXT NOT NULL,
                deadline TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            );
            CREATE TABLE IF NOT EXISTS model_configs (
                agent TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                enabled INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS token_usage (
                id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                agent TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_actions_status ON actions(status, created_at);
            CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind, created_at);
            CREATE INDEX IF NOT EXISTS idx_usage_ts ON token_usage(ts);
            "#,
        )
        .map_err(|e| Error::Store(format!("sqlite init: {}", e)))?;
        Ok(conn)
    }

    // -- actions --

    /// Insert a new pending action and return its generated id.
    pub fn insert_action(
        &self,
        kind: &str,
        description: &str,
        payload_json: &str,
    ) -> Result<String, Error> {
        let conn = self.connect()?;
        let id = ulid::Ulid::new().to_string();
        conn.execute(
            "INSERT INTO actions (id, kind, description, payload, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                kind,
                description,
                payload_json,
                ActionStatus::Pending.to_string(),
                chrono::Utc::now().timestamp_millis(),
            ],
        )
        .map_err(|e| Error::Store(format!("sqlite insert action: {}", e)))?;
        Ok(id)
    }

    pub fn get_action(&self, id: &str) -> Result<Option<PendingAction>, Error> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, kind, description, payload, status, created_at, executed_at
             FROM actions WHERE id = ?1",
            params![id],
            row_to_action,
        )
        .optional()
        .map_err(|e| Error::Store(format!("sqlite get action: {}", e)))
    }

    /// Conditionally transition an action's status. Returns false when the
    /// action is absent or not in `from` - the check and the write are one
    /// atomic statement, which is what makes approve/deny race-safe.
    pub fn transition_action(
        &self,
        id: &str,
        from: ActionStatus,
        to: ActionStatus,
        executed_at: Option<i64>,
    ) -> Result<bool, Error> {
        let conn = self.connect()?;
        let changed = conn
            .execute(
                "UPDATE actions SET status = ?2, executed_at = COALESCE(?3, executed_at)
                 WHERE id = ?1 AND status = ?4",
                params![id, to.to_string(), executed_at, from.to_string()],
            )
            .map_err(|e| Error::Store(format!("sqlite transition action: {}", e)))?;
        Ok(changed == 1)
    }

    pub fn list_actions_by_status(
        &self,
        status: ActionStatus,
    ) -> Result<Vec<PendingAction>, Error> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, kind, description, payload, status, created_at, executed_at
                 FROM actions WHERE status = ?1 ORDER BY created_at",
            )
            .map_err(|e| Error::Store(format!("sqlite prepare list actions: {}", e)))?;
        let rows = stmt
            .query_map(params![status.to_string()], row_to_action)
            .map_err(|e| Error::Store(format!("sqlite list actions: {}", e)))?;
        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.map_err(|e| Error::Store(format!("sqlite read action: {}", e)))?);
        }
        Ok(actions)
    }

    // -- memories --

    /// Store a fact.
    pub fn insert_fact(&self, content: &str) -> Result<String, Error> {
        self.insert_memory("fact", content, None)
    }

    /// Store a goal with optional deadline text.
    pub fn insert_goal(&self, content: &str, deadline: Option<&str>) -> Result<String, Error> {
        self.insert_memory("goal", content, deadline)
    }

    fn insert_memory(
        &self,
        kind: &str,
        content: &str,
        deadline: Option<&str>,
    ) -> Result<String, Error> {
        let conn = self.connect()?;
        let id = ulid::Ulid::new().to_string();
        conn.execute(
            "INSERT INTO memories (id, kind, content, deadline, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                kind,
                content,
                deadline,
                chrono::Utc::now().timestamp_millis(),
            ],
        )
        .map_err(|e| Error::Store(format!("sqlite insert memory: {}", e)))?;
        Ok(id)
    }

    /// Find the most recent pending goal whose content contains `search`
    /// (case-insensitive). Returns (id, content).
    pub fn find_pending_goal(&self, search: &str) -> Result<Option<(String, String)>, Error> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, content FROM memories
             WHERE kind = 'goal' AND completed_at IS NULL
               AND instr(lower(content), lower(?1)) > 0
             ORDER BY created_at DESC LIMIT 1",
            params![search],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| Error::Store(format!("sqlite find goal: {}", e)))
    }

    /// Mark a goal complete.
    pub fn complete_goal(&self, id: &str) -> Result<(), Error> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE memories SET kind = 'completed_goal', completed_at = ?2 WHERE id = ?1",
            params![id, chrono::Utc::now().timestamp_millis()],
        )
        .map_err(|e| Error::Store(format!("sqlite complete goal: {}", e)))?;
        Ok(())
    }

    pub fn list_memories(&self, kind: &str) -> Result<Vec<(String, String)>, Error> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, content FROM memories WHERE kind = ?1 ORDER BY created_at")
            .map_err(|e| Error::Store(format!("sqlite prepare list memories: {}", e)))?;
        let rows = stmt
            .query_map(params![kind], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| Error::Store(format!("sqlite list memories: {}", e)))?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row.map_err(|e| Error::Store(format!("sqlite read memory: {}", e)))?);
        }
        Ok(memories)
    }

    // -- model configs --

    pub fn get_model_config(&self, agent: &str) -> Result<Option<ModelConfig>, Error> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT agent, provider, model, enabled FROM model_configs WHERE agent = ?1",
            params![agent],
            row_to_model_config,
        )
        .optional()
        .map_err(|e| Error::Store(format!("sqlite get model config: {}", e)))
    }

    pub fn list_model_configs(&self) -> Result<Vec<ModelConfig>, Error> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT agent, provider, model, enabled FROM model_configs ORDER BY agent")
            .map_err(|e| Error::Store(format!("sqlite prepare list configs: {}", e)))?;
        let rows = stmt
            .query_map([], row_to_model_config)
            .map_err(|e| Error::Store(format!("sqlite list configs: {}", e)))?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row.map_err(|e| Error::Store(format!("sqlite read config: {}", e)))?);
        }
        Ok(configs)
    }

    pub fn upsert_model_config(&self, config: &ModelConfig) -> Result<(), Error> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO model_configs (agent, provider, model, enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent) DO UPDATE SET
                provider = excluded.provider,
                model = excluded.model,
                enabled = excluded.enabled",
            params![
                config.agent,
                config.provider.to_string(),
                config.model,
                config.enabled,
            ],
        )
        .map_err(|e| Error::Store(format!("sqlite upsert model config: {}", e)))?;
        Ok(())
    }

    // -- token usage --

    #[allow(clippy::too_many_arguments)]
    pub fn record_usage(
        &self,
        agent: &str,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    ) -> Result<(), Error> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO token_usage (id, ts, agent, provider, model, input_tokens, output_tokens, cost)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ulid::Ulid::new().to_string(),
                chrono::Utc::now().timestamp_millis(),
                agent,
                provider,
                model,
                input_tokens as i64,
                output_tokens as i64,
                cost,
            ],
        )
        .map_err(|e| Error::Store(format!("sqlite insert usage: {}", e)))?;
        Ok(())
    }

    /// Total recorded cost, for the status report.
    pub fn total_cost(&self) -> Result<f64, Error> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COALESCE(SUM(cost), 0.0) FROM token_usage",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Store(format!("sqlite sum cost: {}", e)))
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingAction> {
    let status: String = row.get(4)?;
    let payload: String = row.get(3)?;
    Ok(PendingAction {
        id: row.get(0)?,
        kind: row.get(1)?,
        description: row.get(2)?,
        payload: serde_json::from_str(&payload).unwrap_or_default(),
        status: status.parse().unwrap_or(ActionStatus::Pending),
        created_at: row.get(5)?,
        executed_at: row.get(6)?,
    })
}

fn row_to_model_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelConfig> {
    let provider: String = row.get(1)?;
    Ok(ModelConfig {
        agent: row.get(0)?,
        provider: provider.parse().unwrap_or_default(),
        model: row.get(2)?,
        enabled: row.get(3)?,
    })
}

#[cfg(test)]
pub(crate) fn test_store(dir: &Path) -> Arc<Store> {
    Arc::new(Store::open(&dir.join("test.db")).unwrap())
}

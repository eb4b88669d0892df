//! Configuration loading for Attache.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agents::AgentSlug;
use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the Attache home directory (~/.attache).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".attache"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.attache/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let mut settings: Settings = serde_json::from_str(&content)?;

    // Self-heal minimal defaults for installs that predate newer fields.
    if ensure_defaults(&mut settings) {
        let updated = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&path, updated)?;
        tracing::info!("Applied default provisioning to {}", path.display());
    }

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn ensure_defaults(settings: &mut Settings) -> bool {
    let mut changed = false;

    if settings.models.provider.is_empty() {
        settings.models.provider = "claude".to_string();
        changed = true;
    }

    if settings.models.fallback_enabled.is_none() {
        settings.models.fallback_enabled = Some(true);
        changed = true;
    }

    if settings.routing.default_agent.is_none() {
        settings.routing.default_agent = Some(AgentSlug::General.as_str().to_string());
        changed = true;
    }

    changed
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if let Some(default_agent) = settings.routing.default_agent.as_deref() {
        if default_agent.parse::<AgentSlug>().is_err() {
            return Err(Error::Config(format!(
                "routing.default_agent '{}' is not a known agent slug",
                default_agent
            )));
        }
    }
    Ok(())
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Provider endpoint configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderModel {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Claude CLI configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ClaudeConfig {
    pub cli_path: Option<String>,
    pub model: Option<String>,
}

/// Models configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Models {
    /// Primary provider name. The relay always falls back through
    /// openrouter and ollama when this one fails.
    #[serde(default)]
    pub provider: String,

    /// Whether provider fallback is enabled. Defaults to true.
    pub fallback_enabled: Option<bool>,

    #[serde(default)]
    pub claude: ClaudeConfig,

    #[serde(default)]
    pub openrouter: ProviderModel,

    #[serde(default)]
    pub ollama: ProviderModel,
}

impl Models {
    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled.unwrap_or(true)
    }
}

/// Database configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Database {
    /// Path to the SQLite file. Defaults to ~/.attache/attache.db.
    pub path: Option<PathBuf>,

    /// Disable persistence entirely. Every consumer degrades to a
    /// documented no-op when the store is absent.
    #[serde(default = "default_database_enabled")]
    pub enabled: bool,
}

fn default_database_enabled() -> bool {
    true
}

impl Default for Database {
    fn default() -> Self {
        Self {
            path: None,
            enabled: default_database_enabled(),
        }
    }
}

/// Routing configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Routing {
    pub default_agent: Option<String>,
}

/// Attache settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub models: Models,

    #[serde(default)]
    pub database: Database,

    #[serde(default)]
    pub routing: Routing,
}

impl Settings {
    /// Resolve the SQLite database path.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => Ok(get_home_dir()?.join("attache.db")),
        }
    }
}

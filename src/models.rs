//! Per-agent model configuration with a TTL read cache over the store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::providers::ProviderKind;
use crate::store::Store;

/// Cache refresh interval.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Routing preference for one agent: which provider and model serve it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelConfig {
    pub agent: String,
    pub provider: ProviderKind,
    pub model: String,
    pub enabled: bool,
}

struct CacheState {
    configs: HashMap<String, ModelConfig>,
    fetched_at: Option<Instant>,
}

/// Cached agent-to-model mapping. Reads tolerate staleness up to the TTL;
/// writes go through to the store and invalidate immediately.
pub struct ModelConfigStore {
    store: Option<Arc<Store>>,
    cache: RwLock<CacheState>,
    ttl: Duration,
}

impl ModelConfigStore {
    pub fn new(store: Option<Arc<Store>>) -> Self {
        Self::with_ttl(store, CACHE_TTL)
    }

    pub fn with_ttl(store: Option<Arc<Store>>, ttl: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(CacheState {
                configs: HashMap::new(),
                fetched_at: None,
            }),
            ttl,
        }
    }

    /// Look up the enabled config for an agent. `None` means "use the
    /// provider chain's defaults".
    pub fn get(&self, agent: &str) -> Option<ModelConfig> {
        self.refresh_if_stale();
        let cache = self.cache.read().ok()?;
        cache
            .configs
            .get(agent)
            .filter(|c| c.enabled)
            .cloned()
    }

    /// Write a config through to the store and invalidate the cache so the
    /// next read refetches instead of waiting out the TTL.
    pub fn set(&self, config: &ModelConfig) -> Result<(), crate::error::Error> {
        let Some(store) = &self.store else {
            return Err(crate::error::Error::Store(
                "model config store is not available".to_string(),
            ));
        };
        store.upsert_model_config(config)?;

        if let Ok(mut cache) = self.cache.write() {
            cache.fetched_at = None;
        }
        tracing::info!(
            "Model config updated: {} -> {}/{}",
            config.agent,
            config.provider,
            config.model
        );
        Ok(())
    }

    fn refresh_if_stale(&self) {
        let stale = match self.cache.read() {
            Ok(cache) => cache
                .fetched_at
                .map_or(true, |at| at.elapsed() >= self.ttl),
            Err(_) => return,
        };
        if !stale {
            return;
        }

        let Some(store) = &self.store else {
            // No store: mark fetched so we don't retry every read.
            if let Ok(mut cache) = self.cache.write() {
                cache.fetched_at = Some(Instant::now());
            }
            return;
        };

        match store.list_model_configs() {
            Ok(configs) => {
                if let Ok(mut cache) = self.cache.write() {
                    cache.configs = configs
                        .into_iter()
                        .map(|c| (c.agent.clone(), c))
                        .collect();
                    cache.fetched_at = Some(Instant::now());
                }
            }
            Err(e) => {
                tracing::warn!("Model config refresh failed: {}", e);
                // Keep serving the stale cache rather than erroring reads.
                if let Ok(mut cache) = self.cache.write() {
                    cache.fetched_at = Some(Instant::now());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store;
    use tempfile::TempDir;

    fn config(agent: &str, provider: ProviderKind) -> ModelConfig {
        ModelConfig {
            agent: agent.to_string(),
            provider,
            model: "test-model".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn write_through_invalidates_immediately() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        // Long TTL: only explicit invalidation can make the update visible.
        let configs = ModelConfigStore::with_ttl(Some(store), Duration::from_secs(3600));

        assert!(configs.get("research").is_none());

        configs
            .set(&config("research", ProviderKind::Ollama))
            .unwrap();
        let loaded = configs.get("research").unwrap();
        assert_eq!(loaded.provider, ProviderKind::Ollama);

        configs
            .set(&config("research", ProviderKind::Openrouter))
            .unwrap();
        assert_eq!(
            configs.get("research").unwrap().provider,
            ProviderKind::Openrouter
        );
    }

    #[test]
    fn disabled_configs_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = test_store(dir.path());
        let configs = ModelConfigStore::new(Some(store));

        let mut cfg = config("finance", ProviderKind::Claude);
        cfg.enabled = false;
        configs.set(&cfg).unwrap();
        assert!(configs.get("finance").is_none());
    }

    #[test]
    fn missing_store_reads_return_none_and_writes_error() {
        let configs = ModelConfigStore::new(None);
        assert!(configs.get("general").is_none());
        assert!(configs.set(&config("general", ProviderKind::Claude)).is_err());
    }
}

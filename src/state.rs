use std::{sync::Arc, time::Instant};

use crate::auth::AccountService;
use crate::config::AppConfig;
use crate::registry::{ConsulAgent, DiscoveryBackend, RegistryClient};
use crate::storage::{KvStore, RedisStore};

/// Shared, cheaply cloneable handles; no per-request mutable state lives here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountService>,
    pub registry: Arc<RegistryClient>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn init(config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let store = Arc::new(
            RedisStore::connect(&config.redis.url, config.redis.op_timeout).await?,
        ) as Arc<dyn KvStore>;

        let discovery = Arc::new(ConsulAgent::new(
            &config.consul.address,
            config.consul.token.clone(),
        )?) as Arc<dyn DiscoveryBackend>;

        Ok(Self::from_parts(config, store, discovery))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn KvStore>,
        discovery: Arc<dyn DiscoveryBackend>,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(store.clone())),
            registry: Arc::new(RegistryClient::new(discovery, store)),
            config,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
impl AppState {
    pub fn test_config(overrides: &[(&str, &str)]) -> AppConfig {
        let overrides: std::collections::HashMap<String, String> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| match key {
            "SERVICE_ID" if !overrides.contains_key(key) => Some("login-service-test".into()),
            _ => overrides.get(key).cloned(),
        })
        .expect("test config")
    }

    pub fn fake() -> Self {
        Self::fake_with_store(Arc::new(crate::storage::MemoryStore::new()))
    }

    pub fn fake_with_store(store: Arc<crate::storage::MemoryStore>) -> Self {
        Self::from_parts(
            Arc::new(Self::test_config(&[])),
            store,
            Arc::new(crate::registry::testing::StubDiscovery::ready()),
        )
    }
}

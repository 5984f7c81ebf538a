use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{
    consul::DiscoveryBackend,
    types::{RegistryError, ServiceRegistration},
};
use crate::storage::KvStore;

/// Lifecycle of this instance's discovery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    Unregistered,
    WaitingForBackend,
    /// Backend answered a liveness query; registration may proceed.
    BackendReady,
    Registered(ServiceRegistration),
    Deregistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

pub struct RegistryClient {
    backend: Arc<dyn DiscoveryBackend>,
    store: Arc<dyn KvStore>,
    state: RwLock<RegistryState>,
}

impl RegistryClient {
    pub fn new(backend: Arc<dyn DiscoveryBackend>, store: Arc<dyn KvStore>) -> Self {
        Self {
            backend,
            store,
            state: RwLock::new(RegistryState::Unregistered),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn state(&self) -> RegistryState {
        self.state.read().await.clone()
    }

    /// Polls the backend's liveness query up to `max_attempts` times, `interval` apart.
    /// Exhausting the attempts is fatal to startup.
    pub async fn wait_for_backend(
        &self,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<(), RegistryError> {
        {
            let mut state = self.state.write().await;
            match &*state {
                RegistryState::Unregistered
                | RegistryState::WaitingForBackend
                | RegistryState::BackendReady => *state = RegistryState::WaitingForBackend,
                other => return Err(RegistryError::InvalidState(other.clone())),
            }
        }

        for attempt in 1..=max_attempts {
            match self.backend.leader().await {
                Ok(leader) => {
                    info!(%leader, attempt, "discovery backend is available");
                    *self.state.write().await = RegistryState::BackendReady;
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "discovery backend not available");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        error!(max_attempts, "giving up on discovery backend");
        Err(RegistryError::BackendUnavailable {
            attempts: max_attempts,
        })
    }

    /// Registers this instance with its active health check. Only legal once the backend
    /// has answered and while no registration is active.
    pub async fn register(&self, registration: ServiceRegistration) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        match &*state {
            RegistryState::BackendReady => {}
            RegistryState::Registered(active) => {
                return Err(RegistryError::AlreadyRegistered(active.instance_id.clone()))
            }
            _ => return Err(RegistryError::NotReady),
        }

        self.backend.register(&registration).await.map_err(|e| {
            error!(instance_id = %registration.instance_id, error = %e, "registration failed");
            e
        })?;

        info!(
            service = %registration.service_name,
            instance_id = %registration.instance_id,
            health_check = %registration.health_check_url(),
            "service registered"
        );
        *state = RegistryState::Registered(registration);
        Ok(())
    }

    pub async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        self.backend.deregister(instance_id).await?;
        info!(instance_id, "service deregistered");
        if matches!(&*state, RegistryState::Registered(r) if r.instance_id == instance_id) {
            *state = RegistryState::Deregistered;
        }
        Ok(())
    }

    /// Shutdown path: bounded by `timeout`, failures are logged and swallowed.
    pub async fn deregister_best_effort(&self, instance_id: &str, timeout: Duration) {
        match tokio::time::timeout(timeout, self.deregister(instance_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(instance_id, error = %e, "failed to deregister"),
            Err(_) => error!(instance_id, timeout_secs = timeout.as_secs(), "deregistration timed out"),
        }
    }

    /// Reachability of the key-value backend; what the catalog's HTTP check ends up calling.
    pub async fn health_check(&self) -> HealthStatus {
        match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = %e, "key-value backend unreachable");
                HealthStatus::Unhealthy(e.to_string())
            }
        }
    }
}

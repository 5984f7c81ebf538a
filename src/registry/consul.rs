use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::types::{AgentServiceRegistration, RegistryError, ServiceRegistration};

/// Per-request timeout against the agent API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The catalog operations the registry lifecycle needs.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Cheap liveness query; returns the current leader's address.
    async fn leader(&self) -> Result<String, RegistryError>;
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), RegistryError>;
    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError>;
}

/// Consul agent HTTP API client.
pub struct ConsulAgent {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulAgent {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.header("X-Consul-Token", token),
            None => builder,
        }
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, RegistryError> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::HttpStatus(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulAgent {
    async fn leader(&self) -> Result<String, RegistryError> {
        let response = Self::send(self.request(reqwest::Method::GET, "/v1/status/leader")).await?;
        let leader: String = response.json().await?;
        if leader.is_empty() {
            return Err(RegistryError::NoLeader);
        }
        Ok(leader)
    }

    async fn register(&self, registration: &ServiceRegistration) -> Result<(), RegistryError> {
        let body = AgentServiceRegistration::from(registration);
        debug!(instance_id = %registration.instance_id, "submitting registration");
        Self::send(
            self.request(reqwest::Method::PUT, "/v1/agent/service/register")
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<(), RegistryError> {
        let path = format!("/v1/agent/service/deregister/{instance_id}");
        Self::send(self.request(reqwest::Method::PUT, &path)).await?;
        Ok(())
    }
}

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::client::RegistryState;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("discovery backend not available after {attempts} attempts")]
    BackendUnavailable { attempts: u32 },
    #[error("discovery backend has not been confirmed reachable")]
    NotReady,
    #[error("instance {0} is already registered")]
    AlreadyRegistered(String),
    #[error("no registry transition from {0:?}")]
    InvalidState(RegistryState),
    #[error("discovery backend has no elected leader")]
    NoLeader,
    #[error("discovery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("discovery backend returned HTTP {0}")]
    HttpStatus(u16),
}

/// How the catalog probes this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    /// Continuous failing time after which the catalog drops the instance.
    pub deregister_after: Duration,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            deregister_after: Duration::from_secs(30),
        }
    }
}

/// This instance's discovery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub service_name: String,
    pub instance_id: String,
    pub address: String,
    pub port: u16,
    pub health_check_path: String,
    pub tags: Vec<String>,
    pub check: CheckPolicy,
}

impl ServiceRegistration {
    pub fn health_check_url(&self) -> String {
        format!("http://{}:{}{}", self.address, self.port, self.health_check_path)
    }
}

/// Wire shape of `PUT /v1/agent/service/register`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    pub id: &'a str,
    pub name: &'a str,
    pub address: &'a str,
    pub port: u16,
    pub tags: &'a [String],
    pub check: AgentServiceCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentServiceCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub interval: String,
    pub timeout: String,
    pub deregister_critical_service_after: String,
}

impl<'a> From<&'a ServiceRegistration> for AgentServiceRegistration<'a> {
    fn from(reg: &'a ServiceRegistration) -> Self {
        Self {
            id: &reg.instance_id,
            name: &reg.service_name,
            address: &reg.address,
            port: reg.port,
            tags: &reg.tags,
            check: AgentServiceCheck {
                http: reg.health_check_url(),
                interval: duration_string(reg.check.interval),
                timeout: duration_string(reg.check.timeout),
                deregister_critical_service_after: duration_string(reg.check.deregister_after),
            },
        }
    }
}

/// Catalog duration syntax: `10s`, or `250ms` below whole seconds.
fn duration_string(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

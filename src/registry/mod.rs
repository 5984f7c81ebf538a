//! Service-discovery registration: waiting for the catalog at startup, registering this
//! instance with an active HTTP health check, and deregistering on shutdown.

mod client;
mod consul;
mod types;

pub use client::{HealthStatus, RegistryClient};
pub use consul::{ConsulAgent, DiscoveryBackend};
pub use types::{CheckPolicy, ServiceRegistration};

#[cfg(test)]
pub use client::RegistryState;
#[cfg(test)]
pub use types::RegistryError;

#[cfg(test)]
pub use client::testing;

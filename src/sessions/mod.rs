use std::time::Duration;

pub mod repo;
mod repo_types;

pub use repo::SessionRepo;

/// Lifetime of a session issued by a successful login.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

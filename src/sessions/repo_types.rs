use std::time::Duration;

use time::OffsetDateTime;

/// An issued login session as written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(test), allow(dead_code))]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: OffsetDateTime,
    pub ttl: Duration,
}

use serde::Serialize;
use time::OffsetDateTime;

/// User record in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,                 // 32 hex chars, never reused
    pub username: String,           // unique, indexed by username:<name>
    pub password_hash: String,      // Argon2 PHC string, never leaves the account service
    pub email: String,
    pub created_at: OffsetDateTime, // UTC
    pub updated_at: OffsetDateTime, // UTC
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

use std::{sync::Arc, time::Duration};

use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use super::repo_types::Session;
use crate::{error::StoreError, storage::KvStore};

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

/// `session:<token>` hashes holding `user_id` and `created`, expired by the backend.
#[derive(Clone)]
pub struct SessionRepo {
    kv: Arc<dyn KvStore>,
}

impl SessionRepo {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Writes the session and arms its expiry in the same atomic step.
    pub async fn create_session(
        &self,
        token: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Session, StoreError> {
        let created_at = OffsetDateTime::now_utc();
        let created = created_at
            .format(&Rfc3339)
            .map_err(|e| StoreError::Backend {
                op: "create_session",
                reason: e.to_string(),
            })?;

        self.kv
            .hset_all(
                &session_key(token),
                &[("user_id", user_id.to_string()), ("created", created)],
                Some(ttl),
            )
            .await?;
        debug!(user_id, ttl_secs = ttl.as_secs(), "session stored");

        Ok(Session {
            token: token.to_string(),
            user_id: user_id.to_string(),
            created_at,
            ttl,
        })
    }

    /// Resolves a token to its user id. Unknown and expired tokens are both `NotFound`.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn get_session(&self, token: &str) -> Result<String, StoreError> {
        self.kv
            .hget(&session_key(token), "user_id")
            .await?
            .filter(|id| !id.is_empty())
            .ok_or(StoreError::NotFound)
    }

    /// Idempotent: deleting an absent session is not an error.
    pub async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        let removed = self.kv.del(&session_key(token)).await?;
        debug!(removed, "session delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn repo() -> (Arc<MemoryStore>, SessionRepo) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), SessionRepo::new(store))
    }

    #[tokio::test]
    async fn created_session_resolves_to_its_user() {
        let (store, sessions) = repo();
        let session = sessions
            .create_session("tok", "user-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(session.user_id, "user-1");
        assert!(store.contains("session:tok"));
        assert_eq!(sessions.get_session("tok").await.unwrap(), "user-1");
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (_, sessions) = repo();
        let err = sessions.get_session("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn expired_session_is_not_found() {
        let (_, sessions) = repo();
        sessions
            .create_session("short", "user-1", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sessions.get_session("short").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_, sessions) = repo();
        sessions
            .create_session("tok", "user-1", Duration::from_secs(60))
            .await
            .unwrap();

        sessions.delete_session("tok").await.unwrap();
        assert!(sessions.get_session("tok").await.unwrap_err().is_not_found());
        sessions.delete_session("tok").await.unwrap();
        sessions.delete_session("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn backend_outage_is_unavailable_not_missing() {
        let (store, sessions) = repo();
        store.set_unreachable(true);
        let err = sessions.get_session("tok").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}

use std::{collections::HashMap, future::Future, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::StoreError;

/// Primitives the user and session stores are built on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Writes every field of a hash in one atomic step, optionally arming a passive expiry.
    async fn hset_all(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;
    /// Empty map when the key is absent.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Set-if-absent. Returns `false` when the key already held a value.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;
    /// Returns whether a key was removed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("parse redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connect to redis")?;
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        bounded_call(op, self.op_timeout, fut).await
    }
}

/// Runs one backend call under `limit`; expiry is `Unavailable`, never retried.
async fn bounded_call<T, F>(op: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StoreError::from_redis(op, e)),
        Err(_) => {
            debug!(op, timeout_ms = limit.as_millis() as u64, "redis call timed out");
            Err(StoreError::Unavailable {
                op,
                reason: format!("timed out after {limit:?}"),
            })
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn hset_all(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (field, value) in fields {
            hset.arg(*field).arg(value);
        }

        let mut pipe = redis::pipe();
        pipe.atomic().add_command(hset).ignore();
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            pipe.cmd("PEXPIRE").arg(key).arg(millis).ignore();
        }

        let mut conn = self.conn.clone();
        let () = self.bounded("hset_all", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        let fields = self
            .bounded("hget_all", redis::cmd("HGETALL").arg(key).query_async(&mut conn))
            .await?;
        Ok(fields)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = self
            .bounded(
                "hget",
                redis::cmd("HGET").arg(key).arg(field).query_async(&mut conn),
            )
            .await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value = self
            .bounded("get", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let () = self
            .bounded(
                "set",
                redis::cmd("SET").arg(key).arg(value).query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .bounded(
                "set_nx",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .bounded("del", redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_times_out_as_unavailable() {
        let never = std::future::pending::<redis::RedisResult<String>>();
        let err = bounded_call("get", Duration::from_millis(10), never)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { op: "get", .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn backend_errors_pass_through_classified() {
        let refused = async {
            Err::<(), _>(redis::RedisError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        };
        let err = bounded_call("ping", Duration::from_secs(1), refused)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { op: "ping", .. }));

        let ok = async { Ok::<_, redis::RedisError>(7i64) };
        assert_eq!(bounded_call("del", Duration::from_secs(1), ok).await.unwrap(), 7);
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

use thiserror::Error;

/// Failures surfaced by the key-value layer and the stores built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key absent or logically expired.
    #[error("not found")]
    NotFound,
    #[error("{op}: backend unavailable: {reason}")]
    Unavailable { op: &'static str, reason: String },
    #[error("{op}: backend error: {reason}")]
    Backend { op: &'static str, reason: String },
    #[error("{op}: malformed record: {reason}")]
    Corrupt { op: &'static str, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub(crate) fn from_redis(op: &'static str, err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StoreError::Unavailable {
                op,
                reason: err.to_string(),
            }
        } else {
            StoreError::Backend {
                op,
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_unavailable() {
        let err = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        let mapped = StoreError::from_redis("get", err);
        assert!(matches!(mapped, StoreError::Unavailable { op: "get", .. }));
    }

    #[test]
    fn type_errors_are_backend() {
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        let mapped = StoreError::from_redis("hget", err);
        assert!(matches!(mapped, StoreError::Backend { op: "hget", .. }));
        assert!(mapped.to_string().starts_with("hget: backend error"));
    }
}

use std::{collections::HashMap, sync::Arc};

use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};

use crate::{auth::repo_types::User, error::StoreError, storage::KvStore};

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn username_key(username: &str) -> String {
    format!("username:{username}")
}

/// User records under `user:<id>` plus the `username:<name>` → id index.
#[derive(Clone)]
pub struct UserRepo {
    kv: Arc<dyn KvStore>,
}

impl UserRepo {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Writes the full record. Username uniqueness is the index's job, see [`Self::claim_username`].
    pub async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let fields = [
            ("id", user.id.clone()),
            ("username", user.username.clone()),
            ("password", user.password_hash.clone()),
            ("email", user.email.clone()),
            ("created_at", format_ts("create_user", user.created_at)?),
            ("updated_at", format_ts("create_user", user.updated_at)?),
        ];
        self.kv.hset_all(&user_key(&user.id), &fields, None).await
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<User, StoreError> {
        let fields = self.kv.hget_all(&user_key(id)).await?;
        user_from_fields(fields)
    }

    /// A dangling index entry reads as `NotFound`.
    pub async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let id = self
            .kv
            .get(&username_key(username))
            .await?
            .ok_or(StoreError::NotFound)?;
        match self.get_user_by_id(&id).await {
            Err(e) if e.is_not_found() => {
                warn!(username, user_id = %id, "username index points at a missing user");
                Err(StoreError::NotFound)
            }
            other => other,
        }
    }

    /// Unconditional upsert of the index entry.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn set_username_index(&self, username: &str, id: &str) -> Result<(), StoreError> {
        self.kv.set(&username_key(username), id).await
    }

    /// Set-if-absent on the index entry. `false` means another id already owns the username.
    pub async fn claim_username(&self, username: &str, id: &str) -> Result<bool, StoreError> {
        self.kv.set_nx(&username_key(username), id).await
    }

    /// Removes the index entry (only while it still points at `id`) and then the record.
    /// Absent users are `NotFound` and cause no writes.
    pub async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        let user = self.get_user_by_id(id).await?;

        let index = username_key(&user.username);
        if self.kv.get(&index).await?.as_deref() == Some(id) {
            self.kv.del(&index).await?;
        } else {
            debug!(user_id = id, "username index owned by another user; leaving it");
        }

        self.kv.del(&user_key(id)).await?;
        Ok(())
    }
}

fn format_ts(op: &'static str, ts: OffsetDateTime) -> Result<String, StoreError> {
    ts.format(&Rfc3339).map_err(|e| StoreError::Backend {
        op,
        reason: e.to_string(),
    })
}

fn user_from_fields(mut fields: HashMap<String, String>) -> Result<User, StoreError> {
    if fields.is_empty() {
        return Err(StoreError::NotFound);
    }

    let mut take = |name: &str| {
        fields.remove(name).ok_or_else(|| StoreError::Corrupt {
            op: "get_user",
            reason: format!("missing field {name}"),
        })
    };
    let id = take("id")?;
    let username = take("username")?;
    let password_hash = take("password")?;
    let email = take("email")?;
    let created_at = take("created_at")?;
    let updated_at = take("updated_at")?;

    Ok(User {
        id,
        username,
        password_hash,
        email,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_ts(value: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| StoreError::Corrupt {
        op: "get_user",
        reason: format!("bad timestamp {value:?}: {e}"),
    })
}

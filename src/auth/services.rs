use std::{sync::Arc, time::Duration};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        repo::UserRepo,
        repo_types::{PublicUser, User},
        tokens::{new_session_token, new_user_id},
    },
    error::StoreError,
    sessions::{SessionRepo, SESSION_TTL},
    storage::KvStore,
};

const CREATE_FAILED: &str = "failed to create user";
const AUTH_FAILED: &str = "authentication failed";

/// Caller-facing outcomes. Internal detail is logged, never carried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("user already exists")]
    Conflict,
    /// Unknown user and wrong password are deliberately the same value.
    #[error("invalid credentials")]
    Unauthorized,
    #[error("{0}")]
    Failed(&'static str),
}

/// Result of a successful login. The user view carries no credential material.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: String,
    pub user: PublicUser,
}

pub struct AccountService {
    users: UserRepo,
    sessions: SessionRepo,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            users: UserRepo::new(kv.clone()),
            sessions: SessionRepo::new(kv),
            session_ttl: SESSION_TTL,
        }
    }

    #[cfg(test)]
    fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Creates a user and returns its id.
    ///
    /// The username index is claimed with set-if-absent after the record is written, so two
    /// concurrent signups for one name cannot both win; the loser's record is rolled back and
    /// it sees `Conflict`.
    #[instrument(skip(self, password, email))]
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<String, AccountError> {
        match self.users.get_user_by_username(username).await {
            Ok(_) => {
                warn!("user already exists");
                return Err(AccountError::Conflict);
            }
            Err(StoreError::NotFound) => {}
            Err(e) => {
                error!(error = %e, "username lookup failed");
                return Err(AccountError::Failed(CREATE_FAILED));
            }
        }

        let password_hash = hash_password_blocking(password.to_string())
            .await
            .map_err(|e| {
                error!(error = %e, "hash_password failed");
                AccountError::Failed(CREATE_FAILED)
            })?;

        let id = new_user_id().map_err(|e| {
            error!(error = %e, "user id generation failed");
            AccountError::Failed(CREATE_FAILED)
        })?;

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: id.clone(),
            username: username.to_string(),
            password_hash,
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.users.create_user(&user).await {
            error!(error = %e, user_id = %id, "create user failed");
            return Err(AccountError::Failed(CREATE_FAILED));
        }

        match self.users.claim_username(username, &id).await {
            Ok(true) => {
                info!(user_id = %id, "user created");
                Ok(id)
            }
            Ok(false) => {
                warn!(user_id = %id, "lost username race; rolling back");
                self.roll_back(&id).await;
                Err(AccountError::Conflict)
            }
            Err(e) => {
                error!(error = %e, user_id = %id, "username index write failed; rolling back");
                self.roll_back(&id).await;
                Err(AccountError::Failed(CREATE_FAILED))
            }
        }
    }

    /// Best effort. A failed rollback leaves an orphaned record that nothing indexes.
    async fn roll_back(&self, id: &str) {
        if let Err(e) = self.users.delete_user(id).await {
            error!(error = %e, user_id = id, "rollback failed; orphaned user record left behind");
        }
    }

    /// Verifies credentials and issues a 24h session token.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Authenticated, AccountError> {
        let user = match self.users.get_user_by_username(username).await {
            Ok(u) => u,
            Err(StoreError::NotFound) => {
                warn!("login unknown username");
                return Err(AccountError::Unauthorized);
            }
            Err(e) => {
                error!(error = %e, "user lookup failed");
                return Err(AccountError::Failed(AUTH_FAILED));
            }
        };

        let ok = verify_password_blocking(password.to_string(), user.password_hash.clone())
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "verify_password failed");
                AccountError::Failed(AUTH_FAILED)
            })?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::Unauthorized);
        }

        let token = new_session_token().map_err(|e| {
            error!(error = %e, "session token generation failed");
            AccountError::Failed(AUTH_FAILED)
        })?;

        if let Err(e) = self
            .sessions
            .create_session(&token, &user.id, self.session_ttl)
            .await
        {
            error!(error = %e, user_id = %user.id, "create session failed");
            return Err(AccountError::Failed(AUTH_FAILED));
        }

        info!(user_id = %user.id, "user logged in");
        Ok(Authenticated {
            token,
            user: PublicUser::from(user),
        })
    }

    /// Ends a session. Unknown or expired tokens are already logged out.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AccountError> {
        self.sessions.delete_session(token).await.map_err(|e| {
            error!(error = %e, "delete session failed");
            AccountError::Failed("logout failed")
        })
    }
}

//! Identity provider
//!
//! Credentials, registration and session lifecycle. The provider owns the
//! `users` and `sessions` tables; session tokens are JWTs whose `sid` claim
//! names a session row, so signing out takes effect immediately.

use crate::auth::{hash_password, verify_password, JwtManager};
use crate::bootstrap::Role;
use crate::config::AuthConfig;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// A live session resolved from a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Session created by a successful sign-in
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    #[serde(flatten)]
    pub session: ActiveSession,
}

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Registration {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 256))]
    pub password: String,

    /// Display name stored on the profile
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

/// Operations offered by the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a token to its session.
    ///
    /// `Ok(None)` when the session was signed out or has expired; malformed,
    /// forged or expired tokens are errors.
    async fn get_session(&self, token: &str) -> Result<Option<ActiveSession>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<IssuedSession>;

    /// Create the user and its client profile, returning the new user id
    async fn sign_up(&self, registration: Registration) -> Result<Uuid>;

    /// Revoke the session behind a token. Revoking a dead session is not an error.
    async fn sign_out(&self, token: &str) -> Result<()>;
}

/// Lower-case and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Postgres-backed identity provider
#[derive(Clone)]
pub struct DbIdentityProvider {
    repo: Repository,
    jwt: JwtManager,
    session_ttl: Duration,
    min_password_len: usize,
}

impl DbIdentityProvider {
    pub fn new(repo: Repository, jwt: JwtManager, config: &AuthConfig) -> Self {
        Self {
            repo,
            jwt,
            session_ttl: Duration::seconds(config.session_ttl_secs as i64),
            min_password_len: config.min_password_len,
        }
    }

    /// Remove the row behind a token whose JWT has expired
    async fn discard_expired(&self, token: &str) {
        let Ok(session_id) = self
            .jwt
            .decode_ignoring_expiry(token)
            .and_then(|claims| claims.session_id())
        else {
            return;
        };

        match self.repo.delete_session(session_id).await {
            Ok(removed) => tracing::debug!(session_id = %session_id, removed, "Expired session discarded"),
            Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Failed to discard expired session"),
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Blocking task failed: {}", e),
        })?
}

#[async_trait]
impl IdentityProvider for DbIdentityProvider {
    async fn get_session(&self, token: &str) -> Result<Option<ActiveSession>> {
        let claims = match self.jwt.validate_token(token) {
            Ok(claims) => claims,
            Err(AppError::ExpiredToken) => {
                self.discard_expired(token).await;
                return Err(AppError::ExpiredToken);
            }
            Err(e) => return Err(e),
        };
        let user_id = claims.user_id()?;
        let session_id = claims.session_id()?;

        let Some(session) = self.repo.find_session(session_id).await? else {
            return Ok(None);
        };

        if session.user_id != user_id {
            tracing::warn!(session_id = %session_id, "Token subject does not own session");
            return Err(AppError::InvalidToken);
        }

        if session.is_expired() {
            self.repo.delete_session(session_id).await?;
            return Ok(None);
        }

        self.repo.touch_session(session_id).await?;

        Ok(Some(ActiveSession {
            session_id,
            user_id,
            expires_at: session.expires_at.with_timezone(&Utc),
        }))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<IssuedSession> {
        let email = normalize_email(email);

        let Some(user) = self.repo.find_user_by_email(&email).await? else {
            metrics::record_sign_in(false);
            return Err(AppError::InvalidCredentials);
        };

        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let valid = run_blocking(move || verify_password(&password, &stored_hash)).await?;

        if !valid {
            metrics::record_sign_in(false);
            tracing::info!(user_id = %user.id, "Sign-in rejected");
            return Err(AppError::InvalidCredentials);
        }

        let purged = self.repo.delete_expired_sessions(user.id).await?;
        if purged > 0 {
            tracing::debug!(user_id = %user.id, purged, "Expired sessions removed");
        }

        let expires_at = Utc::now() + self.session_ttl;
        let session = self.repo.create_session(user.id, expires_at).await?;
        let token = self.jwt.issue(user.id, session.id, expires_at)?;

        metrics::record_sign_in(true);
        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            "Session created"
        );

        Ok(IssuedSession {
            token,
            session: ActiveSession {
                session_id: session.id,
                user_id: user.id,
                expires_at,
            },
        })
    }

    async fn sign_up(&self, registration: Registration) -> Result<Uuid> {
        registration.validate()?;

        if registration.password.chars().count() < self.min_password_len {
            return Err(AppError::Validation {
                message: format!(
                    "Password must be at least {} characters",
                    self.min_password_len
                ),
                field: Some("password".to_string()),
            });
        }

        let email = normalize_email(&registration.email);
        if self.repo.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail { email });
        }

        let password = registration.password;
        let password_hash = run_blocking(move || hash_password(&password)).await?;

        let user = self
            .repo
            .create_user_with_profile(
                email,
                password_hash,
                registration.name.trim().to_string(),
                Role::Client,
            )
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user.id)
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        let claims = match self.jwt.decode_ignoring_expiry(token) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::debug!("Sign-out with unreadable token ignored");
                return Ok(());
            }
        };

        let session_id = claims.session_id()?;
        let removed = self.repo.delete_session(session_id).await?;

        tracing::info!(session_id = %session_id, removed, "Signed out");
        Ok(())
    }
}

//! Session bootstrap and role-based access routing
//!
//! On entry the current session is resolved through the identity provider,
//! the caller's profile is looked up, and the caller is sent to the area
//! their role owns. Every ambiguous outcome fails closed: a profile lookup
//! error, a missing profile, or a role without an area forces sign-out and
//! lands on the login page.

use crate::auth::AuthContext;
use crate::db::models::Profile;
use crate::errors::{AppError, Result};
use crate::identity::IdentityProvider;
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Profile role attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Client,
    Restaurant,
    Courier,
}

impl Role {
    /// Parse the stored role text. Matching is exact; anything else is unrecognized.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            "restaurant" => Some(Role::Restaurant),
            "courier" => Some(Role::Courier),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Restaurant => "restaurant",
            Role::Courier => "courier",
        }
    }

    /// Area this role lands on after bootstrap.
    ///
    /// Restaurant and courier accounts have no area yet.
    pub fn home(&self) -> Option<Destination> {
        match self {
            Role::Admin => Some(Destination::AdminDashboard),
            Role::Client => Some(Destination::ClientDashboard),
            Role::Restaurant | Role::Courier => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the bootstrap sends the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Login,
    AdminDashboard,
    ClientDashboard,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::Login => "/login",
            Destination::AdminDashboard => "/admin/dashboard",
            Destination::ClientDashboard => "/client/dashboard",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Destination::Login => "login",
            Destination::AdminDashboard => "admin_dashboard",
            Destination::ClientDashboard => "client_dashboard",
        }
    }
}

/// Result of one bootstrap run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BootstrapOutcome {
    pub destination: Destination,

    /// The session was revoked on the way (fail-closed branch)
    pub signed_out: bool,
}

/// Read access to the profiles table
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profile row for a user, `None` when no row exists
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
}

/// Why access was revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevokeReason {
    LookupFailed,
    MissingProfile,
    UnrecognizedRole,
}

impl RevokeReason {
    fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::LookupFailed => "profile_lookup_failed",
            RevokeReason::MissingProfile => "profile_missing",
            RevokeReason::UnrecognizedRole => "role_unrecognized",
        }
    }
}

enum Resolution {
    NoSession(AppError),
    Granted(AuthContext),
    Revoked { user_id: Uuid },
}

async fn resolve(
    identity: &dyn IdentityProvider,
    profiles: &dyn ProfileStore,
    token: Option<&str>,
) -> Resolution {
    let Some(token) = token else {
        return Resolution::NoSession(AppError::Unauthorized {
            message: "No active session".to_string(),
        });
    };

    let session = match identity.get_session(token).await {
        Ok(Some(session)) => session,
        Ok(None) => return Resolution::NoSession(AppError::SessionExpired),
        Err(e) => return Resolution::NoSession(e),
    };

    let reason = match profiles.find_profile(session.user_id).await {
        Ok(Some(profile)) => {
            match profile.role.as_deref().and_then(Role::parse) {
                Some(role) if role.home().is_some() => {
                    return Resolution::Granted(AuthContext {
                        user_id: session.user_id,
                        session_id: session.session_id,
                        role,
                    });
                }
                _ => {
                    tracing::warn!(
                        user_id = %session.user_id,
                        role = ?profile.role,
                        "Profile role has no area"
                    );
                    RevokeReason::UnrecognizedRole
                }
            }
        }
        Ok(None) => {
            tracing::warn!(user_id = %session.user_id, "Session has no profile row");
            RevokeReason::MissingProfile
        }
        Err(e) => {
            tracing::error!(
                user_id = %session.user_id,
                error = %e,
                "Profile lookup failed"
            );
            RevokeReason::LookupFailed
        }
    };

    if let Err(e) = identity.sign_out(token).await {
        tracing::error!(
            user_id = %session.user_id,
            error = %e,
            "Forced sign-out failed"
        );
    }

    tracing::info!(
        user_id = %session.user_id,
        reason = reason.as_str(),
        "Session revoked"
    );

    Resolution::Revoked {
        user_id: session.user_id,
    }
}

/// Resolve the session and pick the landing area for it.
///
/// Never fails: every error path ends at [`Destination::Login`].
pub async fn bootstrap(
    identity: &dyn IdentityProvider,
    profiles: &dyn ProfileStore,
    token: Option<&str>,
) -> BootstrapOutcome {
    let outcome = match resolve(identity, profiles, token).await {
        Resolution::Granted(ctx) => BootstrapOutcome {
            destination: ctx.role.home().unwrap_or(Destination::Login),
            signed_out: false,
        },
        Resolution::NoSession(e) => {
            tracing::debug!(error = %e, "Bootstrap without session");
            BootstrapOutcome {
                destination: Destination::Login,
                signed_out: false,
            }
        }
        Resolution::Revoked { .. } => BootstrapOutcome {
            destination: Destination::Login,
            signed_out: true,
        },
    };

    metrics::record_bootstrap(outcome.destination.label(), outcome.signed_out);
    outcome
}

/// Authenticate a request with the same rules as [`bootstrap`].
pub async fn authorize(
    identity: &dyn IdentityProvider,
    profiles: &dyn ProfileStore,
    token: Option<&str>,
) -> Result<AuthContext> {
    match resolve(identity, profiles, token).await {
        Resolution::Granted(ctx) => Ok(ctx),
        Resolution::NoSession(e) => Err(e),
        Resolution::Revoked { user_id, .. } => Err(AppError::ProfileUnavailable {
            user_id: user_id.to_string(),
        }),
    }
}

/// Identity provider and profile store bundled for request handling
#[derive(Clone)]
pub struct AccessControl {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    cookie_name: String,
}

impl AccessControl {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            profiles,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub async fn bootstrap(&self, token: Option<&str>) -> BootstrapOutcome {
        bootstrap(self.identity.as_ref(), self.profiles.as_ref(), token).await
    }

    pub async fn authorize(&self, token: Option<&str>) -> Result<AuthContext> {
        authorize(self.identity.as_ref(), self.profiles.as_ref(), token).await
    }
}

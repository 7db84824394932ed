//! Identity and bootstrap API handlers

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use fooddrop_common::{
    auth::session_token,
    bootstrap::{BootstrapOutcome, Destination},
    errors::{AppError, Result},
    identity::{ActiveSession, IssuedSession, Registration},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub destination: Destination,
    pub path: &'static str,
    pub signed_out: bool,
}

impl From<BootstrapOutcome> for BootstrapResponse {
    fn from(outcome: BootstrapOutcome) -> Self {
        Self {
            destination: outcome.destination,
            path: outcome.destination.path(),
            signed_out: outcome.signed_out,
        }
    }
}

fn require_token(state: &AppState, headers: &HeaderMap) -> Result<String> {
    session_token(headers, state.cookie_name()).ok_or_else(|| AppError::Unauthorized {
        message: "Missing session token".to_string(),
    })
}

/// Register a client account and sign it in
pub async fn sign_up(
    State(state): State<AppState>,
    Json(registration): Json<Registration>,
) -> Result<(StatusCode, Json<IssuedSession>)> {
    let identity = state.access.identity();
    let email = registration.email.clone();
    let password = registration.password.clone();

    let user_id = identity.sign_up(registration).await?;
    let issued = identity.sign_in_with_password(&email, &password).await?;

    info!(user_id = %user_id, "Account registered via API");

    Ok((StatusCode::CREATED, Json(issued)))
}

/// Exchange email and password for a session token
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<IssuedSession>> {
    let issued = state
        .access
        .identity()
        .sign_in_with_password(&request.email, &request.password)
        .await?;

    Ok(Json(issued))
}

/// Revoke the presented session
pub async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    let token = require_token(&state, &headers)?;
    state.access.identity().sign_out(&token).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Current session, without role resolution
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ActiveSession>> {
    let token = require_token(&state, &headers)?;

    match state.access.identity().get_session(&token).await? {
        Some(session) => Ok(Json(session)),
        None => Err(AppError::SessionExpired),
    }
}

/// Run the entry bootstrap and report where the caller belongs
pub async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<BootstrapResponse> {
    let token = session_token(&headers, state.cookie_name());
    let outcome = state.access.bootstrap(token.as_deref()).await;

    Json(outcome.into())
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::testing::{body_text, json_request, state_with, TestState};
    use axum::http::StatusCode;
    use fooddrop_common::identity::testing::{profile, FakeIdentity, FakeProfiles};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_bootstrap_reports_destination() {
        let user = Uuid::new_v4();
        let TestState { state, .. } = state_with(
            FakeIdentity::default().with_session("tok", user),
            FakeProfiles::default().with(profile(user, Some("client"))),
        );

        let response = create_router(state)
            .oneshot(json_request("GET", "/api/v1/bootstrap", Some("tok"), Value::Null))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["destination"], "client_dashboard");
        assert_eq!(body["path"], "/client/dashboard");
        assert_eq!(body["signed_out"], false);
    }

    #[tokio::test]
    async fn test_bootstrap_revokes_on_profile_error() {
        let user = Uuid::new_v4();
        let TestState { state, identity } = state_with(
            FakeIdentity::default().with_session("tok", user),
            FakeProfiles::default().failing(),
        );

        let response = create_router(state)
            .oneshot(json_request("GET", "/api/v1/bootstrap", Some("tok"), Value::Null))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["destination"], "login");
        assert_eq!(body["signed_out"], true);
        assert_eq!(identity.signed_out(), vec!["tok".to_string()]);
        assert!(!identity.is_live("tok"));
    }

    #[tokio::test]
    async fn test_sign_up_returns_live_session() {
        let TestState { state, identity } = state_with(FakeIdentity::default(), FakeProfiles::default());

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/sign-up",
                None,
                json!({"email": "bea@example.com", "password": "secret1", "name": "Bea"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        let token = body["token"].as_str().unwrap();
        assert!(identity.is_live(token));
        assert_eq!(
            body["user_id"],
            identity.account("bea@example.com").unwrap().to_string()
        );
    }

    #[tokio::test]
    async fn test_sign_up_duplicate_email() {
        let TestState { state, .. } = state_with(
            FakeIdentity::default().with_account("bea@example.com", "secret1", Uuid::new_v4()),
            FakeProfiles::default(),
        );

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/sign-up",
                None,
                json!({"email": "bea@example.com", "password": "secret1", "name": "Bea"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "DUPLICATE_EMAIL");
    }

    #[tokio::test]
    async fn test_sign_in_rejected() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/sign-in",
                None,
                json!({"email": "ana@example.com", "password": "wrong-password"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_session_requires_token() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());

        let response = create_router(state)
            .oneshot(json_request("GET", "/api/v1/auth/session", None, Value::Null))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_and_sign_out() {
        let user = Uuid::new_v4();
        let TestState { state, identity } = state_with(
            FakeIdentity::default().with_session("tok", user),
            FakeProfiles::default(),
        );
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(json_request("GET", "/api/v1/auth/session", Some("tok"), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["user_id"], user.to_string());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/auth/sign-out", Some("tok"), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!identity.is_live("tok"));

        let response = app
            .oneshot(json_request("GET", "/api/v1/auth/session", Some("tok"), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

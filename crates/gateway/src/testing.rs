//! Router test fixtures

use crate::AppState;
use axum::body::Body;
use axum::http::{header, Request, Response};
use fooddrop_common::identity::testing::{FakeIdentity, FakeProfiles};
use fooddrop_common::{AccessControl, AppConfig, DbPool};
use sea_orm::{DatabaseBackend, MockDatabase};
use std::sync::Arc;

pub const COOKIE: &str = "fd_session";

pub struct TestState {
    pub state: AppState,
    pub identity: Arc<FakeIdentity>,
}

/// State backed by in-memory identity and an empty mock database
pub fn state_with(identity: FakeIdentity, profiles: FakeProfiles) -> TestState {
    state_with_db(identity, profiles, MockDatabase::new(DatabaseBackend::Postgres))
}

pub fn state_with_db(identity: FakeIdentity, profiles: FakeProfiles, db: MockDatabase) -> TestState {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.observability.metrics_port = 0;

    let identity = Arc::new(identity);
    let access = AccessControl::new(identity.clone(), Arc::new(profiles), COOKIE);

    TestState {
        state: AppState {
            config: Arc::new(config),
            db: DbPool::from_connection(db.into_connection()),
            access,
        },
        identity,
    }
}

pub fn get_with_cookie(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("{}={}", COOKIE, token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(path: &str, token: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::post(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("{}={}", COOKIE, token));
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

pub fn json_request(method: &str, path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `Set-Cookie` header value, if any
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

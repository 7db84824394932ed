//! FoodDrop Gateway
//!
//! The single entry point for browsers and API clients.
//! Handles:
//! - Session bootstrap and role-based routing
//! - Server-rendered admin and client areas
//! - JSON API for identity and restaurants
//! - Rate limiting on credential endpoints
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
#[cfg(test)]
mod testing;

use axum::{
    extract::{FromRef, Request},
    http::StatusCode,
    middleware::{from_fn, Next},
    routing::{delete, get, post},
    Router,
};
use fooddrop_common::{
    auth::JwtManager,
    config::AppConfig,
    db::DbPool,
    metrics::{self, LATENCY_BUCKETS},
    AccessControl, DbIdentityProvider, Repository,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub access: AccessControl,
}

impl FromRef<AppState> for AccessControl {
    fn from_ref(state: &AppState) -> Self {
        state.access.clone()
    }
}

impl AppState {
    pub fn repository(&self) -> Repository {
        Repository::new(self.db.clone())
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.auth.cookie_name
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting FoodDrop Gateway v{}",
        fooddrop_common::VERSION
    );

    let jwt_secret = config.jwt_secret().map_err(|e| {
        tracing::error!(error = %e, "Refusing to start");
        e
    })?;

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port)))
            .set_buckets(LATENCY_BUCKETS)?
            .install()?;
        info!(port = config.observability.metrics_port, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    // Wire identity and profiles
    let repo = Repository::new(db.clone());
    let identity = DbIdentityProvider::new(repo.clone(), JwtManager::new(jwt_secret), &config.auth);
    let access = AccessControl::new(
        Arc::new(identity),
        Arc::new(repo),
        config.auth.cookie_name.clone(),
    );

    let state = AppState {
        config: config.clone(),
        db,
        access,
    };

    let app = create_router(state);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stopping_tx.send(());
    });

    let shutdown_timeout = config.shutdown_timeout();
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            if stopping_rx.await.is_ok() {
                tokio::time::sleep(shutdown_timeout).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => warn!(timeout = ?shutdown_timeout, "Graceful shutdown timed out, dropping connections"),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Credential endpoints share one limiter
    let limiter = state
        .config
        .rate_limit
        .enabled
        .then(|| {
            create_rate_limiter(
                state.config.rate_limit.requests_per_second,
                state.config.rate_limit.burst,
            )
        });
    let limit = from_fn(move |request: Request, next: Next| {
        rate_limit_middleware(request, next, limiter.clone())
    });

    // JSON API
    let api_routes = Router::new()
        .route("/auth/sign-up", post(handlers::auth::sign_up).route_layer(limit.clone()))
        .route("/auth/sign-in", post(handlers::auth::sign_in).route_layer(limit.clone()))
        .route("/auth/sign-out", post(handlers::auth::sign_out))
        .route("/auth/session", get(handlers::auth::session))
        .route("/bootstrap", get(handlers::auth::bootstrap))
        .route(
            "/restaurants",
            get(handlers::restaurants::list_restaurants).post(handlers::restaurants::create_restaurant),
        )
        .route("/restaurants/{id}", delete(handlers::restaurants::delete_restaurant));

    // Server-rendered pages
    let page_routes = Router::new()
        .route("/", get(handlers::pages::index))
        .route(
            "/login",
            get(handlers::pages::login_page)
                .merge(post(handlers::pages::login_submit).route_layer(limit.clone())),
        )
        .route("/register", post(handlers::pages::register_submit).route_layer(limit))
        .route("/logout", post(handlers::pages::logout))
        .route("/admin/dashboard", get(handlers::pages::admin_dashboard))
        .route(
            "/admin/restaurants",
            get(handlers::pages::admin_restaurants).post(handlers::pages::create_restaurant),
        )
        .route(
            "/admin/restaurants/{id}/delete",
            get(handlers::pages::confirm_delete).post(handlers::pages::delete_restaurant),
        )
        .route("/client/dashboard", get(handlers::pages::client_dashboard));

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(page_routes)
        .nest("/api/v1", api_routes)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{body_text, get_with_cookie, state_with, TestState};
    use axum::http::header;
    use fooddrop_common::identity::testing::{profile, FakeIdentity, FakeProfiles};
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_health() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());
        let response = create_router(state)
            .oneshot(get_with_cookie("/health", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("healthy"));
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());
        let response = create_router(state)
            .oneshot(get_with_cookie("/health", None))
            .await
            .unwrap();

        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_request_id_kept_from_caller() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());
        let request = axum::http::Request::get("/health")
            .header("x-request-id", "caller-supplied-id")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = create_router(state).oneshot(request).await.unwrap();

        assert_eq!(response.headers()["x-request-id"], "caller-supplied-id");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());
        let response = create_router(state)
            .oneshot(get_with_cookie("/nope", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bootstrap_routes_by_role() {
        let admin = Uuid::new_v4();
        let client = Uuid::new_v4();
        let TestState { state, .. } = state_with(
            FakeIdentity::default()
                .with_session("admin-token", admin)
                .with_session("client-token", client),
            FakeProfiles::default()
                .with(profile(admin, Some("admin")))
                .with(profile(client, Some("client"))),
        );
        let app = create_router(state);

        let response = app.clone().oneshot(get_with_cookie("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let response = app
            .clone()
            .oneshot(get_with_cookie("/", Some("admin-token")))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/admin/dashboard");

        let response = app
            .oneshot(get_with_cookie("/", Some("client-token")))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::LOCATION], "/client/dashboard");
    }
}

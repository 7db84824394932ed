//! Server-rendered pages.
//!
//! Each handler resolves access, builds view types and renders an Askama
//! template. Page guards never answer with JSON errors: a missing or revoked
//! session redirects to the login page with the cookie cleared, and a role
//! mismatch goes back through the bootstrap at `/`.

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    Form,
};
use fooddrop_common::{
    auth::{clear_session_cookie, session_cookie, session_token, AuthContext},
    bootstrap::{Destination, Role},
    db::models::Restaurant,
    errors::{AppError, Result},
    identity::Registration,
    restaurants::{format_fee, RestaurantInput},
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::restaurants::{create_owned, delete_confirmed};
use crate::AppState;

const RESTAURANTS_PATH: &str = "/admin/restaurants";

fn render<T: Template>(tmpl: T) -> Result<Html<String>> {
    tmpl.render().map(Html).map_err(|e| AppError::Internal {
        message: format!("Template error: {}", e),
    })
}

fn redirect_with_cookie(cookie: String, to: &str) -> Response {
    (AppendHeaders([(header::SET_COOKIE, cookie)]), Redirect::to(to)).into_response()
}

fn to_login(state: &AppState) -> Response {
    redirect_with_cookie(clear_session_cookie(state.cookie_name()), Destination::Login.path())
}

/// Session cookie for a fresh token, then back through the bootstrap
fn signed_in(state: &AppState, token: &str) -> Response {
    let cookie = session_cookie(
        state.cookie_name(),
        token,
        state.config.auth.session_ttl_secs,
        state.config.auth.cookie_secure,
    );
    redirect_with_cookie(cookie, "/")
}

// ── Error page ──────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    status: u16,
    message: String,
}

fn error_page(e: AppError) -> Response {
    let status = e.status_code();
    if e.is_server_error() {
        tracing::error!(error = %e, "Page request failed");
    }

    match render(ErrorTemplate {
        status: status.as_u16(),
        message: e.user_message(),
    }) {
        Ok(html) => (status, html).into_response(),
        Err(_) => e.into_response(),
    }
}

// ── Guard ───────────────────────────────────────────────────────

/// Require a resolved session holding `role`
fn guard(
    state: &AppState,
    auth: std::result::Result<AuthContext, AppError>,
    role: Role,
) -> std::result::Result<AuthContext, Response> {
    match auth {
        Ok(ctx) if ctx.role == role => Ok(ctx),
        Ok(ctx) => {
            debug!(user_id = %ctx.user_id, role = %ctx.role, required = %role, "Role mismatch, re-running bootstrap");
            Err(Redirect::to("/").into_response())
        }
        Err(e) => {
            if e.is_server_error() {
                warn!(error = %e, "Access check failed");
            }
            Err(to_login(state))
        }
    }
}

// ── Views ───────────────────────────────────────────────────────

struct RestaurantView {
    id: String,
    name: String,
    category: String,
    image_url: String,
    delivery_fee: String,
    delivery_time_minutes: i32,
    created_on: String,
}

impl From<Restaurant> for RestaurantView {
    fn from(r: Restaurant) -> Self {
        Self {
            id: r.id.to_string(),
            delivery_fee: format_fee(r.delivery_fee_cents),
            created_on: r.created_at.format("%Y-%m-%d").to_string(),
            name: r.name,
            category: r.category,
            image_url: r.image_url.unwrap_or_default(),
            delivery_time_minutes: r.delivery_time_minutes,
        }
    }
}

/// Form values echoed back after a rejected submission
#[derive(Default)]
struct RestaurantFormView {
    name: String,
    category: String,
    image_url: String,
    delivery_fee: String,
    delivery_time_minutes: String,
}

impl From<&RestaurantInput> for RestaurantFormView {
    fn from(input: &RestaurantInput) -> Self {
        Self {
            name: input.name.clone(),
            category: input.category.clone(),
            image_url: input.image_url.clone().unwrap_or_default(),
            delivery_fee: input.delivery_fee.clone(),
            delivery_time_minutes: input.delivery_time_minutes.clone(),
        }
    }
}

// ── Entry ───────────────────────────────────────────────────────

/// Entry point: send the caller to the area their role owns
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = session_token(&headers, state.cookie_name());
    let outcome = state.access.bootstrap(token.as_deref()).await;

    // A token that did not lead anywhere is stale; drop it from the browser
    if outcome.destination == Destination::Login && token.is_some() {
        return to_login(&state);
    }

    Redirect::to(outcome.destination.path()).into_response()
}

// ── Login & registration ────────────────────────────────────────

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    registering: bool,
    min_password_len: usize,
    error: String,
    email: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn login_form(
    state: &AppState,
    registering: bool,
    e: AppError,
    email: String,
    name: String,
) -> Response {
    if e.is_server_error() {
        tracing::error!(error = %e, "Credential request failed");
    }
    let status = e.status_code();

    match render(LoginTemplate {
        registering,
        min_password_len: state.config.auth.min_password_len,
        error: e.user_message(),
        email,
        name,
    }) {
        Ok(html) => (status, html).into_response(),
        Err(render_err) => error_page(render_err),
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let template = LoginTemplate {
        registering: query.mode.as_deref() == Some("register"),
        min_password_len: state.config.auth.min_password_len,
        error: String::new(),
        email: String::new(),
        name: String::new(),
    };

    match render(template) {
        Ok(html) => html.into_response(),
        Err(e) => error_page(e),
    }
}

pub async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state
        .access
        .identity()
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(issued) => signed_in(&state, &issued.token),
        Err(e) => login_form(&state, false, e, form.email, String::new()),
    }
}

/// Create a client account, then sign it straight in
pub async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Response {
    let identity = state.access.identity();
    let registration = Registration {
        email: form.email.clone(),
        password: form.password.clone(),
        name: form.name.trim().to_string(),
    };

    let result = match identity.sign_up(registration).await {
        Ok(user_id) => {
            info!(user_id = %user_id, "Account registered");
            identity.sign_in_with_password(&form.email, &form.password).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(issued) => signed_in(&state, &issued.token),
        Err(e) => login_form(&state, true, e, form.email, form.name),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers, state.cookie_name()) {
        if let Err(e) = state.access.identity().sign_out(&token).await {
            warn!(error = %e, "Sign-out failed, clearing cookie anyway");
        }
    }

    to_login(&state)
}

// ── Admin area ──────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "admin_dashboard.html")]
struct AdminDashboardTemplate {
    active_page: &'static str,
    restaurant_count: usize,
    latest: Vec<RestaurantView>,
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
) -> Response {
    if let Err(redirect) = guard(&state, auth, Role::Admin) {
        return redirect;
    }

    let restaurants = match state.repository().list_restaurants().await {
        Ok(restaurants) => restaurants,
        Err(e) => return error_page(e),
    };

    let restaurant_count = restaurants.len();
    let latest = restaurants.into_iter().take(5).map(Into::into).collect();

    match render(AdminDashboardTemplate {
        active_page: "dashboard",
        restaurant_count,
        latest,
    }) {
        Ok(html) => html.into_response(),
        Err(e) => error_page(e),
    }
}

#[derive(Template)]
#[template(path = "admin_restaurants.html")]
struct AdminRestaurantsTemplate {
    active_page: &'static str,
    notice: String,
    error: String,
    form: RestaurantFormView,
    restaurants: Vec<RestaurantView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

fn notice_text(key: Option<&str>) -> &'static str {
    match key {
        Some("created") => "Restaurant created.",
        Some("deleted") => "Restaurant deleted.",
        Some("not_found") => "That restaurant no longer exists.",
        _ => "",
    }
}

async fn restaurants_page(
    state: &AppState,
    notice: &str,
    error: Option<AppError>,
    form: RestaurantFormView,
) -> Response {
    let restaurants = match state.repository().list_restaurants().await {
        Ok(restaurants) => restaurants,
        Err(e) => return error_page(e),
    };

    let status = error
        .as_ref()
        .map(AppError::status_code)
        .unwrap_or(StatusCode::OK);

    match render(AdminRestaurantsTemplate {
        active_page: "restaurants",
        notice: notice.to_string(),
        error: error.map(|e| e.user_message()).unwrap_or_default(),
        form,
        restaurants: restaurants.into_iter().map(Into::into).collect(),
    }) {
        Ok(html) => (status, html).into_response(),
        Err(e) => error_page(e),
    }
}

pub async fn admin_restaurants(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
    Query(query): Query<NoticeQuery>,
) -> Response {
    if let Err(redirect) = guard(&state, auth, Role::Admin) {
        return redirect;
    }

    restaurants_page(
        &state,
        notice_text(query.notice.as_deref()),
        None,
        RestaurantFormView::default(),
    )
    .await
}

pub async fn create_restaurant(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
    Form(input): Form<RestaurantInput>,
) -> Response {
    let auth = match guard(&state, auth, Role::Admin) {
        Ok(auth) => auth,
        Err(redirect) => return redirect,
    };

    let echo = RestaurantFormView::from(&input);

    match create_owned(&state.repository(), &auth, input).await {
        Ok(_) => Redirect::to(&format!("{}?notice=created", RESTAURANTS_PATH)).into_response(),
        Err(e) if e.is_client_error() => restaurants_page(&state, "", Some(e), echo).await,
        Err(e) => error_page(e),
    }
}

#[derive(Template)]
#[template(path = "confirm_delete.html")]
struct ConfirmDeleteTemplate {
    active_page: &'static str,
    error: String,
    restaurant: RestaurantView,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteForm {
    pub confirm: Option<String>,
}

/// Second step of deletion: show what is about to go
pub async fn confirm_delete(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(redirect) = guard(&state, auth, Role::Admin) {
        return redirect;
    }

    let restaurant = match state.repository().find_restaurant(id).await {
        Ok(Some(restaurant)) => restaurant,
        Ok(None) => {
            return Redirect::to(&format!("{}?notice=not_found", RESTAURANTS_PATH)).into_response()
        }
        Err(e) => return error_page(e),
    };

    match render(ConfirmDeleteTemplate {
        active_page: "restaurants",
        error: String::new(),
        restaurant: restaurant.into(),
    }) {
        Ok(html) => html.into_response(),
        Err(e) => error_page(e),
    }
}

pub async fn delete_restaurant(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
    Path(id): Path<Uuid>,
    Form(form): Form<DeleteForm>,
) -> Response {
    let auth = match guard(&state, auth, Role::Admin) {
        Ok(auth) => auth,
        Err(redirect) => return redirect,
    };

    let confirmed = form.confirm.as_deref() == Some("yes");

    match delete_confirmed(&state.repository(), &auth, id, confirmed).await {
        Ok(()) => Redirect::to(&format!("{}?notice=deleted", RESTAURANTS_PATH)).into_response(),
        Err(AppError::ConfirmationRequired) => {
            Redirect::to(&format!("{}/{}/delete", RESTAURANTS_PATH, id)).into_response()
        }
        Err(AppError::RestaurantNotFound { .. }) => {
            Redirect::to(&format!("{}?notice=not_found", RESTAURANTS_PATH)).into_response()
        }
        Err(e) => error_page(e),
    }
}

// ── Client area ─────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "client_dashboard.html")]
struct ClientDashboardTemplate {
    restaurants: Vec<RestaurantView>,
}

pub async fn client_dashboard(
    State(state): State<AppState>,
    auth: std::result::Result<AuthContext, AppError>,
) -> Response {
    if let Err(redirect) = guard(&state, auth, Role::Client) {
        return redirect;
    }

    let restaurants = match state.repository().list_restaurants().await {
        Ok(restaurants) => restaurants,
        Err(e) => return error_page(e),
    };

    match render(ClientDashboardTemplate {
        restaurants: restaurants.into_iter().map(Into::into).collect(),
    }) {
        Ok(html) => html.into_response(),
        Err(e) => error_page(e),
    }
}

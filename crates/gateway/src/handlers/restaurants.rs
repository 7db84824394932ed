//! Restaurant API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use fooddrop_common::{
    auth::AuthContext,
    bootstrap::Role,
    db::{models::Restaurant, Repository},
    errors::{AppError, Result},
    metrics,
    restaurants::{format_fee, RestaurantInput},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RestaurantResponse {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub image_url: Option<String>,
    pub delivery_fee: String,
    pub delivery_fee_cents: i64,
    pub delivery_time_minutes: i32,
    pub owner_id: Uuid,
    pub created_at: String,
}

impl From<Restaurant> for RestaurantResponse {
    fn from(r: Restaurant) -> Self {
        Self {
            id: r.id,
            delivery_fee: format_fee(r.delivery_fee_cents),
            name: r.name,
            category: r.category,
            image_url: r.image_url,
            delivery_fee_cents: r.delivery_fee_cents,
            delivery_time_minutes: r.delivery_time_minutes,
            owner_id: r.owner_id,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RestaurantListResponse {
    pub restaurants: Vec<RestaurantResponse>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

/// Validate input and insert a restaurant owned by the caller
pub(crate) async fn create_owned(
    repo: &Repository,
    auth: &AuthContext,
    input: RestaurantInput,
) -> Result<Restaurant> {
    let new = input.into_new()?;
    let restaurant = repo.create_restaurant(auth.user_id, new).await?;

    metrics::record_restaurant_write("created");
    info!(
        restaurant_id = %restaurant.id,
        owner_id = %auth.user_id,
        "Restaurant created"
    );

    Ok(restaurant)
}

/// Delete one restaurant, only once the caller has confirmed
pub(crate) async fn delete_confirmed(
    repo: &Repository,
    auth: &AuthContext,
    id: Uuid,
    confirmed: bool,
) -> Result<()> {
    if !confirmed {
        return Err(AppError::ConfirmationRequired);
    }

    if !repo.delete_restaurant(id).await? {
        return Err(AppError::RestaurantNotFound { id: id.to_string() });
    }

    metrics::record_restaurant_write("deleted");
    info!(restaurant_id = %id, deleted_by = %auth.user_id, "Restaurant deleted");

    Ok(())
}

/// List restaurants, newest first. Any signed-in role may read.
pub async fn list_restaurants(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<RestaurantListResponse>> {
    let restaurants = state.repository().list_restaurants().await?;
    let restaurants: Vec<RestaurantResponse> = restaurants.into_iter().map(Into::into).collect();

    Ok(Json(RestaurantListResponse {
        total: restaurants.len(),
        restaurants,
    }))
}

/// Create a restaurant (admin only)
pub async fn create_restaurant(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<RestaurantInput>,
) -> Result<(StatusCode, Json<RestaurantResponse>)> {
    auth.require_role(Role::Admin)?;

    let restaurant = create_owned(&state.repository(), &auth, input).await?;

    Ok((StatusCode::CREATED, Json(restaurant.into())))
}

/// Delete a restaurant (admin only); requires `?confirm=true`
pub async fn delete_restaurant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode> {
    auth.require_role(Role::Admin)?;

    delete_confirmed(&state.repository(), &auth, id, params.confirm).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::testing::{body_text, json_request, state_with, state_with_db, TestState};
    use axum::http::StatusCode;
    use chrono::Utc;
    use fooddrop_common::db::models::Restaurant;
    use fooddrop_common::identity::testing::{profile, FakeIdentity, FakeProfiles};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn admin(user: Uuid) -> (FakeIdentity, FakeProfiles) {
        (
            FakeIdentity::default().with_session("admin", user),
            FakeProfiles::default().with(profile(user, Some("admin"))),
        )
    }

    #[tokio::test]
    async fn test_create_requires_admin() {
        let user = Uuid::new_v4();
        let TestState { state, .. } = state_with(
            FakeIdentity::default().with_session("client", user),
            FakeProfiles::default().with(profile(user, Some("client"))),
        );

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/restaurants",
                Some("client"),
                json!({"name": "Cantina Sol", "category": "Mexicana", "delivery_fee": "7.50", "delivery_time_minutes": 35}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_create_restaurant_owned_by_caller() {
        let user = Uuid::new_v4();
        let row = Restaurant {
            id: Uuid::new_v4(),
            name: "Cantina Sol".into(),
            category: "Mexicana".into(),
            image_url: None,
            delivery_fee_cents: 750,
            delivery_time_minutes: 35,
            owner_id: user,
            created_at: Utc::now().fixed_offset(),
        };
        let (identity, profiles) = admin(user);
        let TestState { state, .. } = state_with_db(
            identity,
            profiles,
            MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![row]]),
        );

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/restaurants",
                Some("admin"),
                json!({"name": "Cantina Sol", "category": "Mexicana", "delivery_fee": 7.5, "delivery_time_minutes": "35"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["owner_id"], user.to_string());
        assert_eq!(body["delivery_fee"], "7.50");
    }

    #[tokio::test]
    async fn test_create_rejects_missing_field() {
        let user = Uuid::new_v4();
        let (identity, profiles) = admin(user);
        let TestState { state, .. } = state_with(identity, profiles);

        let response = create_router(state)
            .oneshot(json_request(
                "POST",
                "/api/v1/restaurants",
                Some("admin"),
                json!({"name": "Cantina Sol", "delivery_fee": "7.50", "delivery_time_minutes": 35}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let user = Uuid::new_v4();
        let (identity, profiles) = admin(user);
        let TestState { state, .. } = state_with(identity, profiles);

        let path = format!("/api/v1/restaurants/{}", Uuid::new_v4());
        let response = create_router(state)
            .oneshot(json_request("DELETE", &path, Some("admin"), Value::Null))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");
    }

    #[tokio::test]
    async fn test_delete_confirmed() {
        let user = Uuid::new_v4();
        let (identity, profiles) = admin(user);
        let TestState { state, .. } = state_with_db(
            identity,
            profiles,
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }]),
        );
        let app = create_router(state);
        let path = format!("/api/v1/restaurants/{}?confirm=true", Uuid::new_v4());

        let response = app
            .clone()
            .oneshot(json_request("DELETE", &path, Some("admin"), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(json_request("DELETE", &path, Some("admin"), Value::Null))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_requires_session() {
        let TestState { state, .. } = state_with(FakeIdentity::default(), FakeProfiles::default());

        let response = create_router(state)
            .oneshot(json_request("GET", "/api/v1/restaurants", None, Value::Null))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

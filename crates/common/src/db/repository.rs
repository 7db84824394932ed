//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::bootstrap::{ProfileStore, Role};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::restaurants::NewRestaurant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Find user by (normalized) email.
    ///
    /// Reads the primary: sign-up signs the new account in straight away.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Create a user and its profile in one transaction
    pub async fn create_user_with_profile(
        &self,
        email: String,
        password_hash: String,
        name: String,
        role: Role,
    ) -> Result<User> {
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.write_conn().begin().await?;

        let user = UserActiveModel {
            id: Set(user_id),
            email: Set(email.clone()),
            password_hash: Set(password_hash),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::DuplicateEmail { email },
            _ => AppError::Database(e),
        })?;

        ProfileActiveModel {
            id: Set(user_id),
            role: Set(Some(role.as_str().to_string())),
            name: Set(Some(name)),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(user)
    }

    // ========================================================================
    // Profile Operations
    // ========================================================================

    /// Find the profile row for a user.
    ///
    /// Reads the primary; a missing profile revokes the session, so a
    /// lagging replica must not answer for a fresh registration.
    pub async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        ProfileEntity::find_by_id(user_id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Create a session row
    pub async fn create_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let now = Utc::now();

        let session = SessionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now.into()),
            last_active_at: Set(now.into()),
            expires_at: Set(expires_at.into()),
        };

        session.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find session by ID.
    ///
    /// Reads the primary so a session is visible right after sign-in.
    pub async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        SessionEntity::find_by_id(session_id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Record activity on a session
    pub async fn touch_session(&self, session_id: Uuid) -> Result<()> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        SessionEntity::update_many()
            .col_expr(SessionColumn::LastActiveAt, Expr::value(now))
            .filter(SessionColumn::Id.eq(session_id))
            .exec(self.write_conn())
            .await?;

        Ok(())
    }

    /// Delete a user's sessions that are past their expiry
    pub async fn delete_expired_sessions(&self, user_id: Uuid) -> Result<u64> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let result = SessionEntity::delete_many()
            .filter(SessionColumn::UserId.eq(user_id))
            .filter(SessionColumn::ExpiresAt.lte(now))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete session by ID
    pub async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        let result = SessionEntity::delete_by_id(session_id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Restaurant Operations
    // ========================================================================

    /// Create a restaurant owned by `owner_id`
    pub async fn create_restaurant(
        &self,
        owner_id: Uuid,
        restaurant: NewRestaurant,
    ) -> Result<Restaurant> {
        let now = Utc::now();

        let model = RestaurantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(restaurant.name),
            category: Set(restaurant.category),
            image_url: Set(restaurant.image_url),
            delivery_fee_cents: Set(restaurant.delivery_fee_cents),
            delivery_time_minutes: Set(restaurant.delivery_time_minutes),
            owner_id: Set(owner_id),
            created_at: Set(now.into()),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// List all restaurants, newest first
    pub async fn list_restaurants(&self) -> Result<Vec<Restaurant>> {
        RestaurantEntity::find()
            .order_by_desc(RestaurantColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find restaurant by ID
    pub async fn find_restaurant(&self, id: Uuid) -> Result<Option<Restaurant>> {
        RestaurantEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete exactly one restaurant by primary key
    pub async fn delete_restaurant(&self, id: Uuid) -> Result<bool> {
        let result = RestaurantEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl ProfileStore for Repository {
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Repository::find_profile(self, user_id).await
    }
}

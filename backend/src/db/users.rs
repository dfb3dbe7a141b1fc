//! User store
//!
//! The narrow slice of user persistence the auth core depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;

use crate::models::{User, UserProjection};

/// User store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("User not found")]
    NotFound,

    #[error("User store timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;

    /// Profile joined with company, business and permissions
    async fn get_projection(&self, id: i64) -> Result<UserProjection, StoreError>;

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    db_pool: PgPool,
}

impl PgUserStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub fn db_pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as(
            r#"
            SELECT id, first_name, last_name, email, password_hash, phone, profile_pic,
                   last_login_at, first_login, created_at, updated_at
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as(
            r#"
            SELECT id, first_name, last_name, email, password_hash, phone, profile_pic,
                   last_login_at, first_login, created_at, updated_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn get_projection(&self, id: i64) -> Result<UserProjection, StoreError> {
        sqlx::query_as(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, u.phone, u.profile_pic,
                   c.id AS company_id, c.name AS company_name,
                   b.id AS business_id, b.name AS business_name,
                   string_agg(DISTINCT p.name, ',') AS permissions,
                   COALESCE(bool_or(r.name = 'admin'), FALSE) AS admin,
                   u.first_login, u.last_login_at
            FROM users u
            LEFT JOIN companies c ON u.company_id = c.id
            LEFT JOIN businesses b ON c.business_id = b.id
            LEFT JOIN roles r ON u.role_id = r.id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE u.id = $1 AND u.deleted_at IS NULL
            GROUP BY u.id, c.id, b.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn update_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = $1, first_login = FALSE, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}

//! Data models for the OMS backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

pub mod auth;
pub use auth::*;

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub first_login: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile joined with company, business and role permissions, as read from
/// the user store when a snapshot has to be rebuilt
#[derive(Debug, sqlx::FromRow, Clone)]
pub struct UserProjection {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub business_id: Option<i64>,
    pub business_name: Option<String>,
    /// Comma-separated permission names
    pub permissions: Option<String>,
    pub admin: bool,
    pub first_login: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Denormalized user profile and permissions cached per user id
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserSnapshot {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub profile_pic: Option<String>,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub business_id: Option<i64>,
    pub business_name: Option<String>,
    pub permissions: Vec<String>,
    pub admin: bool,
    pub first_login: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserSnapshot {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.admin || self.permissions.iter().any(|p| p == permission)
    }
}

impl From<UserProjection> for UserSnapshot {
    fn from(row: UserProjection) -> Self {
        let permissions = row
            .permissions
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            profile_pic: row.profile_pic,
            company_id: row.company_id,
            company_name: row.company_name,
            business_id: row.business_id,
            business_name: row.business_name,
            permissions,
            admin: row.admin,
            first_login: row.first_login,
            last_login_at: row.last_login_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(permissions: Option<&str>, admin: bool) -> UserProjection {
        UserProjection {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "a@b.com".to_string(),
            phone: None,
            profile_pic: None,
            company_id: Some(3),
            company_name: Some("Acme".to_string()),
            business_id: None,
            business_name: None,
            permissions: permissions.map(str::to_string),
            admin,
            first_login: false,
            last_login_at: None,
        }
    }

    #[test]
    fn test_permissions_split() {
        let snapshot =
            UserSnapshot::from(projection(Some("fetch.user.all, update.user,,"), false));
        assert_eq!(snapshot.permissions, vec!["fetch.user.all", "update.user"]);
        assert!(snapshot.has_permission("update.user"));
        assert!(!snapshot.has_permission("crud.role"));
    }

    #[test]
    fn test_no_permissions() {
        let snapshot = UserSnapshot::from(projection(None, false));
        assert!(snapshot.permissions.is_empty());
    }

    #[test]
    fn test_admin_has_every_permission() {
        let snapshot = UserSnapshot::from(projection(None, true));
        assert!(snapshot.has_permission("crud.role"));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "a@b.com".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            phone: None,
            profile_pic: None,
            last_login_at: None,
            first_login: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("secret"));
    }
}

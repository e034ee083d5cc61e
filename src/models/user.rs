use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Stored as the `user_role` Postgres enum; mutable at runtime
/// via promotion when a user is assigned as a stadium owner or manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Manager,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub full_name: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone_number: String,
    pub password: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone_number: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub phone_number: String,
    pub full_name: String,
    pub role: Role,
}

impl From<&User> for UserPublic {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            phone_number: u.phone_number.clone(),
            full_name: u.full_name.clone(),
            role: u.role,
        }
    }
}

/// Uzbek mobile format: +998 followed by exactly nine digits.
pub fn valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix("+998") else {
        return false;
    };
    digits.len() == 9 && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_numbers() {
        assert!(valid_phone("+998911111111"));
        assert!(valid_phone("+998000000000"));
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(!valid_phone("998911111111"));
        assert!(!valid_phone("+99891111111"));
        assert!(!valid_phone("+9989111111111"));
        assert!(!valid_phone("+99891111111a"));
        assert!(!valid_phone("+7989111111111"));
        assert!(!valid_phone(""));
    }

    #[test]
    fn role_json_shape_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), "\"manager\"");
        let role: Role = serde_json::from_str("\"owner\"").unwrap();
        assert_eq!(role, Role::Owner);
    }
}

/// Account management system
///
/// Handles account creation, credential checks, and profiles.

mod manager;
pub mod password;

pub use manager::AccountManager;
pub(crate) use manager::{insert_account, insert_profile, NewAccount};
pub use password::PasswordHasher;

use crate::db::models::{Account, Profile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub password: String,
    pub password_confirm: Option<String>,
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub display_name: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub email: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

/// Profile update request; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub display_name: Option<String>,
    #[validate(length(max = 500, message = "Ensure this field has no more than 500 characters."))]
    pub bio: Option<String>,
    #[validate(length(max = 500, message = "Ensure this field has no more than 500 characters."))]
    pub avatar: Option<String>,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub date_joined: DateTime<Utc>,
    pub profile: Option<Profile>,
}

impl AccountView {
    pub fn new(account: &Account, profile: Option<Profile>) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            username: account.username.clone(),
            date_joined: account.created_at,
            profile,
        }
    }
}

/// Normalize an email address: trim and lowercase the domain part
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Default display name: the local part of the email
pub fn default_display_name(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "Alice@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_default_display_name() {
        assert_eq!(default_display_name("alice@example.com"), "alice");
    }

    #[test]
    fn test_register_request_validation() {
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "whatever1".to_string(),
            password_confirm: None,
            display_name: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }
}

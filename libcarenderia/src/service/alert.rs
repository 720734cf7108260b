//! User-facing alerts
//!
//! Nothing in the storefront is fatal: every failure that reaches the user
//! ends up as a dismissible alert with a title and a message.

use std::fmt;

use serde::Serialize;

use crate::error::StorefrontError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Error,
    SessionExpired,
    AccountRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Error,
            title: "Error".to_string(),
            message: message.into(),
        }
    }

    pub fn session_expired() -> Self {
        Self {
            kind: AlertKind::SessionExpired,
            title: "Session Expired".to_string(),
            message: "Your session has expired. Please log in again.".to_string(),
        }
    }

    pub fn account_required(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::AccountRequired,
            title: "Account Required".to_string(),
            message: message.into(),
        }
    }
}

impl From<&StorefrontError> for Alert {
    fn from(err: &StorefrontError) -> Self {
        if err.is_session_expired() {
            return Alert::session_expired();
        }
        match err {
            StorefrontError::LoginRequired(message) => Alert::account_required(message.clone()),
            other => Alert::error(other.user_message()),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_unauthorized_becomes_session_expired() {
        let err = StorefrontError::Api(ApiError::Unauthorized("token_not_valid".to_string()));
        let alert = Alert::from(&err);
        assert_eq!(alert.kind, AlertKind::SessionExpired);
        assert_eq!(alert.title, "Session Expired");
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = StorefrontError::Api(ApiError::Validation(
            "username: A user with that username already exists.".to_string(),
        ));
        let alert = Alert::from(&err);
        assert_eq!(alert.kind, AlertKind::Error);
        assert_eq!(
            alert.to_string(),
            "Error: username: A user with that username already exists."
        );
    }

    #[test]
    fn test_login_required() {
        let err = StorefrontError::LoginRequired(
            "You need to have an account to claim: Free Leche Flan".to_string(),
        );
        let alert = Alert::from(&err);
        assert_eq!(alert.kind, AlertKind::AccountRequired);
        assert!(alert.message.ends_with("Free Leche Flan"));
    }
}

//! Error types for Carenderia

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorefrontError>;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Login required: {0}")]
    LoginRequired(String),
}

impl StorefrontError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            StorefrontError::InvalidInput(_) => 3,
            StorefrontError::LoginRequired(_) => 2,
            StorefrontError::Api(ApiError::Unauthorized(_)) => 2,
            StorefrontError::Api(_) => 1,
            StorefrontError::Config(_) => 1,
            StorefrontError::Storage(_) => 1,
        }
    }

    /// True when the backend rejected the stored session token.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, StorefrontError::Api(ApiError::Unauthorized(_)))
    }

    /// Best-effort message suitable for an alert dialog.
    pub fn user_message(&self) -> String {
        match self {
            StorefrontError::Api(ApiError::Network(_)) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            StorefrontError::Api(ApiError::Unauthorized(_)) => {
                "Your session has expired. Please log in again.".to_string()
            }
            StorefrontError::Api(ApiError::Validation(msg))
            | StorefrontError::Api(ApiError::NotFound(msg))
            | StorefrontError::Api(ApiError::Server(msg)) => msg.clone(),
            StorefrontError::Api(ApiError::Decode(_)) => {
                "The server sent a response this app could not understand.".to_string()
            }
            StorefrontError::InvalidInput(msg) | StorefrontError::LoginRequired(msg) => {
                msg.clone()
            }
            StorefrontError::Config(e) => e.to_string(),
            StorefrontError::Storage(e) => e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = StorefrontError::InvalidInput("Rating must be between 1 and 5".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_session_errors() {
        let expired = StorefrontError::Api(ApiError::Unauthorized("token expired".to_string()));
        assert_eq!(expired.exit_code(), 2);

        let login = StorefrontError::LoginRequired("claim coupon".to_string());
        assert_eq!(login.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_api_errors() {
        for err in [
            ApiError::Network("refused".to_string()),
            ApiError::Validation("bad".to_string()),
            ApiError::NotFound("gone".to_string()),
            ApiError::Server("boom".to_string()),
            ApiError::Decode("eof".to_string()),
        ] {
            assert_eq!(StorefrontError::Api(err).exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let error = StorefrontError::Storage(StorageError::IoError(io));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_session_expired_detection() {
        assert!(StorefrontError::Api(ApiError::Unauthorized("x".to_string())).is_session_expired());
        assert!(!StorefrontError::Api(ApiError::Validation("x".to_string())).is_session_expired());
        assert!(!StorefrontError::LoginRequired("x".to_string()).is_session_expired());
    }

    #[test]
    fn test_user_message_passes_backend_text_through() {
        let error = StorefrontError::Api(ApiError::Validation(
            "username: A user with that username already exists.".to_string(),
        ));
        assert_eq!(
            error.user_message(),
            "username: A user with that username already exists."
        );
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let error = StorefrontError::Api(ApiError::Network(
            "error sending request for url (http://127.0.0.1:1/)".to_string(),
        ));
        assert!(!error.user_message().contains("127.0.0.1"));
        assert!(error.user_message().contains("connection"));
    }

    #[test]
    fn test_error_message_formatting() {
        let error = StorefrontError::Api(ApiError::Server("Internal Server Error".to_string()));
        assert_eq!(format!("{}", error), "API error: Server error: Internal Server Error");

        let config_error = ConfigError::MissingField("storage.path".to_string());
        let error = StorefrontError::Config(config_error);
        assert_eq!(
            format!("{}", error),
            "Configuration error: Missing required field: storage.path"
        );
    }

    #[test]
    fn test_error_conversion_from_api_error() {
        let error: StorefrontError = ApiError::NotFound("coupon 9".to_string()).into();
        match error {
            StorefrontError::Api(ApiError::NotFound(msg)) => assert_eq!(msg, "coupon 9"),
            _ => panic!("Expected StorefrontError::Api"),
        }
    }

    #[test]
    fn test_error_conversion_from_storage_error() {
        let json_err = serde_json::from_str::<Vec<i64>>("not json").unwrap_err();
        let error: StorefrontError = StorageError::Serialization(json_err).into();
        assert!(matches!(error, StorefrontError::Storage(_)));
    }

    #[test]
    fn test_api_error_clone() {
        let original = ApiError::Network("Connection failed".to_string());
        assert_eq!(original.clone(), original);
    }
}

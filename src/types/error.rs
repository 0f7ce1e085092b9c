//! Error types for Umbrella IAM
//!
//! Client errors carry a message and optional structured parameters that are
//! returned to the caller. Server errors are logged in full and rendered as an
//! opaque failure.

use hyper::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

/// Main error type for IAM operations
#[derive(Debug, thiserror::Error)]
pub enum IamError {
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        parameters: Option<Value>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        parameters: Option<Value>,
    },

    #[error("Same password is reused for {username}")]
    SamePasswordReused { username: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Secret cannot be found: {0}")]
    SecretNotAvailable(String),

    #[error("File cannot be found: {container}/{name}")]
    FileNotAvailable { name: String, container: String },

    #[error("Key material error: {0}")]
    KeyMaterial(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// JSON body returned for every error response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl IamError {
    pub fn not_found(message: impl Into<String>, parameters: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            parameters: Some(parameters),
        }
    }

    pub fn unauthorized(message: impl Into<String>, parameters: Option<Value>) -> Self {
        Self::Unauthorized {
            message: message.into(),
            parameters,
        }
    }

    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::BAD_REQUEST,
            Self::SamePasswordReused { .. } => StatusCode::BAD_REQUEST,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SecretNotAvailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::FileNotAvailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::KeyMaterial(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller is told what went wrong
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Body shown to the caller. Server errors never expose their detail.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Self::NotFound { message, parameters } | Self::Unauthorized { message, parameters } => {
                ErrorBody {
                    error_message: message.clone(),
                    parameters: parameters.clone(),
                }
            }
            Self::SamePasswordReused { username } => ErrorBody {
                error_message: "Same password is reused".to_string(),
                parameters: Some(json!({ "username": username })),
            },
            Self::BadRequest(message) | Self::Http(message) => ErrorBody {
                error_message: message.clone(),
                parameters: None,
            },
            _ => ErrorBody {
                error_message: "Internal server error".to_string(),
                parameters: None,
            },
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, ErrorBody) {
        (self.status_code(), self.to_body())
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for IamError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for IamError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for IamError {
    fn from(err: hyper::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<mongodb::error::Error> for IamError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for IamError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON serialization failed: {}", err))
    }
}

impl From<bson::de::Error> for IamError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON deserialization failed: {}", err))
    }
}

impl From<reqwest::Error> for IamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for IamError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::unauthorized(format!("Invalid authorization token: {}", err), None)
    }
}

/// Result type alias for IAM operations
pub type Result<T> = std::result::Result<T, IamError>;

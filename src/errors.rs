use crate::models::channel::ChannelError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use diesel::r2d2;
use serde_json::json;
use std::fmt;

/// Errors returned by HTTP handlers, rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub enum AppError {
    // Lifecycle
    InvalidAction { message: String },
    UnknownChannel { channel_id: String },
    ReadOnlyField { field: String },

    // Validation Errors
    InvalidInput { field: String, message: String },
    ResourceNotFound { resource: String },

    // External Service Errors
    UpstreamApi { service: String, message: String },
    NetworkError,

    // Database Errors
    DatabaseError,
    ConnectionPoolError,

    // System Errors
    InternalError,
    ConfigurationError,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidAction { message } => write!(f, "Invalid action: {}", message),
            AppError::UnknownChannel { channel_id } => {
                write!(f, "Channel {} doesn't exist", channel_id)
            }
            AppError::ReadOnlyField { field } => write!(f, "{} is read-only", field),

            AppError::InvalidInput { field, message } => write!(f, "Invalid {}: {}", field, message),
            AppError::ResourceNotFound { resource } => write!(f, "{} not found", resource),

            AppError::UpstreamApi { service, message } => {
                write!(f, "{} API error: {}", service, message)
            }
            AppError::NetworkError => write!(f, "Network error talking to an upstream service"),

            AppError::DatabaseError => write!(f, "A database error occurred - please try again"),
            AppError::ConnectionPoolError => {
                write!(f, "Service temporarily unavailable - please try again")
            }

            AppError::InternalError => write!(f, "An unexpected error occurred - please try again"),
            AppError::ConfigurationError => write!(f, "System configuration error"),
        }
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::UnknownChannel { .. } => (StatusCode::BAD_REQUEST, "CHANNEL_NOT_EXIST"),
            AppError::ReadOnlyField { .. } => (StatusCode::BAD_REQUEST, "READ_ONLY_FIELD"),
            AppError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),

            AppError::ResourceNotFound { .. } => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),

            AppError::InvalidAction { .. } => (StatusCode::CONFLICT, "INVALID_ACTION"),

            AppError::DatabaseError => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::ConnectionPoolError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONNECTION_POOL_ERROR")
            }
            AppError::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::ConfigurationError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }

            AppError::UpstreamApi { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_API_ERROR"),
            AppError::NetworkError => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR"),
        }
    }

    pub fn invalid_input(field: &str, message: &str) -> Self {
        AppError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn resource_not_found(resource: &str) -> Self {
        AppError::ResourceNotFound {
            resource: resource.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_code) = self.status_and_code();

        match self {
            AppError::DatabaseError | AppError::ConnectionPoolError | AppError::InternalError => {
                log::error!("Server error: {:?}", self);
            }
            AppError::UpstreamApi { .. } | AppError::NetworkError => {
                log::warn!("Upstream failure: {:?}", self);
            }
            _ => {
                log::info!("Client error: {:?}", self);
            }
        }

        HttpResponse::build(status).json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string()
            }
        }))
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl From<ChannelError> for AppError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::InvalidAction(message) => AppError::InvalidAction { message },
            ChannelError::UnknownChannel(channel_id) => AppError::UnknownChannel { channel_id },
            ChannelError::NotFound(resource) => AppError::ResourceNotFound {
                resource: format!("Channel {}", resource),
            },
            ChannelError::ReadOnlyField { field } => AppError::ReadOnlyField { field },
            ChannelError::UpstreamApi { service, message } => {
                AppError::UpstreamApi { service, message }
            }
            ChannelError::Network(message) => {
                log::warn!("Network error: {}", message);
                AppError::NetworkError
            }
            ChannelError::Database(message) => {
                log::error!("Database error: {}", message);
                AppError::DatabaseError
            }
        }
    }
}

/// Convert database connection pool errors
impl From<r2d2::PoolError> for AppError {
    fn from(err: r2d2::PoolError) -> Self {
        log::error!("Database connection pool error: {}", err);
        AppError::ConnectionPoolError
    }
}

/// Convert diesel database errors
impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::Error as DieselError;

        match err {
            DieselError::NotFound => AppError::ResourceNotFound {
                resource: "Record".to_string(),
            },
            _ => {
                log::error!("Database error: {}", err);
                AppError::DatabaseError
            }
        }
    }
}

/// Convert reqwest HTTP errors
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        log::warn!("HTTP client error: {}", err);
        match err.status() {
            Some(status) => AppError::UpstreamApi {
                service: "upstream".to_string(),
                message: status.to_string(),
            },
            None => AppError::NetworkError,
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        log::error!("Configuration error: {}", err);
        AppError::ConfigurationError
    }
}

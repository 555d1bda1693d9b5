//! Error types for Satlas services
//!
//! Provides the error taxonomy shared by the ingestion pipeline:
//! - Fatal classes that abort a run (configuration, upstream, storage)
//! - Per-feature classes that are logged and skipped
//! - Error codes for machine-readable reporting

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors (1xxx)
    MalformedFeature,
    GeometryRejected,
    InvalidAoi,

    // Rate limiting (6xxx)
    RateLimitExceeded,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::MalformedFeature => 1001,
            ErrorCode::GeometryRejected => 1002,
            ErrorCode::InvalidAoi => 1003,

            ErrorCode::RateLimitExceeded => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Per-feature errors
    #[error("Malformed feature {feature_id}: {message}")]
    MalformedFeature { feature_id: String, message: String },

    #[error("Geometry rejected: {reason}")]
    GeometryRejected { reason: String },

    // Run-level input errors
    #[error("Invalid AOI file {path}: {message}")]
    InvalidAoi { path: String, message: String },

    // Catalog errors
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for a missing or invalid feature field
    pub fn malformed(feature_id: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::MalformedFeature {
            feature_id: feature_id.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a rejected geometry
    pub fn rejected(reason: impl Into<String>) -> Self {
        AppError::GeometryRejected {
            reason: reason.into(),
        }
    }

    /// Shorthand for a configuration problem
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::MalformedFeature { .. } => ErrorCode::MalformedFeature,
            AppError::GeometryRejected { .. } => ErrorCode::GeometryRejected,
            AppError::InvalidAoi { .. } => ErrorCode::InvalidAoi,
            AppError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Errors scoped to a single feature: the feature is dropped, the run continues
    pub fn is_per_feature(&self) -> bool {
        matches!(
            self,
            AppError::MalformedFeature { .. } | AppError::GeometryRejected { .. }
        )
    }

    /// Errors that abort the current ingestion run
    pub fn is_fatal(&self) -> bool {
        !self.is_per_feature()
    }

    /// Short label used for skip counters and log fields
    pub fn reason_label(&self) -> &'static str {
        match self.code() {
            ErrorCode::MalformedFeature => "malformed_feature",
            ErrorCode::GeometryRejected => "geometry_rejected",
            ErrorCode::InvalidAoi => "invalid_aoi",
            ErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            ErrorCode::DatabaseError | ErrorCode::ConnectionError => "database",
            ErrorCode::UpstreamError => "upstream",
            ErrorCode::InternalError => "internal",
            ErrorCode::ConfigurationError => "configuration",
            ErrorCode::SerializationError => "serialization",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

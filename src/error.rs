//! Error types and handling for Ampster
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Ampster operations
pub type Result<T> = std::result::Result<T, AmpsterError>;

/// Main error type for Ampster
#[derive(Debug, Error)]
pub enum AmpsterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Price feed fetch failures
    #[error("Fetch error: {message}")]
    Fetch { message: String },

    /// Upload failures (only ever logged by the uploader)
    #[error("Upload error: {message}")]
    Upload { message: String },

    /// First refresh of an entry did not succeed
    #[error("Entry not ready: {message}")]
    NotReady { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AmpsterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AmpsterError::Config {
            message: message.into(),
        }
    }

    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        AmpsterError::Fetch {
            message: message.into(),
        }
    }

    /// Create a new upload error
    pub fn upload<S: Into<String>>(message: S) -> Self {
        AmpsterError::Upload {
            message: message.into(),
        }
    }

    /// Create a new not-ready error
    pub fn not_ready<S: Into<String>>(message: S) -> Self {
        AmpsterError::NotReady {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        AmpsterError::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AmpsterError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AmpsterError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        AmpsterError::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AmpsterError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AmpsterError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AmpsterError {
    fn from(err: std::io::Error) -> Self {
        AmpsterError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AmpsterError {
    fn from(err: serde_yaml::Error) -> Self {
        AmpsterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AmpsterError {
    fn from(err: serde_json::Error) -> Self {
        AmpsterError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AmpsterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AmpsterError::timeout(err.to_string())
        } else {
            AmpsterError::network(err.to_string())
        }
    }
}

impl From<crate::fetcher::FetchError> for AmpsterError {
    fn from(err: crate::fetcher::FetchError) -> Self {
        AmpsterError::fetch(err.to_string())
    }
}

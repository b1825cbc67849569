//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Grayling operations
#[derive(Error, Debug)]
pub enum GraylingError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (invalid CLI arguments, bad option combinations)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Corrupt or unreadable input (broken index, malformed model config)
    #[error("Format error: {message}")]
    FormatCorruption { message: String },

    /// Requested accelerator is not available
    #[error("Device unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// Invalid data errors (position order violations, length mismatches)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Model forward pass failures
    #[error("Predictor error: {message}")]
    Predictor { message: String },
}

/// Type alias for Results using GraylingError
pub type Result<T> = std::result::Result<T, GraylingError>;

impl GraylingError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::FormatCorruption {
            message: message.into(),
        }
    }

    /// Create a device error
    pub fn device(message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a predictor error
    pub fn predictor(message: impl Into<String>) -> Self {
        Self::Predictor {
            message: message.into(),
        }
    }
}

impl From<rust_htslib::errors::Error> for GraylingError {
    fn from(err: rust_htslib::errors::Error) -> Self {
        Self::FormatCorruption {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for GraylingError {
    fn from(err: toml::de::Error) -> Self {
        Self::FormatCorruption {
            message: err.to_string(),
        }
    }
}

//! Error handling for the block client
//!
//! Every fallible operation in the crate reports one of these kinds to its
//! immediate caller. Verification outcomes (bad signature, insufficient work)
//! are booleans, not errors.

use thiserror::Error;

/// Result type alias for block client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the block client
#[derive(Error, Debug)]
pub enum Error {
    /// Account index does not fit in 32 bits
    #[error("Account index out of range: {index} (maximum is {})", u32::MAX)]
    IndexOutOfRange { index: u64 },

    /// Address text does not match the address pattern
    #[error("Invalid address format: {message}")]
    InvalidAddressFormat { message: String },

    /// Embedded checksum differs from the recomputed one
    #[error("Address checksum mismatch: {address}")]
    ChecksumMismatch { address: String },

    /// Link is neither an address, a block hash nor the zero sentinel
    #[error("Invalid link format: {link}")]
    InvalidLinkFormat { link: String },

    /// Signature has the wrong length or encoding
    #[error("Malformed signature: {message}")]
    MalformedSignature { message: String },

    /// Work search ran out of time
    #[error("Work generation timed out after {attempts} attempts")]
    WorkTimeout { attempts: u64 },

    /// Hex field has the wrong length or characters
    #[error("Invalid hex in {field}: {message}")]
    InvalidHex { field: String, message: String },

    /// Balance text is not a 128-bit unsigned integer, or arithmetic overflowed
    #[error("Invalid balance: {message}")]
    InvalidBalance { message: String },

    /// Send amount exceeds the account balance
    #[error("Insufficient balance: have {available} raw, need {required} raw")]
    InsufficientBalance { available: u128, required: u128 },

    /// Difficulty threshold is not a 64-bit hex value
    #[error("Invalid difficulty: {message}")]
    InvalidDifficulty { message: String },

    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The node answered with an error
    #[error("Node error: {message}")]
    Node { message: String },

    /// Network errors below the HTTP layer
    #[error("Network error: {message}")]
    Network { message: String },

    /// Worker errors
    #[error("Worker error: {worker_type}: {message}")]
    Worker { worker_type: String, message: String },

    /// Cancellation errors for async operations
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },

    /// Invalid state errors
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl Error {
    /// Create an invalid address format error
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddressFormat {
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error
    pub fn checksum_mismatch(address: impl Into<String>) -> Self {
        Self::ChecksumMismatch {
            address: address.into(),
        }
    }

    /// Create an invalid link error
    pub fn invalid_link(link: impl Into<String>) -> Self {
        Self::InvalidLinkFormat { link: link.into() }
    }

    /// Create a malformed signature error
    pub fn malformed_signature(message: impl Into<String>) -> Self {
        Self::MalformedSignature {
            message: message.into(),
        }
    }

    /// Create an invalid hex error for a named field
    pub fn invalid_hex(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidHex {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid balance error
    pub fn invalid_balance(message: impl Into<String>) -> Self {
        Self::InvalidBalance {
            message: message.into(),
        }
    }

    /// Create an invalid difficulty error
    pub fn invalid_difficulty(message: impl Into<String>) -> Self {
        Self::InvalidDifficulty {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a node error
    pub fn node(message: impl Into<String>) -> Self {
        Self::Node {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(worker_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Worker {
            worker_type: worker_type.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if the failed operation may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Error::Network { .. } => true,
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::IndexOutOfRange { .. } => "index_out_of_range",
            Error::InvalidAddressFormat { .. } => "invalid_address_format",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::InvalidLinkFormat { .. } => "invalid_link_format",
            Error::MalformedSignature { .. } => "malformed_signature",
            Error::WorkTimeout { .. } => "work_timeout",
            Error::InvalidHex { .. } => "invalid_hex",
            Error::InvalidBalance { .. } => "invalid_balance",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::InvalidDifficulty { .. } => "invalid_difficulty",
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Node { .. } => "node",
            Error::Network { .. } => "network",
            Error::Worker { .. } => "worker",
            Error::Cancelled { .. } => "cancelled",
            Error::InvalidState { .. } => "invalid_state",
        }
    }
}

//! Unified error handling for the CCU.
//!
//! This module provides a common error type that is used across all crates.
//! Reservation conflicts are not represented here; they have their own typed
//! error in the topology crate because callers are expected to match on them.

/// Unified error type for the CCU.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message bus (publish/subscribe) errors.
    #[error("Bus error: {0}")]
    Bus(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Input rejected at the boundary (malformed layout, unknown node ids).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Layout persistence errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Not found errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience macros for creating errors.
#[macro_export]
macro_rules! config_err {
    ($msg:expr) => {
        $crate::error::Error::Config($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! bus_err {
    ($msg:expr) => {
        $crate::error::Error::Bus($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Bus(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_err {
    ($msg:expr) => {
        $crate::error::Error::Validation($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Validation(format!($fmt, $($arg)*))
    };
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(format!("Invalid TOML: {}", e))
    }
}

impl Error {
    /// Whether the error was caused by input that should simply be dropped.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Validation(_))
    }
}

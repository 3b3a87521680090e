use std::fmt;

use crate::services::channel::ChannelError;
use crate::services::store::StoreError;

/// Main error type for the kestrel-ride core
#[derive(Debug)]
pub enum KestrelError {
    // User input validation
    IncompleteAddress(String),
    InvalidRating(u8),

    // Order lifecycle errors
    Submission(String),
    Channel(String),
    Cancel(String),
    Rate(String),

    // Local persistence errors
    Store(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Configuration and setup errors
    Configuration(String),
    MissingEnvironmentVariable(String),
}

impl fmt::Display for KestrelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KestrelError::IncompleteAddress(msg) => write!(f, "Incomplete address: {}", msg),
            KestrelError::InvalidRating(value) => {
                write!(f, "Rating must be between 1 and 5, got {}", value)
            }

            KestrelError::Submission(msg) => write!(f, "Order submission failed: {}", msg),
            KestrelError::Channel(msg) => write!(f, "Order channel error: {}", msg),
            KestrelError::Cancel(msg) => write!(f, "Order cancellation failed: {}", msg),
            KestrelError::Rate(msg) => write!(f, "Order rating failed: {}", msg),

            KestrelError::Store(msg) => write!(f, "Local store error: {}", msg),

            KestrelError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            KestrelError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),

            KestrelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            KestrelError::MissingEnvironmentVariable(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
        }
    }
}

impl std::error::Error for KestrelError {}

// Convenience type alias for Results
pub type KestrelResult<T> = Result<T, KestrelError>;

// Conversion implementations for common error types
impl From<serde_json::Error> for KestrelError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            KestrelError::JsonParsing(err.to_string())
        } else {
            KestrelError::JsonSerialization(err.to_string())
        }
    }
}

impl From<StoreError> for KestrelError {
    fn from(err: StoreError) -> Self {
        KestrelError::Store(err.to_string())
    }
}

impl From<ChannelError> for KestrelError {
    fn from(err: ChannelError) -> Self {
        KestrelError::Channel(err.to_string())
    }
}

// Helper functions for creating common errors
impl KestrelError {
    pub fn incomplete_address(msg: impl Into<String>) -> Self {
        KestrelError::IncompleteAddress(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        KestrelError::Submission(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        KestrelError::Configuration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = KestrelError::IncompleteAddress("pickup address is empty".to_string());
        assert_eq!(error.to_string(), "Incomplete address: pickup address is empty");

        let error = KestrelError::InvalidRating(7);
        assert_eq!(error.to_string(), "Rating must be between 1 and 5, got 7");
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(
            KestrelError::incomplete_address("test"),
            KestrelError::IncompleteAddress(_)
        ));
        assert!(matches!(KestrelError::submission("test"), KestrelError::Submission(_)));
        assert!(matches!(KestrelError::configuration("test"), KestrelError::Configuration(_)));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: KestrelError = StoreError::Query("HVALS failed".to_string()).into();
        assert!(matches!(err, KestrelError::Store(_)));
    }
}

//! Stream delivery errors.
//!
//! These only concern the delivery loop itself (Redis and decoding). Handler
//! failures never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Consumer group vanished (stream deleted or flushed).
    pub fn is_nogroup_error(&self) -> bool {
        matches!(self, StreamError::Redis(e) if e.to_string().contains("NOGROUP"))
    }

    /// Connection-level failure worth backing off for.
    pub fn is_connection_error(&self) -> bool {
        let StreamError::Redis(e) = self else {
            return false;
        };
        let lower = e.to_string().to_lowercase();
        ["connection", "disconnected", "broken pipe", "reset by peer", "refused", "eof", "io error"]
            .iter()
            .any(|needle| lower.contains(needle))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

impl From<core_config::ConfigError> for StreamError {
    fn from(err: core_config::ConfigError) -> Self {
        StreamError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_error_is_not_connection_error() {
        let err: StreamError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StreamError::Serialization(_)));
        assert!(!err.is_connection_error());
        assert!(!err.is_nogroup_error());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: StreamError = core_config::ConfigError::MissingEnvVar("X".to_string()).into();
        assert!(err.to_string().contains("Configuration error"));
    }
}

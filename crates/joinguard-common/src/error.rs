//! Error types for JoinGuard
//!
//! Registry and gate outcomes are plain enums, not errors. What lands here is
//! I/O: the messaging platform, the state store, and configuration.

use thiserror::Error;

/// Messaging platform call failures
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("{method} rejected ({code}): {description}")]
    Api {
        method: &'static str,
        code: i64,
        description: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Undecodable response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Whether the platform refused because the bot lacks rights
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PlatformError::Api { code: 400 | 403, description, .. }
            if description.contains("not enough rights") || description.contains("administrator"))
    }
}

/// State store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Serialization failure: {0}")]
    Serialization(String),

    #[error("Corrupt state file {0}")]
    Corrupt(String),
}

/// Configuration problems detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

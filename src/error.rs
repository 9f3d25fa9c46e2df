//! Error types for the returns service.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Order lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Policy retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Eligibility resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors (order/customer store).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Row decode failed: {0}")]
    Decode(String),
}

/// Order lookup boundary errors.
///
/// "Order not found" is NOT an error — it is a typed `OrderFetch::NotFound`
/// variant. This enum covers transport-level failures only.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Order store transport error: {0}")]
    Transport(String),
}

impl From<DatabaseError> for LookupError {
    fn from(e: DatabaseError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Policy corpus retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Policy corpus is empty")]
    EmptyCorpus,

    #[error("Failed to load policy document: {0}")]
    DocumentLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Eligibility resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Policy retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Language-model fallback failed: {0}")]
    Fallback(#[from] LlmError),

    #[error("Malformed fallback verdict: {detail}")]
    MalformedFallback { detail: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Notification dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid recipient address {recipient}: {reason}")]
    InvalidRecipient { recipient: String, reason: String },

    #[error("Send to {recipient} failed: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("Send to {recipient} timed out after {timeout:?}")]
    Timeout { recipient: String, timeout: Duration },
}

/// Email channel errors (inbound polling).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("IMAP connection failed: {0}")]
    Connect(String),

    #[error("IMAP login failed for {username}")]
    AuthFailed { username: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

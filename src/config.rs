//! Configuration types.

use std::time::Duration;

/// Pipeline configuration.
///
/// Every external call made during a case (order lookup, eligibility
/// resolution, notification dispatch) is bounded by one of these timeouts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Timeout for the order store fetch.
    pub lookup_timeout: Duration,
    /// Timeout for eligibility resolution (retrieval + optional LLM fallback).
    pub resolve_timeout: Duration,
    /// Timeout for each notification dispatch.
    pub dispatch_timeout: Duration,
    /// Timeout for LLM wording of the eligibility notice.
    pub compose_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
            resolve_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
            compose_timeout: Duration::from_secs(20),
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let secs = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            lookup_timeout: Duration::from_secs(secs("RETURNS_LOOKUP_TIMEOUT_SECS", 10)),
            resolve_timeout: Duration::from_secs(secs("RETURNS_RESOLVE_TIMEOUT_SECS", 30)),
            dispatch_timeout: Duration::from_secs(secs("RETURNS_DISPATCH_TIMEOUT_SECS", 30)),
            compose_timeout: Duration::from_secs(secs("RETURNS_COMPOSE_TIMEOUT_SECS", 20)),
        }
    }
}

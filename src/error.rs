//! Error types for the Obsidian MCP server.

use std::time::Duration;

/// Top-level error type returned across the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by the upstream REST client.
///
/// Upstream errors are never cached and never retried by the core — retries
/// for batch operations are the `BatchProcessor`'s job, not the client's.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The plugin responded with a non-2xx status.
    #[error("{method} {url} returned {status}: {message}")]
    Http {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    /// Connection refused, DNS failure, or similar — no response was received.
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    /// The request exceeded its per-operation timeout.
    #[error("{method} {url} timed out after {timeout:?}")]
    Timeout {
        method: String,
        url: String,
        timeout: Duration,
    },

    /// The plugin's response body could not be decoded as expected.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Request-validation failures, surfaced synchronously before any I/O.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid resource URI: {0}")]
    InvalidUri(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("no handler registered for URI: {0}")]
    UnknownResource(String),
}

/// Errors from the batch fan-out processor (per-item failures live inside
/// the batch result, not here — this is for setup failures only).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BatchError {
    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,
}

/// Errors from the stdio JSON-RPC transport loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("malformed JSON-RPC request: {0}")]
    MalformedRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

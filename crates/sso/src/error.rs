//! Error types for the SSO client
//!
//! Four failure classes cover every operation in the SDK:
//!
//! | Variant | When |
//! |---------|------|
//! | `Configuration` | Malformed or incomplete client identity |
//! | `Network` | Transport-level failure from the HTTP collaborator |
//! | `Protocol` | Reachable server, unexpected status or non-JSON body |
//! | `Validation` | Well-formed response missing fields, or a token/claim check failed |
//!
//! All variants propagate to the immediate caller; nothing is retried
//! or swallowed inside the SDK. Token liveness queries never return
//! errors — they are computed from locally held data.

use thiserror::Error;

/// Error type for all SSO client operations
#[derive(Debug, Error)]
pub enum SsoError {
    /// Malformed or incomplete client identity. Fatal at construction;
    /// no partial client is usable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure (connection refused, timeout), surfaced
    /// unchanged from the HTTP collaborator.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-200 status or a non-JSON body from an otherwise reachable
    /// server.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON is well-formed but lacks required fields, a token signature
    /// failed verification, or a required claim is absent.
    #[error("validation error: {0}")]
    Validation(String),
}

//! PKCE (Proof Key for Code Exchange) challenge builder
//!
//! Derives code challenges from verifier secrets and assembles the
//! authorization redirect URL. The Signet server compares the
//! challenge against the **hex** SHA-256 digest of the verifier, not
//! the RFC 7636 base64url form, so `derive_challenge` returns hex.
//! Everything in this module is pure string construction; no I/O.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure code verifier
///
/// Returns a URL-safe base64-encoded random string of 32 bytes
/// (43 characters). Per RFC 7636, verifiers must be 43-128 characters
/// long.
#[must_use]
pub fn generate_code_verifier() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Generate a random state token for CSRF protection
///
/// Returns a URL-safe base64-encoded random string of 32 bytes
/// (43 characters). Must match between the authorization request and
/// the callback.
#[must_use]
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Derive the code challenge for a verifier
///
/// Computes the SHA-256 digest of the verifier and returns it
/// hex-encoded, which is the form the server's challenge comparison
/// expects. Deterministic; the caller contract is to supply a
/// non-empty verifier.
///
/// # Arguments
/// * `verifier` - The code verifier secret
#[must_use]
pub fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the authorization redirect URL
///
/// Assembles the GET-style redirect target the user agent is sent to
/// in order to initiate authentication. The server itself never
/// performs this request. Parameter order is stable for testability;
/// values are percent-encoded.
///
/// # Arguments
/// * `endpoint` - Base URL of the SSO server (no trailing slash)
/// * `client_id` - App id of the application requesting authorization
/// * `state` - CSRF protection token, echoed back in the callback
/// * `verifier` - PKCE verifier secret; only its challenge is sent
/// * `return_to` - URL the user agent is redirected to afterwards
/// * `audience` - App id of the application whose data is requested,
///   if any
#[must_use]
pub fn authorization_url(
    endpoint: &str,
    client_id: i64,
    state: &str,
    verifier: &str,
    return_to: &str,
    audience: Option<i64>,
) -> String {
    let mut params = vec![
        ("response_type".to_string(), "code".to_string()),
        ("client".to_string(), client_id.to_string()),
        ("state".to_string(), state.to_string()),
        ("redirect".to_string(), return_to.to_string()),
        ("code_challenge".to_string(), derive_challenge(verifier)),
        ("code_challenge_method".to_string(), "S256".to_string()),
    ];

    if let Some(audience) = audience {
        params.push(("audience".to_string(), audience.to_string()));
    }

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}/auth/oauth?{query_string}")
}

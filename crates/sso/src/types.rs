//! Wire types for the token-creation endpoint
//!
//! The server answers `POST {endpoint}/token/create.json` with a JSON
//! envelope:
//!
//! ```json
//! { "tokens": { "access": { "token": "...", "expires": 1999999999 },
//!               "refresh": { "token": "...", "expires": 2099999999 } } }
//! ```
//!
//! The refresh grant member is absent for client-credentials issuance.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Envelope returned by `token/create.json`
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEnvelope {
    pub tokens: IssuedTokens,
}

/// The issued access grant and, for user-bound grants, a refresh grant
#[derive(Debug, Deserialize)]
pub(crate) struct IssuedTokens {
    pub access: IssuedToken,
    #[serde(default)]
    pub refresh: Option<IssuedToken>,
}

/// One issued credential with its declared absolute expiry
#[derive(Debug, Deserialize)]
pub(crate) struct IssuedToken {
    pub token: String,
    pub expires: i64,
}

/// Claims carried by a structured (JWT) access token
///
/// The server encodes two application ids: `aud` is the app the token
/// grants access to, and `iss` — overloading the standard issuer slot —
/// is the app on whose behalf the token was issued. Both may arrive as
/// JSON numbers or numeric strings depending on server version.
#[derive(Debug, Deserialize)]
pub(crate) struct Claims {
    #[serde(default, deserialize_with = "numeric_claim")]
    pub aud: Option<i64>,
    #[serde(default, deserialize_with = "numeric_claim")]
    pub iss: Option<i64>,
}

/// Accept an app-id claim as a number or a numeric string.
///
/// Anything else (a conventional issuer URL, an array audience) is
/// treated as absent rather than failing the whole decode.
fn numeric_claim<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

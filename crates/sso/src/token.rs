//! Access and refresh token value objects
//!
//! Both tokens are immutable once issued: the expiry is set exactly
//! once at construction and liveness is always derived from it, never
//! stored. A refresh token carries a handle back to the engine that
//! issued it so it can renew its own lease.

use chrono::Utc;

use crate::engine::Sso;
use crate::error::SsoError;

/// The credential inside an access token
///
/// Newer servers issue HS256-signed JWTs whose claims are verified at
/// exchange time; older servers issue opaque strings. Both travel to
/// resource servers as-is, but only verified credentials expose
/// claims.
#[derive(Debug, Clone)]
pub enum AccessCredential {
    /// Signature-verified structured token with its decoded app-id
    /// claims
    Verified {
        /// The signed token exactly as issued
        raw: String,
        /// `aud` claim: the app this token grants access to
        audience: Option<i64>,
        /// `iss` claim (non-standard use): the app the token was
        /// issued on behalf of
        client: Option<i64>,
    },
    /// Legacy opaque credential; no locally readable claims
    Opaque(String),
}

/// Tri-state liveness of a credential with an optionally known expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Expiry is known and in the future (or now)
    Active,
    /// Expiry is known and in the past
    Expired,
    /// No expiry was reported; liveness cannot be determined locally.
    /// Attempt renewal and observe the outcome.
    Unknown,
}

/// An issued access token with its declared expiry
///
/// Created only by a successful exchange or renewal; never mutated
/// afterwards. Discarding the value is the only teardown — there is no
/// server-side revocation call in this SDK.
#[derive(Debug, Clone)]
pub struct AccessToken {
    credential: AccessCredential,
    expires_at: i64,
}

impl AccessToken {
    pub(crate) fn new(credential: AccessCredential, expires_at: i64) -> Self {
        Self { credential, expires_at }
    }

    /// The credential value as presented to resource servers
    #[must_use]
    pub fn id(&self) -> &str {
        match &self.credential {
            AccessCredential::Verified { raw, .. } => raw,
            AccessCredential::Opaque(raw) => raw,
        }
    }

    /// The credential with its verification outcome
    #[must_use]
    pub fn credential(&self) -> &AccessCredential {
        &self.credential
    }

    /// Declared expiry as a unix timestamp
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether the declared expiry has passed
    ///
    /// Strict comparison: a token queried at exactly its expiry instant
    /// is still usable.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired(Utc::now().timestamp())
    }

    fn expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// The app id this token grants access to (`aud` claim)
    ///
    /// Callers must confirm this matches their own app id before
    /// trusting the token; the engine does not enforce it.
    ///
    /// # Errors
    /// Returns [`SsoError::Validation`] if the claim is absent from a
    /// verified token, or if the credential is opaque and carries no
    /// readable claims.
    pub fn audience(&self) -> Result<i64, SsoError> {
        match &self.credential {
            AccessCredential::Verified { audience: Some(audience), .. } => Ok(*audience),
            AccessCredential::Verified { audience: None, .. } => {
                Err(SsoError::Validation("audience claim is absent".to_string()))
            }
            AccessCredential::Opaque(_) => {
                Err(SsoError::Validation("opaque token carries no claims".to_string()))
            }
        }
    }

    /// The app id the token was issued on behalf of
    ///
    /// Carried in the server's issuer-like claim; this is not a
    /// conventional JWT issuer and must not be interpreted as one.
    ///
    /// # Errors
    /// Returns [`SsoError::Validation`] under the same contract as
    /// [`audience`](Self::audience).
    pub fn client(&self) -> Result<i64, SsoError> {
        match &self.credential {
            AccessCredential::Verified { client: Some(client), .. } => Ok(*client),
            AccessCredential::Verified { client: None, .. } => {
                Err(SsoError::Validation("client claim is absent".to_string()))
            }
            AccessCredential::Opaque(_) => {
                Err(SsoError::Validation("opaque token carries no claims".to_string()))
            }
        }
    }
}

/// An issued refresh token, able to renew its own lease
///
/// The server rotates refresh credentials on every renewal: a
/// successful [`renew`](Self::renew) supersedes this object and the
/// returned pair becomes canonical. Nothing local blocks reuse of a
/// superseded credential — a second renewal attempt goes to the wire
/// and surfaces the server's rejection.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    sso: Sso,
    credential: String,
    expires_at: Option<i64>,
}

impl RefreshToken {
    pub(crate) fn new(sso: Sso, credential: String, expires_at: Option<i64>) -> Self {
        Self { sso, credential, expires_at }
    }

    /// The opaque renewal credential
    #[must_use]
    pub fn id(&self) -> &str {
        &self.credential
    }

    /// Declared expiry, when the server reported one
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Local liveness estimate
    ///
    /// [`Liveness::Unknown`] when no expiry was reported; the only way
    /// to learn the credential's fate then is to attempt a renewal.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness_at(Utc::now().timestamp())
    }

    fn liveness_at(&self, now: i64) -> Liveness {
        match self.expires_at {
            Some(expires_at) if now > expires_at => Liveness::Expired,
            Some(_) => Liveness::Active,
            None => Liveness::Unknown,
        }
    }

    /// Exchange this credential for a fresh access/refresh pair
    ///
    /// Delegates to the issuing engine's refresh exchange. On success
    /// the returned pair is canonical and this object should be
    /// discarded; the server has revoked its credential.
    ///
    /// # Errors
    /// Propagates the engine's failures verbatim. A server-side
    /// rejection means the credential is revoked or expired and the
    /// authorization-code flow must be run from scratch.
    pub async fn renew(&self) -> Result<TokenPair, SsoError> {
        self.sso.exchange_refresh(&self.credential).await
    }
}

/// An access token and the refresh token issued alongside it
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Token presented to resource servers
    pub access: AccessToken,
    /// Credential for renewing the pair
    pub refresh: RefreshToken,
}

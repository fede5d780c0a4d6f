//! Token exchange engine
//!
//! Orchestrates the three grant flows against the server's
//! token-creation endpoint and builds the authorization redirect for
//! the code flow. The engine is stateless across calls apart from the
//! immutable client identity it wraps — one handle can be shared
//! across concurrent callers without locking, and every exchange is a
//! single network round trip with no retries.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::{debug, warn};

use crate::credentials::ClientCredentials;
use crate::error::SsoError;
use crate::pkce;
use crate::token::{AccessCredential, AccessToken, RefreshToken, TokenPair};
use crate::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::{Claims, TokenEnvelope};

struct SsoInner {
    credentials: ClientCredentials,
    transport: Arc<dyn HttpTransport>,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SsoInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoInner").field("credentials", &self.credentials).finish()
    }
}

/// Handle to the token exchange engine for one client identity
///
/// Cheaply cloneable; clones share the same credentials and transport.
/// Issued refresh tokens carry a clone so they can renew their own
/// lease.
#[derive(Debug, Clone)]
pub struct Sso {
    inner: Arc<SsoInner>,
}

impl Sso {
    /// Create an engine over the default HTTP transport
    #[must_use]
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_transport(credentials, Arc::new(ReqwestTransport::new()))
    }

    /// Create an engine from a connection string
    ///
    /// Shorthand for [`ClientCredentials::parse`] followed by
    /// [`Sso::new`].
    ///
    /// # Errors
    /// Returns [`SsoError::Configuration`] if the connection string is
    /// malformed or the app secret is missing.
    pub fn from_connection_string(connection: &str) -> Result<Self, SsoError> {
        Ok(Self::new(ClientCredentials::parse(connection)?))
    }

    /// Create an engine over a caller-supplied transport
    #[must_use]
    pub fn with_transport(
        credentials: ClientCredentials,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let decoding_key = DecodingKey::from_secret(credentials.app_secret().as_bytes());

        // Liveness comes from the envelope's `expires` field, and the
        // server's audience claim is an app id rather than anything the
        // decoder could match, so only the signature is checked here.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self { inner: Arc::new(SsoInner { credentials, transport, decoding_key, validation }) }
    }

    /// The client identity this engine authenticates as
    #[must_use]
    pub fn credentials(&self) -> &ClientCredentials {
        &self.inner.credentials
    }

    pub(crate) fn transport(&self) -> &dyn HttpTransport {
        self.inner.transport.as_ref()
    }

    /// Build the authorization redirect URL for the code flow
    ///
    /// The user agent, not this client, performs the resulting request.
    /// Pure string construction; see [`pkce::authorization_url`].
    #[must_use]
    pub fn authorize_redirect(
        &self,
        state: &str,
        verifier: &str,
        return_to: &str,
        audience: Option<i64>,
    ) -> String {
        pkce::authorization_url(
            self.inner.credentials.endpoint(),
            self.inner.credentials.app_id(),
            state,
            verifier,
            return_to,
            audience,
        )
    }

    /// Exchange an authorization code for an access/refresh pair
    ///
    /// The verifier must be the secret whose challenge was sent in the
    /// authorization redirect. Codes and verifiers are single-use by
    /// server contract, so a retried exchange is expected to be
    /// rejected.
    ///
    /// # Errors
    /// [`SsoError::Network`] on transport failure,
    /// [`SsoError::Protocol`] on a non-200 status or non-JSON body,
    /// [`SsoError::Validation`] on an incomplete envelope or a token
    /// whose signature does not verify.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        audience: Option<i64>,
    ) -> Result<TokenPair, SsoError> {
        debug!(grant = "code", "exchanging authorization code");

        let mut fields = vec![
            ("type".to_string(), "code".to_string()),
            ("client".to_string(), self.inner.credentials.app_id().to_string()),
            ("secret".to_string(), self.inner.credentials.app_secret().to_string()),
            ("code".to_string(), code.to_string()),
            ("verifier".to_string(), verifier.to_string()),
        ];
        push_audience(&mut fields, audience);

        let envelope = self.create_tokens(&fields).await?;
        self.build_pair(envelope)
    }

    /// Exchange a refresh credential for a new access/refresh pair
    ///
    /// On success the server rotates the credential: the returned pair
    /// is canonical and the presented credential is revoked. Callers
    /// holding a [`RefreshToken`] normally use
    /// [`RefreshToken::renew`] instead.
    ///
    /// # Errors
    /// Same contract as [`exchange_code`](Self::exchange_code). A
    /// rejection here means the credential is expired, revoked, or
    /// already rotated.
    pub async fn exchange_refresh(&self, token: &str) -> Result<TokenPair, SsoError> {
        debug!(grant = "refresh_token", "renewing token lease");

        let fields = vec![
            ("type".to_string(), "refresh_token".to_string()),
            ("client".to_string(), self.inner.credentials.app_id().to_string()),
            ("secret".to_string(), self.inner.credentials.app_secret().to_string()),
            ("token".to_string(), token.to_string()),
        ];

        let envelope = self.create_tokens(&fields).await?;
        self.build_pair(envelope)
    }

    /// Obtain an access token from the application's own credentials
    ///
    /// Yields an access token only; the server issues no refresh
    /// credential for this grant. Pass an audience to request access to
    /// another application's data.
    ///
    /// # Errors
    /// Same contract as [`exchange_code`](Self::exchange_code).
    pub async fn exchange_client_credentials(
        &self,
        audience: Option<i64>,
    ) -> Result<AccessToken, SsoError> {
        debug!(grant = "client_credentials", "requesting client token");

        let mut fields = vec![
            ("type".to_string(), "client_credentials".to_string()),
            ("client".to_string(), self.inner.credentials.app_id().to_string()),
            ("secret".to_string(), self.inner.credentials.app_secret().to_string()),
        ];
        push_audience(&mut fields, audience);

        let envelope = self.create_tokens(&fields).await?;
        let access = envelope.tokens.access;
        let credential = self.verify_access(&access.token)?;

        Ok(AccessToken::new(credential, access.expires))
    }

    /// One authenticated POST to `token/create.json`, decoded into the
    /// token envelope.
    async fn create_tokens(&self, fields: &[(String, String)]) -> Result<TokenEnvelope, SsoError> {
        let url = format!("{}/token/create.json", self.inner.credentials.endpoint());
        let response = self.inner.transport.post_form(&url, fields).await?;

        decode_envelope(&response)
    }

    /// Assemble the access/refresh pair from a decoded envelope.
    fn build_pair(&self, envelope: TokenEnvelope) -> Result<TokenPair, SsoError> {
        let access = envelope.tokens.access;
        let refresh = envelope
            .tokens
            .refresh
            .ok_or_else(|| SsoError::Validation("incomplete response: no refresh grant".to_string()))?;

        let credential = self.verify_access(&access.token)?;

        Ok(TokenPair {
            access: AccessToken::new(credential, access.expires),
            refresh: RefreshToken::new(self.clone(), refresh.token, Some(refresh.expires)),
        })
    }

    /// Verify an issued access credential against the app secret.
    ///
    /// A structured token whose HS256 signature does not match the
    /// shared secret is rejected. A credential that is not JWT-shaped
    /// at all is accepted as a legacy opaque token; it simply exposes
    /// no claims.
    fn verify_access(&self, raw: &str) -> Result<AccessCredential, SsoError> {
        match decode::<Claims>(raw, &self.inner.decoding_key, &self.inner.validation) {
            Ok(data) => Ok(AccessCredential::Verified {
                raw: raw.to_string(),
                audience: data.claims.aud,
                client: data.claims.iss,
            }),
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                warn!("issued access token failed signature verification");
                Err(SsoError::Validation("token signature mismatch".to_string()))
            }
            Err(_) => Ok(AccessCredential::Opaque(raw.to_string())),
        }
    }
}

/// Decode a token-creation response under the shared error contract.
fn decode_envelope(response: &HttpResponse) -> Result<TokenEnvelope, SsoError> {
    if response.status != 200 {
        warn!(status = response.status, "token endpoint rejected exchange");
        return Err(SsoError::Protocol(format!("unexpected status {}", response.status)));
    }

    let value: serde_json::Value = serde_json::from_slice(&response.body)
        .map_err(|_| SsoError::Protocol("malformed response".to_string()))?;

    serde_json::from_value(value)
        .map_err(|_| SsoError::Validation("incomplete response".to_string()))
}

fn push_audience(fields: &mut Vec<(String, String)>, audience: Option<i64>) {
    if let Some(audience) = audience {
        fields.push(("audience".to_string(), audience.to_string()));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    //! Unit tests for the exchange engine, run against a scripted
    //! transport.
    use std::sync::Mutex;

    use async_trait::async_trait;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;
    use crate::token::Liveness;

    /// Transport that replays canned responses and records requests.
    pub(crate) struct ScriptedTransport {
        responses: Mutex<Vec<HttpResponse>>,
        pub requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn replying(responses: Vec<HttpResponse>) -> Self {
            Self { responses: Mutex::new(responses), requests: Mutex::new(Vec::new()) }
        }

        fn next_response(&self) -> HttpResponse {
            let mut responses = self.responses.lock().expect("responses lock");
            if responses.is_empty() {
                HttpResponse { status: 404, body: Vec::new() }
            } else {
                responses.remove(0)
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post_form(
            &self,
            url: &str,
            fields: &[(String, String)],
        ) -> Result<HttpResponse, SsoError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push((url.to_string(), fields.to_vec()));
            Ok(self.next_response())
        }

        async fn get(
            &self,
            url: &str,
            query: &[(String, String)],
        ) -> Result<HttpResponse, SsoError> {
            self.requests.lock().expect("requests lock").push((url.to_string(), query.to_vec()));
            Ok(self.next_response())
        }
    }

    pub(crate) fn test_credentials() -> ClientCredentials {
        ClientCredentials::new("https://auth.example", 7, "s3cret").expect("valid credentials")
    }

    /// Engine wired to a transport that answers 404 to everything.
    pub(crate) fn stub_engine() -> Sso {
        Sso::with_transport(
            test_credentials(),
            std::sync::Arc::new(ScriptedTransport::replying(Vec::new())),
        )
    }

    fn engine_with(responses: Vec<HttpResponse>) -> (Sso, std::sync::Arc<ScriptedTransport>) {
        let transport = std::sync::Arc::new(ScriptedTransport::replying(responses));
        (Sso::with_transport(test_credentials(), transport.clone()), transport)
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse { status, body: body.as_bytes().to_vec() }
    }

    /// Mint an HS256 token signed with the test secret.
    fn signed_token(secret: &str, claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .expect("token encodes")
    }

    fn pair_body(access: &str) -> String {
        format!(
            r#"{{"tokens":{{"access":{{"token":"{access}","expires":1999999999}},"refresh":{{"token":"refresh-1","expires":2099999999}}}}}}"#
        )
    }

    /// Validates `Sso::exchange_code` behavior for the successful
    /// exchange scenario.
    ///
    /// Assertions:
    /// - Confirms access and refresh ids mirror the server response.
    /// - Confirms verified claims are exposed through the accessors.
    /// - Ensures the request carried the code-grant form fields.
    #[tokio::test]
    async fn test_exchange_code_success() {
        let token = signed_token("s3cret", serde_json::json!({ "aud": 9, "iss": 7 }));
        let (sso, transport) = engine_with(vec![json_response(200, &pair_body(&token))]);

        let pair = sso
            .exchange_code("the-code", "the-verifier", Some(9))
            .await
            .expect("exchange succeeds");

        assert_eq!(pair.access.id(), token);
        assert_eq!(pair.access.audience().expect("audience"), 9);
        assert_eq!(pair.access.client().expect("client"), 7);
        assert_eq!(pair.refresh.id(), "refresh-1");
        assert_eq!(pair.refresh.liveness(), Liveness::Active);

        let requests = transport.requests.lock().expect("requests lock");
        let (url, fields) = &requests[0];
        assert_eq!(url, "https://auth.example/token/create.json");
        assert!(fields.contains(&("type".to_string(), "code".to_string())));
        assert!(fields.contains(&("client".to_string(), "7".to_string())));
        assert!(fields.contains(&("secret".to_string(), "s3cret".to_string())));
        assert!(fields.contains(&("code".to_string(), "the-code".to_string())));
        assert!(fields.contains(&("verifier".to_string(), "the-verifier".to_string())));
        assert!(fields.contains(&("audience".to_string(), "9".to_string())));
    }

    /// Validates `Sso::exchange_client_credentials` behavior for the
    /// legacy opaque token scenario from the server contract.
    ///
    /// Assertions:
    /// - Confirms a non-JWT credential is accepted as opaque.
    /// - Ensures the token reads as live before its expiry.
    /// - Ensures no audience field is sent when none was supplied.
    #[tokio::test]
    async fn test_exchange_client_credentials_opaque_token() {
        let body = r#"{"tokens":{"access":{"token":"abc.def.ghi","expires":1999999999}}}"#;
        let (sso, transport) = engine_with(vec![json_response(200, body)]);

        let access = sso
            .exchange_client_credentials(None)
            .await
            .expect("exchange succeeds");

        assert_eq!(access.id(), "abc.def.ghi");
        assert!(!access.is_expired());
        assert!(matches!(access.credential(), AccessCredential::Opaque(_)));

        let requests = transport.requests.lock().expect("requests lock");
        let (_, fields) = &requests[0];
        assert!(fields.contains(&("type".to_string(), "client_credentials".to_string())));
        assert!(!fields.iter().any(|(k, _)| k == "audience"));
    }

    /// Validates `Sso::exchange_refresh` behavior for the rotation
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the refresh grant marker and credential are sent.
    /// - Confirms a new pair is produced.
    #[tokio::test]
    async fn test_exchange_refresh_success() {
        let token = signed_token("s3cret", serde_json::json!({ "aud": 7, "iss": 7 }));
        let (sso, transport) = engine_with(vec![json_response(200, &pair_body(&token))]);

        let pair = sso.exchange_refresh("old-refresh").await.expect("refresh succeeds");
        assert_eq!(pair.refresh.id(), "refresh-1");

        let requests = transport.requests.lock().expect("requests lock");
        let (_, fields) = &requests[0];
        assert!(fields.contains(&("type".to_string(), "refresh_token".to_string())));
        assert!(fields.contains(&("token".to_string(), "old-refresh".to_string())));
    }

    /// Validates the shared response contract for the non-200 status
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures every exchange operation fails with a protocol error.
    #[tokio::test]
    async fn test_non_200_status_is_protocol_error() {
        let denied = || json_response(403, r#"{"error":"denied"}"#);

        let (sso, _) = engine_with(vec![denied(), denied(), denied()]);

        let code = sso.exchange_code("c", "v", None).await;
        assert!(matches!(code, Err(SsoError::Protocol(_))));

        let refresh = sso.exchange_refresh("r").await;
        assert!(matches!(refresh, Err(SsoError::Protocol(_))));

        let credentials = sso.exchange_client_credentials(None).await;
        assert!(matches!(credentials, Err(SsoError::Protocol(_))));
    }

    /// Validates the shared response contract for the malformed body
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a non-JSON 200 body fails with a protocol error.
    #[tokio::test]
    async fn test_non_json_body_is_protocol_error() {
        let (sso, _) = engine_with(vec![json_response(200, "not-json")]);

        let result = sso.exchange_code("c", "v", None).await;
        assert!(matches!(result, Err(SsoError::Protocol(message)) if message == "malformed response"));
    }

    /// Validates the shared response contract for the incomplete
    /// envelope scenario.
    ///
    /// Assertions:
    /// - Ensures well-formed JSON without `tokens.access.token` fails
    ///   with a validation error.
    /// - Ensures a pair grant without a refresh member fails with a
    ///   validation error.
    #[tokio::test]
    async fn test_incomplete_envelope_is_validation_error() {
        let (sso, _) = engine_with(vec![
            json_response(200, r#"{"tokens":{"access":{"expires":1}}}"#),
            json_response(200, r#"{"tokens":{"access":{"token":"t","expires":1}}}"#),
        ]);

        let missing_token = sso.exchange_client_credentials(None).await;
        assert!(matches!(missing_token, Err(SsoError::Validation(_))));

        // exchange_code requires the refresh member of the envelope
        let missing_refresh = sso.exchange_code("c", "v", None).await;
        assert!(matches!(missing_refresh, Err(SsoError::Validation(_))));
    }

    /// Validates `Sso::verify_access` behavior for the signature
    /// mismatch scenario.
    ///
    /// Assertions:
    /// - Ensures a JWT signed with the wrong secret fails with a
    ///   validation error rather than degrading to opaque.
    #[tokio::test]
    async fn test_wrong_signature_is_validation_error() {
        let forged = signed_token("wrong-secret", serde_json::json!({ "aud": 9, "iss": 7 }));
        let (sso, _) = engine_with(vec![json_response(200, &pair_body(&forged))]);

        let result = sso.exchange_code("c", "v", None).await;
        assert!(
            matches!(result, Err(SsoError::Validation(message)) if message == "token signature mismatch")
        );
    }

    /// Validates `RefreshToken::renew` behavior for the delegation
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms renewal issues a fresh exchange with the held
    ///   credential.
    /// - Ensures a second renewal of the superseded object still goes
    ///   to the wire and surfaces the server's rejection.
    #[tokio::test]
    async fn test_refresh_token_renew_and_rotation() {
        let token = signed_token("s3cret", serde_json::json!({ "aud": 7, "iss": 7 }));
        let (sso, transport) = engine_with(vec![
            json_response(200, &pair_body(&token)),
            json_response(403, r#"{"error":"rotated"}"#),
        ]);

        let stale = RefreshToken::new(sso, "stale-credential".to_string(), None);
        assert_eq!(stale.liveness(), Liveness::Unknown);

        let renewed = stale.renew().await.expect("first renewal succeeds");
        assert_eq!(renewed.refresh.id(), "refresh-1");

        // The library does not block reuse; the server rejects it.
        let second = stale.renew().await;
        assert!(matches!(second, Err(SsoError::Protocol(_))));

        let requests = transport.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 2);
        assert!(requests[0].1.contains(&("token".to_string(), "stale-credential".to_string())));
        assert!(requests[1].1.contains(&("token".to_string(), "stale-credential".to_string())));
    }

    /// Validates `Sso::authorize_redirect` behavior for the engine
    /// delegation scenario.
    ///
    /// Assertions:
    /// - Confirms the engine's endpoint and app id flow into the URL.
    #[test]
    fn test_authorize_redirect_uses_engine_identity() {
        let sso = stub_engine();
        let url = sso.authorize_redirect("st", "ver", "https://app.example/cb", None);

        assert!(url.starts_with("https://auth.example/auth/oauth?"));
        assert!(url.contains("client=7"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge_method=S256"));
    }
}

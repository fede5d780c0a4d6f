//! HTTP collaborator contract
//!
//! The engine consumes HTTP through a small trait so that tests can
//! substitute a scripted transport and callers can bring their own
//! client policy (proxies, TLS, timeouts). Cancellation and timeout
//! live entirely in the transport; the engine surfaces whatever
//! outcome the transport returns.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::SsoError;

/// A raw HTTP response as seen by the engine
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body bytes
    pub body: Vec<u8>,
}

/// Trait for the HTTP transport the engine talks through
///
/// Implementations must surface transport-level failures (connection
/// refused, timeout) as [`SsoError::Network`] and must not interpret
/// response status codes themselves.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Submit a form-encoded POST request
    ///
    /// # Errors
    /// Returns [`SsoError::Network`] on transport failure.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, SsoError>;

    /// Issue a GET request with query parameters
    ///
    /// # Errors
    /// Returns [`SsoError::Network`] on transport failure.
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, SsoError>;
}

/// Production transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a 30-second request timeout
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Create a transport over an existing `reqwest` client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<HttpResponse, SsoError> {
        let response = self.client.post(url).form(fields).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }

    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, SsoError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

//! Administrative convenience endpoints
//!
//! Thin request/response wrappers around the server's management
//! surface. None of these carry algorithmic content; they share the
//! engine's status/JSON error contract and return loose JSON payloads.

use serde_json::Value;

use crate::engine::Sso;
use crate::error::SsoError;
use crate::token::AccessToken;
use crate::transport::HttpResponse;

impl Sso {
    /// List the groups known to the server
    ///
    /// # Errors
    /// [`SsoError::Network`] on transport failure, [`SsoError::Protocol`]
    /// on a non-200 status or non-JSON body, [`SsoError::Validation`]
    /// when the envelope has no `payload`.
    pub async fn group_list(&self) -> Result<Value, SsoError> {
        let url = format!("{}/group/index.json", self.credentials().endpoint());
        let response = self.transport().get(&url, &[]).await?;

        payload(&response)
    }

    /// Fetch the detail record for one group
    ///
    /// # Errors
    /// Same contract as [`group_list`](Self::group_list).
    pub async fn group_detail(&self, id: &str) -> Result<Value, SsoError> {
        let url = format!("{}/group/detail/{id}.json", self.credentials().endpoint());
        let response = self.transport().get(&url, &[]).await?;

        payload(&response)
    }

    /// Register or update a custom scope on the server
    ///
    /// Scopes let third-party applications request access to fenced-off
    /// parts of the user data this client manages. Authenticates with a
    /// freshly issued client-credentials token.
    ///
    /// # Errors
    /// Same contract as the token exchanges; the scope registration
    /// itself fails with [`SsoError::Protocol`] on a non-200 status.
    pub async fn put_scope(
        &self,
        id: &str,
        name: &str,
        description: &str,
        icon: Option<&str>,
    ) -> Result<(), SsoError> {
        let token = self.exchange_client_credentials(None).await?;

        let url = format!(
            "{}/scope/create/{id}.json?token={}",
            self.credentials().endpoint(),
            urlencoding::encode(token.id()),
        );

        let mut fields = vec![
            ("name".to_string(), name.to_string()),
            ("description".to_string(), description.to_string()),
        ];
        if let Some(icon) = icon {
            fields.push(("icon".to_string(), icon.to_string()));
        }

        let response = self.transport().post_form(&url, &fields).await?;
        if response.status != 200 {
            return Err(SsoError::Protocol(format!("unexpected status {}", response.status)));
        }

        Ok(())
    }

    /// Fetch the app-drawer listing
    ///
    /// Retained for older deployments that still render the drawer.
    ///
    /// # Errors
    /// [`SsoError::Network`] or [`SsoError::Protocol`] per the shared
    /// contract.
    pub async fn app_drawer(&self) -> Result<Value, SsoError> {
        let url = format!("{}/appdrawer/index.json", self.credentials().endpoint());
        let response = self.transport().get(&url, &[]).await?;

        decode_json(&response)
    }

    /// URL of the embeddable app-drawer script
    #[must_use]
    pub fn app_drawer_js_url(&self) -> String {
        format!("{}/appdrawer/index.js", self.credentials().endpoint())
    }

    /// Build the logout link for a held access token
    ///
    /// Directing the user agent here ends the session on the
    /// authentication server, which then redirects to `return_to` and
    /// asynchronously notifies dependent applications. Pure string
    /// construction; invoking the link is optional.
    #[must_use]
    pub fn logout_url(&self, token: &AccessToken, return_to: &str) -> String {
        format!(
            "{}/user/logout?returnto={}&token={}",
            self.credentials().endpoint(),
            urlencoding::encode(return_to),
            urlencoding::encode(token.id()),
        )
    }
}

fn decode_json(response: &HttpResponse) -> Result<Value, SsoError> {
    if response.status != 200 {
        return Err(SsoError::Protocol(format!("unexpected status {}", response.status)));
    }

    serde_json::from_slice(&response.body)
        .map_err(|_| SsoError::Protocol("malformed response".to_string()))
}

fn payload(response: &HttpResponse) -> Result<Value, SsoError> {
    let mut body = decode_json(response)?;
    match body.get_mut("payload") {
        Some(payload) => Ok(payload.take()),
        None => Err(SsoError::Validation("incomplete response: no payload".to_string())),
    }
}

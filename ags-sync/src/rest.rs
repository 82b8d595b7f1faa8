//! # REST binding for the server's service directory
//!
//! [`RestServiceDirectory`] implements [`ServiceDirectory`] over `reqwest`:
//!
//! - `GET  {base}/rest/services[/{folder}]?f=json` lists services
//! - `POST {base}/admin/generateToken` logs in with admin credentials
//! - `POST {base}/admin/services/{path}.{type}/delete` deletes a service
//!
//! All requests share one client with a request timeout. The server reports
//! most failures as HTTP 200 with an `error` or `status: "error"` body, so
//! every response body is checked, not just the status code.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use ags_sync_core::config::Credentials;
use ags_sync_core::contract::{CollaboratorError, ServiceDirectory, ServiceListing};

/// Token lifetime requested from the admin API, in minutes.
const TOKEN_EXPIRATION_MINUTES: &str = "60";

pub struct RestServiceDirectory {
    client: reqwest::Client,
}

impl RestServiceDirectory {
    pub fn new(timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!(timeout_secs = timeout.as_secs(), "[REST] Initialized service directory client");
        Ok(RestServiceDirectory { client })
    }
}

#[derive(Debug, Deserialize)]
struct ServerErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<ServerErrorDetail>,
}

/// Extract the token from a `generateToken` response body.
pub fn parse_token_response(body: &str) -> Result<String, CollaboratorError> {
    let response: TokenResponse = serde_json::from_str(body)?;
    if let Some(token) = response.token {
        return Ok(token);
    }
    match response.error {
        Some(error) => {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            if !error.details.is_empty() {
                message = format!("{message} ({})", error.details.join("; "));
            }
            Err(format!("token request rejected: {message}").into())
        }
        None => Err("token response has neither token nor error".into()),
    }
}

/// Check a delete response body. A `status` of `error` fails even with HTTP
/// 200.
pub fn parse_delete_response(body: &str) -> Result<(), CollaboratorError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    if value.get("status").and_then(|s| s.as_str()) == Some("error") {
        let messages = value
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|m| {
                m.iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
        return Err(format!("delete rejected: {messages}").into());
    }
    Ok(())
}

/// URL of the services listing at the root or in `folder`.
pub fn services_url(base_url: &str, folder: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    match folder {
        Some(folder) => format!("{base}/rest/services/{folder}"),
        None => format!("{base}/rest/services"),
    }
}

impl RestServiceDirectory {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, CollaboratorError> {
        let response = self.client.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(url, %status, "[REST] Request failed");
            return Err(format!("HTTP {status} from {url}").into());
        }
        Ok(body)
    }
}

#[async_trait]
impl ServiceDirectory for RestServiceDirectory {
    async fn list_services(
        &self,
        base_url: &str,
        folder: Option<String>,
    ) -> Result<ServiceListing, CollaboratorError> {
        let url = services_url(base_url, folder.as_deref());
        debug!(url = %url, "[REST] Listing services");
        let response = self
            .client
            .get(&url)
            .query(&[("f", "json")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status} from {url}").into());
        }
        let listing: ServiceListing = response.json().await?;
        Ok(listing)
    }

    async fn generate_token(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<String, CollaboratorError> {
        let url = format!("{}/admin/generateToken", base_url.trim_end_matches('/'));
        debug!(url = %url, username = %credentials.username, "[REST] Requesting admin token");
        let body = self
            .post_form(
                &url,
                &[
                    ("f", "json"),
                    ("username", credentials.username.as_str()),
                    ("password", credentials.password.as_str()),
                    ("client", "requestip"),
                    ("expiration", TOKEN_EXPIRATION_MINUTES),
                ],
            )
            .await?;
        parse_token_response(&body)
    }

    async fn delete_service(
        &self,
        base_url: &str,
        service_path: &str,
        service_type: &str,
        token: &str,
    ) -> Result<(), CollaboratorError> {
        let url = format!(
            "{}/admin/services/{service_path}.{service_type}/delete",
            base_url.trim_end_matches('/')
        );
        info!(url = %url, "[REST] Deleting service");
        let body = self
            .post_form(&url, &[("f", "json"), ("token", token)])
            .await?;
        parse_delete_response(&body)
    }
}

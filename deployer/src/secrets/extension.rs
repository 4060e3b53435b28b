//! HTTP client for the Parameters and Secrets extension

use openapi_client::models::NOT_FOUND_CODES;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::DeployError;

/// Header carrying the session token expected by the extension
const TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

/// HTTP client for the local secrets extension
pub struct ExtensionClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl ExtensionClient {
    /// Create a new extension client
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request.
    ///
    /// Returns `Ok(None)` when the store reports the identifier as missing.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, DeployError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeployError::SecretStoreError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json()
                .await
                .map_err(|e| DeployError::SecretStoreError(format!("Invalid response: {}", e)))?;
            return Ok(Some(body));
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            debug!("Secret store reported {} as missing", path);
            return Ok(None);
        }

        error!("Secret store request failed: {} - {}", status, body);
        Err(DeployError::SecretStoreError(format!("{}: {}", status, body)))
    }
}

fn is_not_found(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && NOT_FOUND_CODES.iter().any(|code| body.contains(code)))
}

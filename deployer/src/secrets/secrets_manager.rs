//! Secrets Manager backend
//!
//! One JSON document per site at `<prefix>/<site>`; opaque secrets by id.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use openapi_client::models::GetSecretValueResponse;

use crate::errors::DeployError;
use crate::secrets::backend::{parse_record, SecretBackend, SecretPayload, SiteRecord};
use crate::secrets::extension::ExtensionClient;

pub struct SecretsManagerBackend {
    client: Arc<ExtensionClient>,
    prefix: String,
}

impl SecretsManagerBackend {
    pub fn new(client: Arc<ExtensionClient>, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Record id of a site
    pub fn record_id(&self, site: &str) -> String {
        format!("{}/{}", self.prefix, site)
    }
}

/// Turn a `GetSecretValue` response into a payload.
///
/// `SecretBinary` is base64 on the wire; that layer is removed here and only
/// here.
pub fn payload_from_response(
    id: &str,
    response: GetSecretValueResponse,
) -> Result<SecretPayload, DeployError> {
    if let Some(text) = response.secret_string {
        return Ok(SecretPayload::Text(text));
    }
    if let Some(encoded) = response.secret_binary {
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
            DeployError::SecretMalformed(format!("{} has invalid binary payload: {}", id, e))
        })?;
        return Ok(SecretPayload::Binary(bytes));
    }
    Err(DeployError::SecretMalformed(format!("{} has no value", id)))
}

#[async_trait]
impl SecretBackend for SecretsManagerBackend {
    fn name(&self) -> &'static str {
        "secretsmanager"
    }

    async fn fetch(&self, id: &str) -> Result<SecretPayload, DeployError> {
        let response: GetSecretValueResponse = self
            .client
            .get("/secretsmanager/get", &[("secretId", id)])
            .await?
            .ok_or_else(|| DeployError::SecretNotFound(id.to_string()))?;
        payload_from_response(id, response)
    }

    async fn site_record(&self, site: &str) -> Result<SiteRecord, DeployError> {
        let id = self.record_id(site);
        let text = self.fetch(&id).await?.into_text(&id)?;
        parse_record(&id, &text)
    }
}

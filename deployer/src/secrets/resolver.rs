//! Secret resolution
//!
//! Turns backend payloads into [`SiteCredentials`]. The site record and the
//! SSH key are fetched concurrently; either failing fails the whole
//! resolution.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::SecretString;
use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::deployment::SiteCredentials;
use crate::secrets::backend::{
    SecretBackend, SiteRecord, FIELD_DATASOURCE_URL, FIELD_DB_PASSWORD, FIELD_DB_USERNAME,
    FIELD_HOSTNAME, FIELD_USERNAME,
};
use crate::storage::settings::KeyEncoding;

/// Resolves site credentials from a [`SecretBackend`]
pub struct SecretResolver {
    backend: Arc<dyn SecretBackend>,
    key_id: String,
    key_encoding: KeyEncoding,
}

impl SecretResolver {
    pub fn new(backend: Arc<dyn SecretBackend>, key_id: &str, key_encoding: KeyEncoding) -> Self {
        Self {
            backend,
            key_id: key_id.to_string(),
            key_encoding,
        }
    }

    /// Resolve the credentials of a site, SSH key included
    pub async fn resolve(&self, site: &str) -> Result<SiteCredentials, DeployError> {
        info!("Resolving credentials for site {} from {}", site, self.backend.name());

        let (record, ssh_key) = tokio::try_join!(
            self.backend.site_record(site),
            self.resolve_key(&self.key_id),
        )?;

        credentials_from_record(site, record, ssh_key)
    }

    /// Resolve SSH key material, decoding it per the configured encoding
    pub async fn resolve_key(&self, key_id: &str) -> Result<SecretString, DeployError> {
        let text = self.backend.fetch(key_id).await?.into_text(key_id)?;

        let key = match self.key_encoding {
            KeyEncoding::Plain => text,
            KeyEncoding::Base64 => {
                let compact: String = text.split_whitespace().collect();
                let bytes = BASE64.decode(compact.as_bytes()).map_err(|e| {
                    DeployError::SecretMalformed(format!("{} is not valid base64: {}", key_id, e))
                })?;
                String::from_utf8(bytes).map_err(|_| {
                    DeployError::SecretMalformed(format!("{} does not decode to text", key_id))
                })?
            }
        };

        if key.trim().is_empty() {
            return Err(DeployError::SecretMalformed(format!("{} is empty", key_id)));
        }
        debug!("Resolved key {}", key_id);
        Ok(SecretString::from(key))
    }
}

fn credentials_from_record(
    site: &str,
    mut record: SiteRecord,
    ssh_key: SecretString,
) -> Result<SiteCredentials, DeployError> {
    let hostname = required_field(site, &mut record, FIELD_HOSTNAME)?;
    let username = required_field(site, &mut record, FIELD_USERNAME)?;

    Ok(SiteCredentials {
        hostname,
        username,
        datasource_url: optional_field(&mut record, FIELD_DATASOURCE_URL),
        db_username: optional_field(&mut record, FIELD_DB_USERNAME),
        db_password: optional_field(&mut record, FIELD_DB_PASSWORD).map(SecretString::from),
        ssh_key,
    })
}

/// A required field is rendered into the inventory, so it must be a single
/// token.
fn required_field(site: &str, record: &mut SiteRecord, field: &str) -> Result<String, DeployError> {
    let value = optional_field(record, field).ok_or_else(|| {
        DeployError::SecretMalformed(format!("{} missing for site {}", field, site))
    })?;
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DeployError::SecretMalformed(format!(
            "{} for site {} contains whitespace",
            field, site
        )));
    }
    Ok(value)
}

fn optional_field(record: &mut SiteRecord, field: &str) -> Option<String> {
    record
        .remove(field)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

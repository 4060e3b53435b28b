//! Secret backend trait

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::DeployError;

/// Field names of a site record
pub const FIELD_HOSTNAME: &str = "VM_HOSTNAME";
pub const FIELD_USERNAME: &str = "VM_USERNAME";
pub const FIELD_DATASOURCE_URL: &str = "DATASOURCE_URL";
pub const FIELD_DB_USERNAME: &str = "DB_USERNAME";
pub const FIELD_DB_PASSWORD: &str = "DB_PASSWORD";

/// A site record: field name to value
pub type SiteRecord = HashMap<String, String>;

/// A secret as delivered by the store
#[derive(Clone)]
pub enum SecretPayload {
    /// Text value
    Text(String),
    /// Binary value, transport encoding already removed
    Binary(Vec<u8>),
}

impl std::fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretPayload::Text(_) => f.write_str("SecretPayload::Text([REDACTED])"),
            SecretPayload::Binary(b) => write!(f, "SecretPayload::Binary({} bytes)", b.len()),
        }
    }
}

impl SecretPayload {
    /// Normalize to plain text. Binary payloads must be UTF-8.
    pub fn into_text(self, id: &str) -> Result<String, DeployError> {
        match self {
            SecretPayload::Text(text) => Ok(text),
            SecretPayload::Binary(bytes) => String::from_utf8(bytes).map_err(|_| {
                DeployError::SecretMalformed(format!("{} is not valid UTF-8", id))
            }),
        }
    }
}

/// Parse a JSON document into a site record.
///
/// Non-string scalar values are kept in their JSON text form; nulls are
/// dropped.
pub fn parse_record(id: &str, text: &str) -> Result<SiteRecord, DeployError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DeployError::SecretMalformed(format!("{} is not valid JSON: {}", id, e)))?;
    let object = match value {
        Value::Object(object) => object,
        _ => {
            return Err(DeployError::SecretMalformed(format!(
                "{} is not a JSON object",
                id
            )))
        }
    };

    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Backend for secret storage
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch an opaque secret by id
    async fn fetch(&self, id: &str) -> Result<SecretPayload, DeployError>;

    /// Fetch the connection record of a site
    async fn site_record(&self, site: &str) -> Result<SiteRecord, DeployError>;
}

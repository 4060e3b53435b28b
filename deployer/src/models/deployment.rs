//! Deployment models

use openapi_server::models::DeployRequestBody;
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use crate::errors::DeployError;
use crate::storage::settings::Settings;

/// A validated deployment request
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub service_name: String,
    pub jar_timestamp: String,
    /// Lowercase site identifier
    pub site: String,
    pub app_user: String,
    /// Per-request bundle location override
    pub bundle_url: Option<Url>,
    /// Per-request artifact bucket override
    pub artifact_bucket: Option<String>,
    /// Requested pass-through variables, not yet filtered
    pub extra_vars: Vec<(String, String)>,
}

impl DeploymentRequest {
    /// Validate a request body and apply configured defaults
    pub fn from_body(body: DeployRequestBody, settings: &Settings) -> Result<Self, DeployError> {
        let service_name = non_empty(body.service_name);
        let jar_timestamp = non_empty(body.jar_timestamp);
        let (service_name, jar_timestamp) = match (service_name, jar_timestamp) {
            (Some(service_name), Some(jar_timestamp)) => (service_name, jar_timestamp),
            _ => {
                return Err(DeployError::ValidationError(
                    "service_name and jar_timestamp required".to_string(),
                ))
            }
        };

        let site = non_empty(body.site)
            .unwrap_or_else(|| settings.default_site.clone())
            .to_lowercase();
        if !site
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DeployError::ValidationError(format!("Invalid site: {}", site)));
        }

        let app_user =
            non_empty(body.app_user).unwrap_or_else(|| settings.default_app_user.clone());

        let bundle_url = match non_empty(body.bundle_url) {
            Some(raw) => {
                let url = Url::parse(&raw).map_err(|e| {
                    DeployError::ValidationError(format!("Invalid bundle_url: {}", e))
                })?;
                if url.scheme() != "https" && url.scheme() != "http" {
                    return Err(DeployError::ValidationError(format!(
                        "Unsupported bundle_url scheme: {}",
                        url.scheme()
                    )));
                }
                Some(url)
            }
            None => None,
        };

        let extra_vars = body
            .extra_vars
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect();

        Ok(Self {
            service_name,
            jar_timestamp,
            site,
            app_user,
            bundle_url,
            artifact_bucket: non_empty(body.artifacts_s3_bucket),
            extra_vars,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extract the request body from an inbound event.
///
/// Accepts the body itself, or an envelope whose `body` is a JSON string or
/// object.
pub fn extract_body(event: Value) -> Result<DeployRequestBody, DeployError> {
    let body = match event {
        Value::Object(mut map) if map.contains_key("body") => match map.remove("body") {
            Some(Value::String(raw)) if raw.trim().is_empty() => Value::Object(Default::default()),
            Some(Value::String(raw)) => serde_json::from_str(&raw)
                .map_err(|e| DeployError::ValidationError(format!("Invalid JSON body: {}", e)))?,
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(other) => other,
        },
        other => other,
    };

    if !body.is_object() {
        return Err(DeployError::ValidationError(
            "Request body must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(body)
        .map_err(|e| DeployError::ValidationError(format!("Invalid request: {}", e)))
}

/// Connection and credential data for one site
#[derive(Debug, Clone)]
pub struct SiteCredentials {
    pub hostname: String,
    pub username: String,
    pub datasource_url: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<SecretString>,
    pub ssh_key: SecretString,
}

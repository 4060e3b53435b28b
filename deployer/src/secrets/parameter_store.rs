//! Parameter Store backend
//!
//! A site record is spread over one parameter per field under
//! `/<prefix>/<site>/`.

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::GetParameterResponse;
use tracing::debug;

use crate::errors::DeployError;
use crate::secrets::backend::{
    SecretBackend, SecretPayload, SiteRecord, FIELD_DATASOURCE_URL, FIELD_DB_PASSWORD,
    FIELD_DB_USERNAME, FIELD_HOSTNAME, FIELD_USERNAME,
};
use crate::secrets::extension::ExtensionClient;

/// Parameter name suffix for each record field
const FIELD_PARAMETERS: [(&str, &str); 5] = [
    (FIELD_HOSTNAME, "hostname"),
    (FIELD_USERNAME, "username"),
    (FIELD_DATASOURCE_URL, "datasource_url"),
    (FIELD_DB_USERNAME, "db_username"),
    (FIELD_DB_PASSWORD, "db_password"),
];

pub struct ParameterStoreBackend {
    client: Arc<ExtensionClient>,
    prefix: String,
}

impl ParameterStoreBackend {
    pub fn new(client: Arc<ExtensionClient>, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Parameter path holding the site record fields
    pub fn site_path(&self, site: &str) -> String {
        format!("/{}/{}", self.prefix, site)
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<String>, DeployError> {
        let response: Option<GetParameterResponse> = self
            .client
            .get(
                "/systemsmanager/parameters/get",
                &[("name", name), ("withDecryption", "true")],
            )
            .await?;
        Ok(response.map(|r| r.parameter.value))
    }
}

#[async_trait]
impl SecretBackend for ParameterStoreBackend {
    fn name(&self) -> &'static str {
        "parameterstore"
    }

    async fn fetch(&self, id: &str) -> Result<SecretPayload, DeployError> {
        self.get_parameter(id)
            .await?
            .map(SecretPayload::Text)
            .ok_or_else(|| DeployError::SecretNotFound(id.to_string()))
    }

    async fn site_record(&self, site: &str) -> Result<SiteRecord, DeployError> {
        let base = self.site_path(site);
        let mut record = SiteRecord::new();

        for (field, suffix) in FIELD_PARAMETERS {
            let name = format!("{}/{}", base, suffix);
            match self.get_parameter(&name).await? {
                Some(value) => {
                    record.insert(field.to_string(), value);
                }
                None => debug!("Parameter {} not set", name),
            }
        }

        if record.is_empty() {
            return Err(DeployError::SecretNotFound(base));
        }
        Ok(record)
    }
}

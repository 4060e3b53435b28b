//! In-memory secrets backend for testing and local runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::secrets::backend::{parse_record, SecretBackend, SecretPayload, SiteRecord};

/// In-memory secrets backend.
///
/// Site records are stored as JSON text under `<prefix>/<site>`, the same
/// layout as the Secrets Manager backend. Every lookup is counted.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    prefix: String,
    data: RwLock<HashMap<String, SecretPayload>>,
    calls: AtomicUsize,
}

impl MemorySecrets {
    /// Creates a new in-memory backend
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Store a text secret
    pub fn insert_text(&self, id: &str, value: &str) {
        self.insert(id, SecretPayload::Text(value.to_string()));
    }

    /// Store a binary secret
    pub fn insert_binary(&self, id: &str, value: &[u8]) {
        self.insert(id, SecretPayload::Binary(value.to_vec()));
    }

    /// Store a site record as a JSON document
    pub fn insert_site(&self, site: &str, record: &serde_json::Value) {
        let id = format!("{}/{}", self.prefix, site);
        self.insert_text(&id, &record.to_string());
    }

    fn insert(&self, id: &str, payload: SecretPayload) {
        if let Ok(mut data) = self.data.write() {
            data.insert(id.to_string(), payload);
        }
    }

    /// Number of lookups served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretBackend for MemorySecrets {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, id: &str) -> Result<SecretPayload, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = self
            .data
            .read()
            .map_err(|_| DeployError::Internal("secret store lock poisoned".to_string()))?;
        data.get(id)
            .cloned()
            .ok_or_else(|| DeployError::SecretNotFound(id.to_string()))
    }

    async fn site_record(&self, site: &str) -> Result<SiteRecord, DeployError> {
        let id = format!("{}/{}", self.prefix, site);
        let text = self.fetch(&id).await?.into_text(&id)?;
        parse_record(&id, &text)
    }
}

//! Deployer API models

use serde::{Deserialize, Serialize};

/// Deployment trigger body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequestBody {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub jar_timestamp: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub app_user: Option<String>,
    /// Fetch the automation bundle from this URL instead of the configured source
    #[serde(default)]
    pub bundle_url: Option<String>,
    #[serde(default)]
    pub artifacts_s3_bucket: Option<String>,
    /// Extra playbook variables, forwarded only when allow-listed
    #[serde(default)]
    pub extra_vars: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Successful deployment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySuccessResponse {
    pub message: String,
    pub service_name: String,
    pub timestamp: String,
    pub site: String,
    pub target_vm: String,
    pub output_tail: String,
}

/// Failed deployment response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployFailureResponse {
    pub error: String,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

/// Rejected request response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

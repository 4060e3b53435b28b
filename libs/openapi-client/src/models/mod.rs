//! Secret store API models
//!
//! Shapes returned by the Parameters and Secrets extension. Field names follow
//! the upstream Secrets Manager and SSM APIs.

use serde::{Deserialize, Serialize};

/// `GET /secretsmanager/get` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetSecretValueResponse {
    #[serde(rename = "ARN", default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Text payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_string: Option<String>,
    /// Binary payload, base64 encoded for transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

/// `GET /systemsmanager/parameters/get` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetParameterResponse {
    pub parameter: Parameter,
}

/// A single SSM parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub name: String,
    pub value: String,
    /// `String`, `StringList` or `SecureString`
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// Error codes that mean the requested identifier does not exist
pub const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "ParameterNotFound"];

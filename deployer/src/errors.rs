//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret malformed: {0}")]
    SecretMalformed(String),

    #[error("Secret store error: {0}")]
    SecretStoreError(String),

    #[error("Failed to create workspace: {0}")]
    WorkspaceCreateFailed(String),

    #[error("No automation bundle found: {0}")]
    NoAutomationBundle(String),

    #[error("Invalid automation bundle layout: {0}")]
    BundleLayoutInvalid(String),

    #[error("Unsafe path in automation bundle: {0}")]
    BundleUnsafePath(String),

    #[error("Failed to fetch automation bundle: {0}")]
    BundleFetchFailed(String),

    #[error("Failed to secure SSH key: {0}")]
    KeyPermissionFailed(String),

    #[error("Deployment timed out after {0} seconds")]
    ExecutionTimeout(u64),

    #[error("Deployment failed (exit code {0})")]
    ExecutionFailed(i32),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// HTTP status reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            DeployError::ValidationError(_) => 400,
            _ => 500,
        }
    }
}

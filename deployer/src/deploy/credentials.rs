//! SSH key materialization

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::deploy::workspace::Workspace;
use crate::errors::DeployError;

/// Trim trailing whitespace and end with exactly one newline
pub fn normalize_key(key: &str) -> String {
    let mut normalized = key.trim_end().to_string();
    normalized.push('\n');
    normalized
}

/// Write the private key into the workspace with owner-only permissions.
///
/// The returned path is only handed out once the permissions are verified.
pub async fn write(workspace: &Workspace, key: &SecretString) -> Result<PathBuf, DeployError> {
    let file = workspace.layout().ssh_key_file();
    let contents = SecretString::from(normalize_key(key.expose_secret()));

    file.write_private(contents.expose_secret().as_bytes())
        .await
        .map_err(|e| DeployError::KeyPermissionFailed(format!("write {}: {}", file.path().display(), e)))?;

    file.set_permissions_600()
        .await
        .map_err(|e| DeployError::KeyPermissionFailed(e.to_string()))?;

    let mode = file
        .mode()
        .await
        .map_err(|e| DeployError::KeyPermissionFailed(e.to_string()))?;
    if mode & 0o077 != 0 {
        return Err(DeployError::KeyPermissionFailed(format!(
            "{} has mode {:o}",
            file.path().display(),
            mode
        )));
    }

    info!("SSH key written: {}", file.path().display());
    Ok(file.path().to_path_buf())
}

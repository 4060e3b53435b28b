//! Inventory rendering

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::DeployError;
use crate::storage::layout::WorkspaceLayout;

/// Interpreter used on the target host
pub const REMOTE_PYTHON: &str = "/usr/libexec/platform-python";

/// SSH options for short-lived targets whose host keys rotate
pub const SSH_COMMON_ARGS: &str =
    "-o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null -o IdentitiesOnly=yes";

/// Render the inventory text for a single host in group `vm`
pub fn render(host: &str, user: &str, site: &str) -> String {
    format!(
        "[vm]\n\
         {host} ansible_user={user} ansible_connection=ssh ansible_python_interpreter={REMOTE_PYTHON}\n\
         \n\
         [vm:vars]\n\
         site={site}\n\
         ansible_ssh_common_args={SSH_COMMON_ARGS}\n"
    )
}

/// Write the inventory into the automation directory, replacing any existing
/// file
pub async fn build(
    automation_dir: &Path,
    host: &str,
    user: &str,
    site: &str,
) -> Result<PathBuf, DeployError> {
    let file = WorkspaceLayout::inventory_file(automation_dir);
    file.write_string(&render(host, user, site)).await?;
    info!("Created inventory file: {}", file.path().display());
    Ok(file.path().to_path_buf())
}

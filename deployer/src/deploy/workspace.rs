//! Run workspace
//!
//! A workspace is a private, uniquely named directory owned by one run.
//! [`Workspace::release`] removes it; dropping an unreleased workspace removes
//! it too, so every exit path cleans up. Removal failures are logged and never
//! returned.

use std::path::Path;

use tracing::{info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::storage::layout::WorkspaceLayout;

const WORKSPACE_PREFIX: &str = "ansible_exec";

#[derive(Debug)]
pub struct Workspace {
    dir: Dir,
    layout: WorkspaceLayout,
    released: bool,
}

impl Workspace {
    /// Create a fresh workspace under `root`
    pub async fn acquire(root: &Path) -> Result<Self, DeployError> {
        Dir::new(root)
            .create()
            .await
            .map_err(|e| DeployError::WorkspaceCreateFailed(format!("{}: {}", root.display(), e)))?;

        let dir = Dir::create_unique(root, WORKSPACE_PREFIX)
            .await
            .map_err(|e| DeployError::WorkspaceCreateFailed(e.to_string()))?;

        info!("Created workspace: {}", dir.path().display());
        Ok(Self {
            layout: WorkspaceLayout::new(dir.path()),
            dir,
            released: false,
        })
    }

    /// Workspace root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Remove the workspace tree
    pub async fn release(mut self) {
        self.released = true;
        match self.dir.delete().await {
            Ok(()) => info!("Cleaned up workspace: {}", self.dir.path().display()),
            Err(e) => warn!("Failed to clean up workspace {}: {}", self.dir.path().display(), e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = self.dir.path();
        if let Err(e) = std::fs::remove_dir_all(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up workspace {}: {}", path.display(), e);
            }
        }
    }
}

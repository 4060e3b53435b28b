//! Workspace layout

use std::path::{Path, PathBuf};

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the automation directory inside a workspace
pub const AUTOMATION_DIR: &str = "ansible";

/// Paths used by one run, all below the workspace root
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Workspace root
    pub base_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Create a new workspace layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the automation bundle directory
    pub fn automation_dir(&self) -> Dir {
        Dir::new(self.base_dir.join(AUTOMATION_DIR))
    }

    /// Get the downloaded bundle archive path
    pub fn download_file(&self) -> File {
        File::new(self.base_dir.join("ansible-package.zip"))
    }

    /// Get the SSH private key path
    pub fn ssh_key_file(&self) -> File {
        File::new(self.base_dir.join("id_rsa"))
    }

    /// Get the inventory path for an automation directory
    pub fn inventory_file(automation_dir: &Path) -> File {
        File::new(automation_dir.join("hosts"))
    }
}

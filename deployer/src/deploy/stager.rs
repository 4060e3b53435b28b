//! Automation bundle staging
//!
//! Materializes the playbook tree at `<workspace>/ansible`. Archives are
//! expected to carry a top-level `ansible/` directory. Only that directory is
//! unpacked into the workspace root; the key file and the download live next
//! to it and are never written from an archive.

use std::io;
use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::deploy::workspace::Workspace;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::storage::layout::AUTOMATION_DIR;
use crate::storage::settings::{BundleSettings, BundleSourceKind};

/// Where the bundle comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Copy `dir` if present, otherwise unpack `archive` if present
    Embedded { dir: PathBuf, archive: PathBuf },
    /// Unpack a local archive
    Archive(PathBuf),
    /// Download an archive and unpack it
    Remote(Url),
}

impl BundleSource {
    pub fn from_settings(settings: &BundleSettings) -> Result<Self, DeployError> {
        match settings.source {
            BundleSourceKind::Embedded => Ok(BundleSource::Embedded {
                dir: settings.embedded_dir.clone(),
                archive: settings.archive.clone(),
            }),
            BundleSourceKind::Archive => Ok(BundleSource::Archive(settings.archive.clone())),
            BundleSourceKind::Remote => {
                let raw = settings.url.as_deref().ok_or_else(|| {
                    DeployError::ConfigError("BUNDLE_URL is required for remote bundles".to_string())
                })?;
                let url = Url::parse(raw)
                    .map_err(|e| DeployError::ConfigError(format!("Invalid BUNDLE_URL: {}", e)))?;
                Ok(BundleSource::Remote(url))
            }
        }
    }
}

/// Stages the automation bundle into a workspace
pub struct BundleStager {
    source: BundleSource,
    client: Client,
}

impl BundleStager {
    pub fn new(source: BundleSource) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { source, client })
    }

    pub fn source(&self) -> &BundleSource {
        &self.source
    }

    /// Stage the bundle and return the automation directory.
    ///
    /// `override_url` replaces the configured source for this run.
    pub async fn stage(
        &self,
        workspace: &Workspace,
        override_url: Option<&Url>,
    ) -> Result<PathBuf, DeployError> {
        let target = workspace.layout().automation_dir();

        match (override_url, &self.source) {
            (Some(url), _) | (None, BundleSource::Remote(url)) => {
                let download = workspace.layout().download_file();
                self.fetch(url, &download).await?;
                unpack(download.path(), workspace.path()).await?;
            }
            (None, BundleSource::Archive(archive)) => {
                if !File::new(archive).exists().await {
                    return Err(DeployError::NoAutomationBundle(format!(
                        "{} does not exist",
                        archive.display()
                    )));
                }
                unpack(archive, workspace.path()).await?;
            }
            (None, BundleSource::Embedded { dir, archive }) => {
                if crate::filesys::dir::Dir::new(dir).exists().await {
                    copy_tree(dir, target.path()).await?;
                    info!("Copied embedded ansible directory");
                } else if File::new(archive).exists().await {
                    unpack(archive, workspace.path()).await?;
                } else {
                    return Err(DeployError::NoAutomationBundle(format!(
                        "neither {} nor {} exists",
                        dir.display(),
                        archive.display()
                    )));
                }
            }
        }

        if !target.exists().await {
            return Err(DeployError::BundleLayoutInvalid(format!(
                "{} directory missing after staging",
                AUTOMATION_DIR
            )));
        }
        Ok(target.path().to_path_buf())
    }

    async fn fetch(&self, url: &Url, dest: &File) -> Result<(), DeployError> {
        let shown = url_for_log(url);
        info!("Downloading automation bundle from {}", shown);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DeployError::BundleFetchFailed(format!("{}: {}", shown, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeployError::BundleFetchFailed(format!(
                "{} returned {}",
                shown, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeployError::BundleFetchFailed(format!("{}: {}", shown, e)))?;
        dest.write_bytes(&bytes).await?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(())
    }
}

/// URL without query or fragment, which may carry signatures
fn url_for_log(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    shown.to_string()
}

/// Unpack the `ansible/` tree of a zip archive into `target`
pub async fn unpack(archive: &Path, target: &Path) -> Result<usize, DeployError> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();
    let count = tokio::task::spawn_blocking(move || unpack_zip(&archive, &target))
        .await
        .map_err(|e| DeployError::Internal(e.to_string()))??;
    info!("Unpacked {} archive entries", count);
    Ok(count)
}

fn zip_error(archive: &Path, e: zip::result::ZipError) -> DeployError {
    DeployError::BundleLayoutInvalid(format!("{}: {}", archive.display(), e))
}

/// Every entry is checked before anything is written, so an archive with a
/// single escaping entry extracts nothing. Entries outside `ansible/` are
/// skipped.
fn unpack_zip(archive_path: &Path, target: &Path) -> Result<usize, DeployError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| zip_error(archive_path, e))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| zip_error(archive_path, e))?;
        let path = entry
            .enclosed_name()
            .ok_or_else(|| DeployError::BundleUnsafePath(entry.name().to_string()))?;
        if path.starts_with(AUTOMATION_DIR) {
            entries.push((i, path.to_path_buf()));
        } else {
            warn!("Skipping archive entry outside {}/: {}", AUTOMATION_DIR, entry.name());
        }
    }

    for (i, relative) in &entries {
        let mut entry = archive.by_index(*i).map_err(|e| zip_error(archive_path, e))?;
        let out = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = std::fs::File::create(&out)?;
        io::copy(&mut entry, &mut writer)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode & 0o755))?;
        }
    }

    Ok(entries.len())
}

/// Copy a directory tree. Symlinks are skipped.
pub async fn copy_tree(src: &Path, dst: &Path) -> Result<(), DeployError> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dst))
        .await
        .map_err(|e| DeployError::Internal(e.to_string()))??;
    Ok(())
}

fn copy_tree_blocking(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let to = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_tree_blocking(&entry.path(), &to)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &to)?;
        } else {
            debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }
    Ok(())
}

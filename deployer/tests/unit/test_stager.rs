//! Bundle staging and workspace tests

use std::io::Write;
use std::path::{Path, PathBuf};

use axum::{http::StatusCode, routing::get, Router};
use secrecy::SecretString;
use url::Url;
use zip::write::FileOptions;

use vm_deployer::deploy::credentials;
use vm_deployer::deploy::stager::{unpack, BundleSource, BundleStager};
use vm_deployer::deploy::workspace::Workspace;
use vm_deployer::errors::DeployError;

const PLAYBOOK: &str = "- hosts: vm\n  tasks: []\n";

/// Build a zip at `path` from (name, contents) pairs. Names ending in `/`
/// become directories.
fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, FileOptions::default()).unwrap();
        } else {
            let options = FileOptions::default().unix_permissions(0o755);
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap();
}

fn bundle_zip(dir: &Path) -> PathBuf {
    let path = dir.join("ansible_bundle.zip");
    write_zip(
        &path,
        &[
            ("ansible/", ""),
            ("ansible/main.yml", PLAYBOOK),
            ("ansible/roles/app/tasks/main.yml", "- debug: msg=hi\n"),
        ],
    );
    path
}

/// Serve `body` at `/bundle.zip` and 404 elsewhere
async fn serve_bundle(body: Vec<u8>) -> Url {
    let app = Router::new()
        .route(
            "/bundle.zip",
            get(move || {
                let body = body.clone();
                async move { body }
            }),
        )
        .fallback(|| async { StatusCode::NOT_FOUND });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

#[tokio::test]
async fn test_workspace_is_private_and_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let workspace = Workspace::acquire(tmp.path()).await.unwrap();
    let path = workspace.path().to_path_buf();

    assert!(path.is_dir());
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("ansible_exec-"));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    let other = Workspace::acquire(tmp.path()).await.unwrap();
    assert_ne!(other.path(), path.as_path());

    workspace.release().await;
    assert!(!path.exists());

    let other_path = other.path().to_path_buf();
    drop(other);
    assert!(!other_path.exists());
}

#[tokio::test]
async fn test_embedded_directory_is_copied() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("ansible");
    std::fs::create_dir_all(dir.join("roles")).unwrap();
    std::fs::write(dir.join("main.yml"), PLAYBOOK).unwrap();

    let stager = BundleStager::new(BundleSource::Embedded {
        dir,
        archive: tmp.path().join("missing.zip"),
    })
    .unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();

    let automation_dir = stager.stage(&workspace, None).await.unwrap();
    assert_eq!(automation_dir, workspace.path().join("ansible"));
    assert_eq!(
        std::fs::read_to_string(automation_dir.join("main.yml")).unwrap(),
        PLAYBOOK
    );
    assert!(automation_dir.join("roles").is_dir());
}

#[tokio::test]
async fn test_embedded_falls_back_to_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = bundle_zip(tmp.path());

    let stager = BundleStager::new(BundleSource::Embedded {
        dir: tmp.path().join("no-such-dir"),
        archive,
    })
    .unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();

    let automation_dir = stager.stage(&workspace, None).await.unwrap();
    assert!(automation_dir.join("roles/app/tasks/main.yml").is_file());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(automation_dir.join("main.yml"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[tokio::test]
async fn test_no_bundle_at_all() {
    let tmp = tempfile::tempdir().unwrap();
    let stager = BundleStager::new(BundleSource::Embedded {
        dir: tmp.path().join("no-such-dir"),
        archive: tmp.path().join("no-such.zip"),
    })
    .unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();

    let err = stager.stage(&workspace, None).await.unwrap_err();
    assert!(matches!(err, DeployError::NoAutomationBundle(_)));
}

#[tokio::test]
async fn test_archive_without_automation_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("flat.zip");
    write_zip(&archive, &[("main.yml", PLAYBOOK)]);

    let stager = BundleStager::new(BundleSource::Archive(archive)).unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();

    let err = stager.stage(&workspace, None).await.unwrap_err();
    assert!(matches!(err, DeployError::BundleLayoutInvalid(_)));
}

#[tokio::test]
async fn test_escaping_entry_extracts_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("evil.zip");
    write_zip(
        &archive,
        &[("ansible/main.yml", PLAYBOOK), ("../escaped.txt", "gotcha")],
    );
    let target = tmp.path().join("target");
    std::fs::create_dir_all(&target).unwrap();

    let err = unpack(&archive, &target).await.unwrap_err();
    assert!(matches!(err, DeployError::BundleUnsafePath(_)));
    assert!(!tmp.path().join("escaped.txt").exists());
    assert!(!target.join("ansible/main.yml").exists());
}

#[tokio::test]
async fn test_archive_entries_outside_automation_dir_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("bundle.zip");
    write_zip(
        &archive,
        &[
            ("ansible/main.yml", PLAYBOOK),
            ("id_rsa", "NOT-THE-KEY"),
            ("ansible-package.zip", "junk"),
            ("ansible.cfg", "[defaults]\n"),
        ],
    );

    let stager = BundleStager::new(BundleSource::Archive(archive)).unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();
    let key = credentials::write(&workspace, &SecretString::from("REAL-KEY"))
        .await
        .unwrap();

    let automation_dir = stager.stage(&workspace, None).await.unwrap();
    assert!(automation_dir.join("main.yml").is_file());
    assert_eq!(std::fs::read_to_string(&key).unwrap(), "REAL-KEY\n");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&key).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
    assert!(!workspace.path().join("ansible-package.zip").exists());
    assert!(!workspace.path().join("ansible.cfg").exists());
}

#[tokio::test]
async fn test_corrupt_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("corrupt.zip");
    std::fs::write(&archive, b"definitely not a zip").unwrap();

    let err = unpack(&archive, tmp.path()).await.unwrap_err();
    assert!(matches!(err, DeployError::BundleLayoutInvalid(_)));
}

#[tokio::test]
async fn test_remote_bundle_and_request_override() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = bundle_zip(tmp.path());
    let base = serve_bundle(std::fs::read(&archive).unwrap()).await;
    let bundle_url = base.join("bundle.zip").unwrap();

    // Configured remote source
    let stager = BundleStager::new(BundleSource::Remote(bundle_url.clone())).unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();
    let automation_dir = stager.stage(&workspace, None).await.unwrap();
    assert!(automation_dir.join("main.yml").is_file());
    workspace.release().await;

    // Embedded source with nothing on disk, overridden per request
    let stager = BundleStager::new(BundleSource::Embedded {
        dir: tmp.path().join("no-such-dir"),
        archive: tmp.path().join("no-such.zip"),
    })
    .unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();
    let automation_dir = stager.stage(&workspace, Some(&bundle_url)).await.unwrap();
    assert!(automation_dir.join("main.yml").is_file());

    let missing = base.join("missing.zip").unwrap();
    let workspace = Workspace::acquire(&tmp.path().join("work")).await.unwrap();
    let err = stager.stage(&workspace, Some(&missing)).await.unwrap_err();
    assert!(matches!(err, DeployError::BundleFetchFailed(_)));
}

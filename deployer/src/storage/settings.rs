//! Deployer settings
//!
//! Settings come from an optional JSON file and are then overlaid with
//! environment variables. They are read once at startup and never mutated.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::DeployError;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Cloud credentials and artifact location forwarded to the playbook
    #[serde(default)]
    pub cloud: CloudSettings,

    /// Secret store configuration
    #[serde(default)]
    pub secrets: SecretSettings,

    /// Automation bundle source
    #[serde(default)]
    pub bundle: BundleSettings,

    /// External tool configuration
    #[serde(default)]
    pub ansible: AnsibleSettings,

    /// Parent directory for run workspaces (OS temp dir when absent)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Site used when the request carries none
    #[serde(default = "default_site")]
    pub default_site: String,

    /// App user used when the request carries none
    #[serde(default = "default_app_user")]
    pub default_app_user: String,

    /// Request `extra_vars` keys allowed through to the playbook
    #[serde(default)]
    pub passthrough_vars: Vec<String>,

    /// Local HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_site() -> String {
    "sit1".to_string()
}

fn default_app_user() -> String {
    "appadm".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            cloud: CloudSettings::default(),
            secrets: SecretSettings::default(),
            bundle: BundleSettings::default(),
            ansible: AnsibleSettings::default(),
            workspace_root: None,
            default_site: default_site(),
            default_app_user: default_app_user(),
            passthrough_vars: Vec::new(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Overlay values from the process environment
    pub fn apply_process_env(&mut self) -> Result<(), DeployError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup.
    ///
    /// Unset and empty variables leave the current value untouched.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.parse().map_err(DeployError::ConfigError)?;
        }
        if let Some(format) = get("LOG_FORMAT") {
            self.log_json = format.eq_ignore_ascii_case("json");
        }

        if let Some(bucket) = get("AWS_S3_BUCKET_REPOSITORY") {
            self.cloud.artifact_bucket = Some(bucket);
        }
        if let Some(key_id) = get("AWS_ACCESS_KEY_ID") {
            self.cloud.access_key_id = Some(key_id);
        }
        if let Some(secret) = get("AWS_SECRET_ACCESS_KEY") {
            self.cloud.secret_access_key = Some(SecretString::from(secret));
        }
        if let Some(token) = get("AWS_SESSION_TOKEN") {
            self.cloud.session_token = Some(SecretString::from(token));
        }
        if let Some(region) = get("AWS_DEFAULT_REGION") {
            self.cloud.region = region;
        }

        if let Some(backend) = get("SECRET_BACKEND") {
            self.secrets.backend = backend.parse()?;
        }
        if let Some(url) = get("SECRETS_EXTENSION_URL") {
            self.secrets.extension_url = url;
        }
        if let Some(prefix) = get("SECRET_PREFIX") {
            self.secrets.prefix = prefix;
        }
        if let Some(key_id) = get("SSH_KEY_SECRET_ID") {
            self.secrets.ssh_key_id = Some(key_id);
        }
        if let Some(encoding) = get("SSH_KEY_ENCODING") {
            self.secrets.ssh_key_encoding = encoding.parse()?;
        }

        if let Some(source) = get("BUNDLE_SOURCE") {
            self.bundle.source = source.parse()?;
        }
        if let Some(dir) = get("BUNDLE_DIR") {
            self.bundle.embedded_dir = PathBuf::from(dir);
        }
        if let Some(archive) = get("BUNDLE_ARCHIVE") {
            self.bundle.archive = PathBuf::from(archive);
        }
        if let Some(url) = get("BUNDLE_URL") {
            self.bundle.url = Some(url);
        }

        if let Some(bin) = get("ANSIBLE_PLAYBOOK_BIN") {
            self.ansible.binary = bin;
        }
        if let Some(playbook) = get("ANSIBLE_PLAYBOOK_FILE") {
            self.ansible.playbook = playbook;
        }

        if let Some(root) = get("WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(site) = get("DEFAULT_SITE") {
            self.default_site = site;
        }
        if let Some(user) = get("DEFAULT_APP_USER") {
            self.default_app_user = user;
        }
        if let Some(vars) = get("PASSTHROUGH_VARS") {
            self.passthrough_vars = vars
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
        }

        if let Some(host) = get("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| DeployError::ConfigError(format!("Invalid SERVER_PORT: {}", port)))?;
        }

        Ok(())
    }

    /// Directory that holds run workspaces
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Cloud settings forwarded to the playbook as extra variables
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSettings {
    /// Artifact repository bucket
    #[serde(default)]
    pub artifact_bucket: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<SecretString>,

    /// Session token, also used to authenticate against the secrets extension
    #[serde(default)]
    pub session_token: Option<SecretString>,

    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            artifact_bucket: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            region: default_region(),
        }
    }
}

/// Which secret store backs the resolver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackendKind {
    /// One JSON record per site
    #[default]
    SecretsManager,
    /// One parameter per field under a per-site path
    ParameterStore,
}

impl std::str::FromStr for SecretBackendKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "secretsmanager" => Ok(SecretBackendKind::SecretsManager),
            "parameterstore" | "ssm" => Ok(SecretBackendKind::ParameterStore),
            _ => Err(DeployError::ConfigError(format!("Unknown secret backend: {}", s))),
        }
    }
}

/// Encoding of the stored SSH key material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    #[default]
    Plain,
    Base64,
}

impl std::str::FromStr for KeyEncoding {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(KeyEncoding::Plain),
            "base64" => Ok(KeyEncoding::Base64),
            _ => Err(DeployError::ConfigError(format!("Unknown key encoding: {}", s))),
        }
    }
}

/// Secret store settings
#[derive(Debug, Clone, Deserialize)]
pub struct SecretSettings {
    #[serde(default)]
    pub backend: SecretBackendKind,

    /// Parameters and Secrets extension endpoint
    #[serde(default = "default_extension_url")]
    pub extension_url: String,

    /// Record prefix, e.g. `demoapp/vm`
    #[serde(default = "default_secret_prefix")]
    pub prefix: String,

    /// SSH key record id (derived from the backend when absent)
    #[serde(default)]
    pub ssh_key_id: Option<String>,

    #[serde(default)]
    pub ssh_key_encoding: KeyEncoding,
}

fn default_extension_url() -> String {
    "http://localhost:2773".to_string()
}

fn default_secret_prefix() -> String {
    "demoapp/vm".to_string()
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            backend: SecretBackendKind::default(),
            extension_url: default_extension_url(),
            prefix: default_secret_prefix(),
            ssh_key_id: None,
            ssh_key_encoding: KeyEncoding::default(),
        }
    }
}

impl SecretSettings {
    /// SSH key record id for the configured backend
    pub fn ssh_key_id(&self) -> String {
        if let Some(id) = &self.ssh_key_id {
            return id.clone();
        }
        let prefix = self.prefix.trim_matches('/');
        match self.backend {
            SecretBackendKind::SecretsManager => format!("{}/ssh-key", prefix),
            SecretBackendKind::ParameterStore => format!("/{}/ssh-key", prefix),
        }
    }
}

/// How the automation bundle is sourced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleSourceKind {
    /// Embedded directory, falling back to the embedded archive
    #[default]
    Embedded,
    /// Local archive only
    Archive,
    /// Archive fetched over HTTP
    Remote,
}

impl std::str::FromStr for BundleSourceKind {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "embedded" => Ok(BundleSourceKind::Embedded),
            "archive" | "zip" => Ok(BundleSourceKind::Archive),
            "remote" | "url" => Ok(BundleSourceKind::Remote),
            _ => Err(DeployError::ConfigError(format!("Unknown bundle source: {}", s))),
        }
    }
}

/// Automation bundle settings
#[derive(Debug, Clone, Deserialize)]
pub struct BundleSettings {
    #[serde(default)]
    pub source: BundleSourceKind,

    #[serde(default = "default_embedded_dir")]
    pub embedded_dir: PathBuf,

    #[serde(default = "default_archive")]
    pub archive: PathBuf,

    #[serde(default)]
    pub url: Option<String>,
}

fn default_embedded_dir() -> PathBuf {
    PathBuf::from("ansible")
}

fn default_archive() -> PathBuf {
    PathBuf::from("ansible_bundle.zip")
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            source: BundleSourceKind::default(),
            embedded_dir: default_embedded_dir(),
            archive: default_archive(),
            url: None,
        }
    }
}

/// External tool settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnsibleSettings {
    #[serde(default = "default_ansible_binary")]
    pub binary: String,

    /// Entry-point playbook, relative to the automation directory
    #[serde(default = "default_playbook")]
    pub playbook: String,
}

fn default_ansible_binary() -> String {
    "ansible-playbook".to_string()
}

fn default_playbook() -> String {
    "main.yml".to_string()
}

impl Default for AnsibleSettings {
    fn default() -> Self {
        Self {
            binary: default_ansible_binary(),
            playbook: default_playbook(),
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

//! Playbook extra variables
//!
//! Variables are typed: recognized names come from [`ExtraVar`], anything else
//! must be added explicitly through [`ExtraVariables::pass_through`]. Absent
//! values are skipped, so nothing is ever rendered as `None` or `null`.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};

use crate::errors::DeployError;

/// Placeholder shown instead of sensitive values in logs
pub const REDACTED: &str = "********";

/// Recognized extra variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraVar {
    ServiceName,
    JarTimestamp,
    ArtifactBucket,
    AwsAccessKeyId,
    AwsSecretAccessKey,
    AwsDefaultRegion,
    Site,
    AppUser,
    DatasourceUrl,
    DbUsername,
    DbPassword,
}

impl ExtraVar {
    pub const ALL: [ExtraVar; 11] = [
        ExtraVar::ServiceName,
        ExtraVar::JarTimestamp,
        ExtraVar::ArtifactBucket,
        ExtraVar::AwsAccessKeyId,
        ExtraVar::AwsSecretAccessKey,
        ExtraVar::AwsDefaultRegion,
        ExtraVar::Site,
        ExtraVar::AppUser,
        ExtraVar::DatasourceUrl,
        ExtraVar::DbUsername,
        ExtraVar::DbPassword,
    ];

    /// Variable name as seen by the playbook
    pub fn name(self) -> &'static str {
        match self {
            ExtraVar::ServiceName => "service_name",
            ExtraVar::JarTimestamp => "jar_timestamp",
            ExtraVar::ArtifactBucket => "aws_s3_bucket_repository",
            ExtraVar::AwsAccessKeyId => "aws_access_key_id",
            ExtraVar::AwsSecretAccessKey => "aws_secret_access_key",
            ExtraVar::AwsDefaultRegion => "aws_default_region",
            ExtraVar::Site => "site",
            ExtraVar::AppUser => "app_user",
            ExtraVar::DatasourceUrl => "datasource_url",
            ExtraVar::DbUsername => "db_username",
            ExtraVar::DbPassword => "db_password",
        }
    }

    /// Look up a recognized variable by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|var| var.name() == name)
    }
}

#[derive(Debug, Clone)]
enum VarName {
    Known(ExtraVar),
    PassThrough(String),
}

impl VarName {
    fn as_str(&self) -> &str {
        match self {
            VarName::Known(var) => var.name(),
            VarName::PassThrough(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
enum VarValue {
    Plain(String),
    Secret(SecretString),
}

impl VarValue {
    fn expose(&self) -> &str {
        match self {
            VarValue::Plain(value) => value,
            VarValue::Secret(value) => value.expose_secret(),
        }
    }
}

/// Ordered extra variables for one invocation
#[derive(Debug, Clone, Default)]
pub struct ExtraVariables {
    entries: Vec<(VarName, VarValue)>,
}

impl ExtraVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a recognized variable; `None` leaves it out
    pub fn set(&mut self, var: ExtraVar, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.upsert(VarName::Known(var), VarValue::Plain(value.into()));
        }
    }

    /// Set a recognized variable whose value must never be logged
    pub fn set_secret(&mut self, var: ExtraVar, value: Option<&SecretString>) {
        if let Some(value) = value {
            self.upsert(VarName::Known(var), VarValue::Secret(value.clone()));
        }
    }

    /// Add a variable outside the recognized set.
    ///
    /// The name must be a plain identifier and must not shadow a recognized
    /// variable.
    pub fn pass_through(&mut self, name: &str, value: Option<String>) -> Result<(), DeployError> {
        if !is_identifier(name) {
            return Err(DeployError::ValidationError(format!(
                "Invalid extra variable name: {}",
                name
            )));
        }
        if ExtraVar::from_name(name).is_some() {
            return Err(DeployError::ValidationError(format!(
                "Extra variable {} cannot be overridden",
                name
            )));
        }
        if let Some(value) = value {
            self.upsert(VarName::PassThrough(name.to_string()), VarValue::Plain(value));
        }
        Ok(())
    }

    fn upsert(&mut self, name: VarName, value: VarValue) {
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.as_str() == name.as_str())
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variable names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Value of a variable, secrets included
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.as_str() == name)
            .map(|(_, value)| value.expose())
    }

    /// Values that must not appear in logs or responses
    pub fn secret_values(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(_, value)| match value {
                VarValue::Secret(secret) => Some(secret.expose_secret()),
                VarValue::Plain(_) => None,
            })
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Command line arguments, one `-e` pair per variable
    pub fn to_args(&self) -> Vec<String> {
        self.render(false)
    }

    /// Same as [`Self::to_args`] with sensitive values masked
    pub fn to_redacted_args(&self) -> Vec<String> {
        self.render(true)
    }

    fn render(&self, redact: bool) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (name, value) in &self.entries {
            let shown = match value {
                VarValue::Secret(_) if redact => REDACTED,
                _ => value.expose(),
            };
            let mut object = Map::new();
            object.insert(name.as_str().to_string(), Value::String(shown.to_string()));
            args.push("-e".to_string());
            args.push(Value::Object(object).to_string());
        }
        args
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

//! Deployment pipeline
//!
//! One run: workspace, credentials, bundle and key, inventory, tool run,
//! report. The workspace is released on every path.

use std::sync::Arc;

use openapi_server::models::DeployRequestBody;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::deploy::credentials;
use crate::deploy::executor::{Invocation, ProcessExecutor};
use crate::deploy::inventory;
use crate::deploy::reporter::{self, DeployResponse};
use crate::deploy::stager::{BundleSource, BundleStager};
use crate::deploy::workspace::Workspace;
use crate::errors::DeployError;
use crate::models::deployment::{extract_body, DeploymentRequest, SiteCredentials};
use crate::models::extra_vars::{ExtraVar, ExtraVariables};
use crate::secrets::backend::SecretBackend;
use crate::secrets::extension::ExtensionClient;
use crate::secrets::parameter_store::ParameterStoreBackend;
use crate::secrets::resolver::SecretResolver;
use crate::secrets::secrets_manager::SecretsManagerBackend;
use crate::storage::settings::{SecretBackendKind, Settings};

/// Runs deployments. Shared read-only between concurrent runs.
pub struct Deployer {
    settings: Arc<Settings>,
    resolver: SecretResolver,
    stager: BundleStager,
    executor: ProcessExecutor,
}

impl Deployer {
    pub fn new(
        settings: Arc<Settings>,
        backend: Arc<dyn SecretBackend>,
        stager: BundleStager,
        executor: ProcessExecutor,
    ) -> Self {
        let resolver = SecretResolver::new(
            backend,
            &settings.secrets.ssh_key_id(),
            settings.secrets.ssh_key_encoding,
        );
        Self {
            settings,
            resolver,
            stager,
            executor,
        }
    }

    /// Build a deployer wired to the configured secret store and bundle source
    pub fn from_settings(settings: Settings) -> Result<Self, DeployError> {
        let client = Arc::new(ExtensionClient::new(
            &settings.secrets.extension_url,
            settings.cloud.session_token.clone(),
        )?);
        let backend: Arc<dyn SecretBackend> = match settings.secrets.backend {
            SecretBackendKind::SecretsManager => {
                Arc::new(SecretsManagerBackend::new(client, &settings.secrets.prefix))
            }
            SecretBackendKind::ParameterStore => {
                Arc::new(ParameterStoreBackend::new(client, &settings.secrets.prefix))
            }
        };
        let stager = BundleStager::new(BundleSource::from_settings(&settings.bundle)?)?;
        let executor = ProcessExecutor::new(&settings.ansible);
        info!(
            "Deployer ready: secrets={} bundle={:?}",
            backend.name(),
            stager.source()
        );
        Ok(Self::new(Arc::new(settings), backend, stager, executor))
    }

    /// Handle a raw inbound event, enveloped or not
    pub async fn handle_event(&self, event: Value) -> DeployResponse {
        match extract_body(event) {
            Ok(body) => self.handle(body).await,
            Err(e) => {
                warn!("Rejected event: {}", e);
                reporter::report_error(&e)
            }
        }
    }

    /// Validate a request body and deploy it
    pub async fn handle(&self, body: DeployRequestBody) -> DeployResponse {
        match DeploymentRequest::from_body(body, &self.settings) {
            Ok(request) => self.deploy(&request).await,
            Err(e) => {
                warn!("Rejected request: {}", e);
                reporter::report_error(&e)
            }
        }
    }

    /// Run one validated deployment
    pub async fn deploy(&self, request: &DeploymentRequest) -> DeployResponse {
        info!(
            "Deploying {} ({}) to site {}",
            request.service_name, request.jar_timestamp, request.site
        );

        let workspace = match Workspace::acquire(&self.settings.workspace_root()).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Deployment failed: {}", e);
                return reporter::report_error(&e);
            }
        };

        let outcome = self.run(&workspace, request).await;
        workspace.release().await;

        match outcome {
            Ok(response) => {
                if response.is_success() {
                    info!("Deployment of {} succeeded", request.service_name);
                } else {
                    error!(
                        "Deployment of {} failed: {}",
                        request.service_name,
                        response.error().unwrap_or_default()
                    );
                }
                response
            }
            Err(e) => {
                error!("Deployment failed: {}", e);
                reporter::report_error(&e)
            }
        }
    }

    async fn run(
        &self,
        workspace: &Workspace,
        request: &DeploymentRequest,
    ) -> Result<DeployResponse, DeployError> {
        let credentials = self.resolver.resolve(&request.site).await?;

        let (automation_dir, key_path) = tokio::try_join!(
            self.stager.stage(workspace, request.bundle_url.as_ref()),
            credentials::write(workspace, &credentials.ssh_key),
        )?;

        let inventory = inventory::build(
            &automation_dir,
            &credentials.hostname,
            &credentials.username,
            &request.site,
        )
        .await?;

        let extra_vars = self.extra_vars(request, &credentials);
        let invocation = Invocation {
            automation_dir: &automation_dir,
            inventory: &inventory,
            private_key: Some(&key_path),
            extra_vars: &extra_vars,
            env: vec![(
                "AWS_DEFAULT_REGION".to_string(),
                self.settings.cloud.region.clone(),
            )],
        };
        let result = self.executor.run(&invocation).await;

        let mut secrets = extra_vars.secret_values();
        secrets.push(credentials.ssh_key.expose_secret());
        Ok(reporter::report(request, &credentials, &result, &secrets))
    }

    /// Variables handed to the playbook. Absent values are left out.
    pub fn extra_vars(
        &self,
        request: &DeploymentRequest,
        credentials: &SiteCredentials,
    ) -> ExtraVariables {
        let cloud = &self.settings.cloud;
        let mut vars = ExtraVariables::new();

        vars.set(ExtraVar::ServiceName, Some(&request.service_name));
        vars.set(ExtraVar::JarTimestamp, Some(&request.jar_timestamp));
        vars.set(
            ExtraVar::ArtifactBucket,
            request
                .artifact_bucket
                .clone()
                .or_else(|| cloud.artifact_bucket.clone()),
        );
        vars.set(ExtraVar::AwsAccessKeyId, cloud.access_key_id.clone());
        vars.set_secret(ExtraVar::AwsSecretAccessKey, cloud.secret_access_key.as_ref());
        vars.set(ExtraVar::AwsDefaultRegion, Some(&cloud.region));
        vars.set(ExtraVar::Site, Some(&request.site));
        vars.set(ExtraVar::AppUser, Some(&request.app_user));
        vars.set(ExtraVar::DatasourceUrl, credentials.datasource_url.clone());
        vars.set(ExtraVar::DbUsername, credentials.db_username.clone());
        vars.set_secret(ExtraVar::DbPassword, credentials.db_password.as_ref());

        for (name, value) in &request.extra_vars {
            if !self.settings.passthrough_vars.iter().any(|allowed| allowed == name) {
                warn!("Dropping extra variable {}: not in passthrough_vars", name);
                continue;
            }
            if let Err(e) = vars.pass_through(name, Some(value.clone())) {
                warn!("Dropping extra variable {}: {}", name, e);
            }
        }

        vars
    }
}

//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use openapi_server::models::{HealthResponse, VersionResponse};
use serde_json::Value;

use crate::deploy::reporter::{self, DeployResponse};
use crate::errors::DeployError;
use crate::server::state::ServerState;
use crate::utils::version_info;

impl IntoResponse for DeployResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "vm-deployer".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deployment trigger.
///
/// The body is parsed here rather than by an extractor so that malformed
/// JSON gets the same `{"error": ...}` shape as any other rejection.
pub async fn deploy_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> DeployResponse {
    let event: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(event) => event,
            Err(e) => {
                return reporter::report_error(&DeployError::ValidationError(format!(
                    "Invalid JSON body: {}",
                    e
                )))
            }
        }
    };

    state.deployer.handle_event(event).await
}

//! Result reporting
//!
//! Converts execution results and pipeline errors into the response returned
//! to the caller.

use openapi_server::models::{DeployFailureResponse, DeploySuccessResponse, ErrorResponse};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::deploy::executor::ExecutionResult;
use crate::errors::DeployError;
use crate::models::deployment::{DeploymentRequest, SiteCredentials};
use crate::models::extra_vars::REDACTED;
use crate::utils::tail;

/// stdout kept in a success response
pub const SUCCESS_OUTPUT_CHARS: usize = 2000;

/// stdout/stderr kept in a failure response
pub const FAILURE_OUTPUT_CHARS: usize = 4000;

const SUCCESS_MESSAGE: &str = "Deployment succeeded";

/// Status code and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct DeployResponse {
    pub status: u16,
    pub body: Value,
}

impl DeployResponse {
    fn new<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!("Failed to serialize response body: {}", e);
                Self {
                    status: 500,
                    body: json!({ "error": format!("Failed to serialize response: {}", e) }),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// `error` field of a failure body
    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// Build the response for a completed tool run.
///
/// `secrets` are values that must not leak through the captured output.
pub fn report(
    request: &DeploymentRequest,
    credentials: &SiteCredentials,
    result: &ExecutionResult,
    secrets: &[&str],
) -> DeployResponse {
    if result.success {
        return DeployResponse::new(
            200,
            &DeploySuccessResponse {
                message: SUCCESS_MESSAGE.to_string(),
                service_name: request.service_name.clone(),
                timestamp: request.jar_timestamp.clone(),
                site: request.site.clone(),
                target_vm: credentials.hostname.clone(),
                output_tail: masked_tail(&result.stdout_tail, SUCCESS_OUTPUT_CHARS, secrets),
            },
        );
    }

    let error = if result.timed_out {
        DeployError::ExecutionTimeout(result.limit.as_secs())
    } else {
        DeployError::ExecutionFailed(result.exit_code)
    };
    DeployResponse::new(
        500,
        &DeployFailureResponse {
            error: error.to_string(),
            stdout_tail: masked_tail(&result.stdout_tail, FAILURE_OUTPUT_CHARS, secrets),
            stderr_tail: masked_tail(&result.stderr_tail, FAILURE_OUTPUT_CHARS, secrets),
        },
    )
}

/// Build the response for an error raised before or around the tool run
pub fn report_error(error: &DeployError) -> DeployResponse {
    match error {
        DeployError::ValidationError(message) => DeployResponse::new(
            error.status_code(),
            &ErrorResponse {
                error: message.clone(),
            },
        ),
        _ => DeployResponse::new(
            error.status_code(),
            &DeployFailureResponse {
                error: error.to_string(),
                stdout_tail: String::new(),
                stderr_tail: String::new(),
            },
        ),
    }
}

fn masked_tail(text: &str, max_chars: usize, secrets: &[&str]) -> String {
    let mut masked = text.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        masked = masked.replace(secret, REDACTED);
    }
    tail(&masked, max_chars).to_string()
}

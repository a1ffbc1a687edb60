//! Non-streaming execution backend.
//!
//! Some deployments expose execution as a single request/response call
//! instead of the streaming channel. The coordinator treats the response
//! as one terminal `Final` outcome, and a transport-level error as
//! `Failed`.

use async_trait::async_trait;
use cellbook_core::ExecutionOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::ExecutionRequest;

/// Response of a non-streaming execution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Combined program output.
    pub output: String,
    /// Compile or runtime error text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time: f64,
    /// Process exit code.
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Convert into the terminal outcome applied to the cell.
    #[must_use]
    pub fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome::Final {
            output: self.output,
            error: self.error,
            execution_time: self.execution_time,
            exit_code: self.exit_code,
        }
    }
}

/// Backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout")]
    Timeout,
}

/// Trait for request/response execution backends.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run the request to completion and return its result.
    ///
    /// # Errors
    /// Returns error if the call cannot complete; the coordinator maps
    /// it to a `Failed` outcome on the originating cell.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, BackendError>;
}

/// Execution backend over the notebook API's run endpoint.
#[cfg(feature = "http")]
pub struct HttpExecutionBackend {
    client: reqwest::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpExecutionBackend {
    /// Create a backend rooted at the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ExecutionBackend for HttpExecutionBackend {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, BackendError> {
        #[derive(Serialize)]
        struct RunBody<'a> {
            code: &'a str,
            language: cellbook_core::Language,
            #[serde(skip_serializing_if = "Option::is_none")]
            stdin: Option<&'a str>,
        }

        let body = RunBody {
            code: &request.code,
            language: request.language,
            stdin: request.stdin.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/execution/run", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

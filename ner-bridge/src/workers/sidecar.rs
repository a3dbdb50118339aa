//! spaCy Sidecar Bridge for Entity Extraction
//!
//! This module provides the `SidecarRecognizer` struct that manages a Python
//! subprocess running a spaCy pipeline, communicating via Unix Domain Sockets
//! (UDS) with length-prefixed JSON messages.
//!
//! # Protocol
//!
//! - Request: `{"text": "...", "request_id": "..."}`
//! - Response: `{"entities": [{"text": "...", "label": "..."}], "request_id": "...", "error": null}`
//!
//! The worker echoes `request_id`; a response carrying any other id is
//! rejected and the connection is re-established before the next request.

use async_trait::async_trait;
use ner_core::{EntityRecognizer, EntitySpan, ExtractionError, ModelLoadError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::frame::{read_frame, write_frame};

/// Default socket path for the NER worker
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/ner_worker.sock";

/// Default path to the Python NER worker script
pub const DEFAULT_WORKER_SCRIPT: &str = "scripts/ner_worker.py";

/// Default spaCy pipeline
pub const DEFAULT_MODEL: &str = "en_core_web_trf";

/// Default interpreter used to run the worker script
pub const DEFAULT_PYTHON: &str = "python3";

/// Maximum time to wait for the worker to load its model and listen (in milliseconds)
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 120_000;

/// Maximum time a single extraction may take (in milliseconds)
pub const DEFAULT_INFER_TIMEOUT_MS: u64 = 30_000;

/// Interval between connection retry attempts (in milliseconds)
const CONNECTION_RETRY_INTERVAL_MS: u64 = 50;

/// Text sent through the pipeline once at startup
const HEALTH_PROBE_TEXT: &str = "Health check from the extraction service.";

/// Sidecar launch configuration
#[derive(Clone, Debug)]
pub struct SidecarConfig {
    pub python: String,
    pub script_path: String,
    pub socket_path: String,
    pub model: String,
    pub startup_timeout: Duration,
    pub infer_timeout: Duration,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            script_path: DEFAULT_WORKER_SCRIPT.to_string(),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            model: DEFAULT_MODEL.to_string(),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            infer_timeout: Duration::from_millis(DEFAULT_INFER_TIMEOUT_MS),
        }
    }
}

/// Extraction request sent to the worker
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InferenceRequest {
    /// Text to run through the pipeline
    pub text: String,

    /// Correlation id echoed back by the worker
    pub request_id: String,
}

impl InferenceRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Extraction result returned by the worker
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InferenceResponse {
    /// Entities in document order
    #[serde(default)]
    pub entities: Vec<EntitySpan>,

    /// Echo of the request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Processing time in milliseconds (if reported by worker)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    /// Error message if the pipeline failed on this text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InferenceResponse {
    /// Validate the response against the request it answers.
    pub fn into_entities(self, request_id: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        if let Some(received) = self.request_id {
            if received != request_id {
                return Err(ExtractionError::ResponseMismatch {
                    expected: request_id.to_string(),
                    received,
                });
            }
        }

        match self.error {
            Some(message) => Err(ExtractionError::Model(message)),
            None => Ok(self.entities),
        }
    }
}

/// spaCy worker process driven over a Unix socket
pub struct SidecarRecognizer {
    /// Handle to the spawned Python process
    process: Child,

    /// Connection to the worker; `None` after a transport failure
    socket: Option<UnixStream>,

    config: SidecarConfig,
}

impl SidecarRecognizer {
    /// Start the worker, wait for its model to load, and verify it answers.
    ///
    /// This method:
    /// 1. Removes any leftover socket file from previous runs
    /// 2. Spawns the Python worker, which loads the spaCy pipeline
    /// 3. Waits for the worker to listen on the socket
    /// 4. Sends a health probe through the pipeline
    pub async fn load(config: SidecarConfig) -> Result<Self, ModelLoadError> {
        info!(
            socket_path = %config.socket_path,
            script_path = %config.script_path,
            model = %config.model,
            "Starting NER worker"
        );

        if Path::new(&config.socket_path).exists() {
            debug!(socket_path = %config.socket_path, "Removing existing socket file");
            let _ = std::fs::remove_file(&config.socket_path);
        }

        let mut child = Command::new(&config.python)
            .arg(&config.script_path)
            .arg(&config.socket_path)
            .arg(&config.model)
            .kill_on_drop(true)
            .spawn()
            .map_err(ModelLoadError::Spawn)?;

        info!(pid = child.id(), "NER worker process spawned");

        let socket = Self::connect_with_retry(&config, &mut child).await?;

        info!(socket_path = %config.socket_path, "Connected to NER worker socket");

        let mut recognizer = Self {
            process: child,
            socket: Some(socket),
            config,
        };
        recognizer.health_check().await?;

        Ok(recognizer)
    }

    /// Attempt to connect to the worker socket until the startup timeout
    async fn connect_with_retry(
        config: &SidecarConfig,
        child: &mut Child,
    ) -> Result<UnixStream, ModelLoadError> {
        let start = Instant::now();
        let retry_interval = Duration::from_millis(CONNECTION_RETRY_INTERVAL_MS);

        loop {
            match UnixStream::connect(&config.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if let Ok(Some(status)) = child.try_wait() {
                        error!(%status, "NER worker exited before listening");
                        return Err(ModelLoadError::WorkerExited(status.to_string()));
                    }

                    if start.elapsed() > config.startup_timeout {
                        error!(
                            socket_path = %config.socket_path,
                            elapsed_ms = start.elapsed().as_millis(),
                            "Connection timeout waiting for NER worker"
                        );
                        return Err(ModelLoadError::StartupTimeout(config.startup_timeout));
                    }

                    debug!(
                        socket_path = %config.socket_path,
                        error = %e,
                        pid = ?child.id(),
                        "Socket not ready, retrying..."
                    );

                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    async fn health_check(&mut self) -> Result<(), ModelLoadError> {
        match self.infer(HEALTH_PROBE_TEXT).await {
            Ok(spans) => {
                debug!(entities = spans.len(), "Health check passed");
                Ok(())
            }
            Err(e) => Err(ModelLoadError::HealthCheckFailed(e.to_string())),
        }
    }

    /// One request/response exchange on the current connection.
    async fn exchange(
        &mut self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, ExtractionError> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| ExtractionError::Ipc("not connected to worker".to_string()))?;

        let request_bytes = serde_json::to_vec(request)?;
        write_frame(socket, &request_bytes)
            .await
            .map_err(|e| ExtractionError::Ipc(format!("Failed to write request: {e}")))?;

        debug!(payload_len = request_bytes.len(), "Request sent, awaiting response");

        let response_bytes = read_frame(socket)
            .await
            .map_err(|e| ExtractionError::Ipc(format!("Failed to read response: {e}")))?;

        debug!(response_len = response_bytes.len(), "Response received");

        Ok(serde_json::from_slice(&response_bytes)?)
    }

    /// Run `text` through the worker with the configured timeout.
    ///
    /// Any failure other than a model-reported error drops the connection so
    /// a late response cannot be read as the answer to a later request.
    async fn infer(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        if !self.is_alive() {
            return Err(ExtractionError::WorkerExited);
        }
        if self.socket.is_none() {
            self.reconnect().await?;
        }

        let request = InferenceRequest::new(text);
        let timeout = self.config.infer_timeout;

        let outcome = match tokio::time::timeout(timeout, self.exchange(&request)).await {
            Ok(result) => result.and_then(|response| {
                if let Some(ms) = response.processing_time_ms {
                    debug!(processing_time_ms = ms, "Worker processing time");
                }
                response.into_entities(&request.request_id)
            }),
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis(),
                    request_id = %request.request_id,
                    "Inference request timed out"
                );
                Err(ExtractionError::Timeout(timeout))
            }
        };

        if let Err(e) = &outcome {
            if !matches!(e, ExtractionError::Model(_)) {
                warn!(error = %e, "Dropping worker connection after failure");
                self.socket = None;
            }
        }

        outcome
    }

    /// Open a fresh connection to the running worker.
    async fn reconnect(&mut self) -> Result<(), ExtractionError> {
        let stream = UnixStream::connect(&self.config.socket_path)
            .await
            .map_err(|e| ExtractionError::Ipc(format!("Failed to reconnect: {e}")))?;
        info!(socket_path = %self.config.socket_path, "Reconnected to NER worker");
        self.socket = Some(stream);
        Ok(())
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker (if still running).
    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    /// Get the socket path being used for IPC.
    pub fn socket_path(&self) -> &str {
        &self.config.socket_path
    }
}

#[async_trait]
impl EntityRecognizer for SidecarRecognizer {
    fn name(&self) -> &str {
        "spacy-sidecar"
    }

    async fn extract(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        self.infer(text).await
    }

    async fn shutdown(&mut self) {
        info!(pid = self.process.id(), "Shutting down NER worker");

        self.socket = None;
        if let Err(e) = self.process.kill().await {
            warn!(error = %e, "Error during worker shutdown");
        }

        if Path::new(&self.config.socket_path).exists() {
            let _ = std::fs::remove_file(&self.config.socket_path);
        }
    }
}

impl Drop for SidecarRecognizer {
    fn drop(&mut self) {
        // kill_on_drop(true) terminates the child
        if let Some(pid) = self.process.id() {
            debug!(pid = pid, "Dropping SidecarRecognizer, ensuring process cleanup");
        }
    }
}

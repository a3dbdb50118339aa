//! The model boundary: anything that turns text into labeled spans.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::entity::EntitySpan;

/// Errors raised while bringing a model up at startup.
///
/// All of these are fatal: the service cannot serve without a model.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Failed to spawn model worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Model worker did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("Model worker exited during startup with status: {0}")]
    WorkerExited(String),

    #[error("Model worker health check failed: {0}")]
    HealthCheckFailed(String),
}

/// Errors raised while extracting entities from a single request.
///
/// These are recoverable: the request gets an error reply and the service
/// keeps serving.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Model reported an error: {0}")]
    Model(String),

    #[error("IPC communication error: {0}")]
    Ipc(String),

    #[error("Failed to encode or decode model payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Response id {received} does not match request id {expected}")]
    ResponseMismatch { expected: String, received: String },

    #[error("Inference timeout: worker did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Model worker is no longer running")]
    WorkerExited,
}

/// A loaded named-entity recognition model.
///
/// Implementations are constructed once at startup (that is where the
/// expensive model load happens) and then called once per request.
#[async_trait]
pub trait EntityRecognizer: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// All entities found in `text`, in document order.
    async fn extract(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError>;

    /// Release model resources. Called once when the service stops.
    async fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExtractionError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));

        let err = ExtractionError::ResponseMismatch {
            expected: "a".to_string(),
            received: "b".to_string(),
        };
        assert!(err.to_string().contains("does not match"));

        let err = ModelLoadError::Invalid("no entities".to_string());
        assert!(err.to_string().contains("no entities"));
    }
}

//! Service-level error types.

use ner_core::ModelLoadError;
use thiserror::Error;

use crate::endpoint::{BindError, EndpointError};
use crate::service::ServiceState;

/// Errors that stop the service.
///
/// Per-request failures (malformed payloads, extraction faults) never reach
/// this type: they are answered on the wire and the loop continues.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Failed to load model: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("Transport endpoint failed: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Illegal state transition from {from:?} to {to:?}")]
    IllegalTransition { from: ServiceState, to: ServiceState },
}

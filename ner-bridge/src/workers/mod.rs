//! Worker modules for entity extraction
//!
//! This module contains the `SidecarRecognizer` implementation for IPC-based
//! NER using a Python sidecar process.

mod frame;
mod sidecar;

pub use sidecar::{InferenceRequest, InferenceResponse, SidecarConfig, SidecarRecognizer};

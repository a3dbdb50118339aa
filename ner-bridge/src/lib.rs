//! NER Bridge - spaCy sidecar for entity extraction
//!
//! This crate provides a `SidecarRecognizer` that manages a Python subprocess
//! running a spaCy pipeline, communicating via Unix Domain Sockets (UDS).
//!
//! # Architecture
//!
//! The model runs in a separate Python process so that:
//! - The pipeline is loaded once and stays resident for the process lifetime
//! - A crash inside the model surfaces as an extraction error, not a service crash
//! - The Rust side stays free of Python bindings
//!
//! # Example
//!
//! ```ignore
//! use ner_bridge::{SidecarConfig, SidecarRecognizer};
//! use ner_core::EntityRecognizer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut recognizer = SidecarRecognizer::load(SidecarConfig::default()).await?;
//!
//!     let spans = recognizer.extract("Acme Corp announced new products today.").await?;
//!     println!("{spans:?}");
//!
//!     recognizer.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod workers;

// Re-export main types for convenience
pub use workers::{InferenceRequest, InferenceResponse, SidecarConfig, SidecarRecognizer};

//! NER Core Library
//!
//! Provides the entity extraction side of the service:
//! - `EntitySpan` and organization selection
//! - The `EntityRecognizer` trait implemented by every model backend
//! - A dictionary-backed recognizer (`GazetteerRecognizer`)
//! - Tracing initialization shared by the binaries

pub mod entity;
pub mod gazetteer;
pub mod recognizer;

// Re-export commonly used items
pub use entity::{find_first_organization, is_organization_label, EntitySpan};
pub use gazetteer::{GazetteerEntry, GazetteerModel, GazetteerRecognizer};
pub use recognizer::{EntityRecognizer, ExtractionError, ModelLoadError};

/// Initialize tracing with standard configuration
pub fn init_tracing(service_name: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize tracing with JSON output (for production)
pub fn init_tracing_json(service_name: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

fn default_directives(service_name: &str) -> String {
    format!(
        "{}=info,ner_bridge=info,ner_core=info",
        service_name.replace('-', "_")
    )
}

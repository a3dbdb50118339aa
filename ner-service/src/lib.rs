//! Organization extraction service
//!
//! Listens on a single ZeroMQ REP socket, accepts `{"body": "<text>"}`,
//! runs named-entity recognition over the text and answers with the first
//! organization found:
//! - `{"company": "<name>"}` when an organization is present
//! - `{}` when none is
//! - `{"error": "..."}` when the request is malformed or extraction fails
//!
//! Exactly one request is in flight at a time.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod service;
pub mod shutdown;

pub use client::{ClientError, NerClient};
pub use config::{Backend, ConfigError, LogFormat, ServiceConfig, DEFAULT_BIND_ADDRESS};
pub use endpoint::{BindError, EndpointError, ReplyEndpoint};
pub use error::ServiceError;
pub use service::{NerService, Outcome, ServiceState, ServiceStats};

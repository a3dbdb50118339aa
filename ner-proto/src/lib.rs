//! Wire contract for the organization extraction service.
//!
//! Requests and replies travel as single JSON frames:
//! - Request: `{"body": "<text>"}`
//! - Reply: `{}`, `{"company": "<name>"}` or `{"error": "<reason>"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error string sent back when a request cannot be decoded.
pub const MALFORMED_REQUEST: &str = "malformed request";

/// Error string sent back when the extractor fails on a request.
pub const EXTRACTION_FAILED: &str = "extraction failed";

/// Text submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub body: String,
}

impl Request {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Reply to a single request.
///
/// Both fields absent means no organization was found, which is a valid
/// outcome and not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// `{}`
    pub fn empty() -> Self {
        Self::default()
    }

    /// `{"company": name}`
    pub fn company(name: impl Into<String>) -> Self {
        Self {
            company: Some(name.into()),
            error: None,
        }
    }

    /// `{"error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            company: None,
            error: Some(message.into()),
        }
    }

    pub fn from_organization(organization: Option<String>) -> Self {
        organization.map_or_else(Self::empty, Self::company)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Reasons a received frame is not a usable `Request`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRequest {
    #[error("request is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("request is not a JSON object")]
    NotAnObject,

    #[error("request has no `body` field")]
    MissingBody,

    #[error("request `body` is not a string")]
    BodyNotText,

    #[error("request has {0} frames, expected exactly one")]
    FrameCount(usize),
}

/// Decode a raw frame into a `Request`.
///
/// Unknown fields are ignored. An empty `body` string is accepted.
pub fn decode_request(frame: &[u8]) -> Result<Request, MalformedRequest> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|e| MalformedRequest::InvalidJson(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(MalformedRequest::NotAnObject);
    };

    match fields.remove("body") {
        None => Err(MalformedRequest::MissingBody),
        Some(Value::String(body)) => Ok(Request { body }),
        Some(_) => Err(MalformedRequest::BodyNotText),
    }
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(request)
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(reply)
}

pub fn decode_reply(frame: &[u8]) -> Result<Reply, serde_json::Error> {
    serde_json::from_slice(frame)
}

//! ZeroMQ REP endpoint with enforced request/reply alternation.
//!
//! A REP socket must answer every received message exactly once before the
//! next receive. The endpoint tracks whether a reply is owed and refuses out
//! of order calls instead of corrupting the channel.

use bytes::Bytes;
use ner_proto::{decode_request, encode_reply, MalformedRequest, Reply, Request};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeromq::{RepSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

/// The address could not be bound at startup.
#[derive(Error, Debug)]
#[error("Failed to bind {address}: {reason}")]
pub struct BindError {
    pub address: String,
    pub reason: String,
}

/// Errors from an already bound endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(&'static str),

    #[error("Failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Endpoint is closed")]
    Closed,
}

/// A bound request/reply endpoint.
pub struct ReplyEndpoint {
    socket: Option<RepSocket>,
    local_endpoint: String,
    reply_pending: bool,
}

impl ReplyEndpoint {
    /// Bind a REP socket at `address`, e.g. `tcp://127.0.0.1:5555`.
    ///
    /// Port 0 binds an ephemeral port; `local_endpoint()` reports the
    /// resolved address.
    pub async fn bind(address: &str) -> Result<Self, BindError> {
        let mut socket = RepSocket::new();
        let endpoint = socket.bind(address).await.map_err(|e| BindError {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let local_endpoint = endpoint.to_string();
        info!(address = %local_endpoint, "Reply endpoint bound");

        Ok(Self {
            socket: Some(socket),
            local_endpoint,
            reply_pending: false,
        })
    }

    pub fn local_endpoint(&self) -> &str {
        &self.local_endpoint
    }

    /// Whether a request has been received and not yet answered.
    pub fn reply_pending(&self) -> bool {
        self.reply_pending
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Block until a message arrives.
    ///
    /// The outer error is a transport failure. The inner error is a payload
    /// that could not be decoded; it still owes a reply.
    pub async fn receive(&mut self) -> Result<Result<Request, MalformedRequest>, EndpointError> {
        if self.reply_pending {
            return Err(EndpointError::ProtocolViolation(
                "receive called while a reply is still owed",
            ));
        }
        let socket = self.socket.as_mut().ok_or(EndpointError::Closed)?;

        let message = socket.recv().await.map_err(transport)?;
        self.reply_pending = true;

        debug!(frames = message.len(), "Message received");
        Ok(decode_message(&message))
    }

    /// Answer the pending request.
    ///
    /// The exchange is over once this returns, whether or not the transport
    /// delivered the reply.
    pub async fn send(&mut self, reply: &Reply) -> Result<(), EndpointError> {
        if !self.reply_pending {
            return Err(EndpointError::ProtocolViolation(
                "send called without a pending request",
            ));
        }
        let socket = self.socket.as_mut().ok_or(EndpointError::Closed)?;

        let payload = encode_reply(reply)?;
        self.reply_pending = false;
        socket
            .send(ZmqMessage::from(Bytes::from(payload)))
            .await
            .map_err(transport)?;

        Ok(())
    }

    /// Close the socket and release the transport context. Idempotent.
    pub async fn close(&mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };

        if self.reply_pending {
            warn!("Closing endpoint with an unanswered request");
            self.reply_pending = false;
        }

        let errors = socket.close().await;
        for e in &errors {
            warn!(error = %e, "Error while closing endpoint");
        }
        info!(address = %self.local_endpoint, "Reply endpoint closed");
    }
}

fn transport(e: ZmqError) -> EndpointError {
    EndpointError::Transport(e.to_string())
}

fn decode_message(message: &ZmqMessage) -> Result<Request, MalformedRequest> {
    if message.len() != 1 {
        return Err(MalformedRequest::FrameCount(message.len()));
    }
    message
        .get(0)
        .map_or(Err(MalformedRequest::FrameCount(0)), |frame| {
            decode_request(frame)
        })
}

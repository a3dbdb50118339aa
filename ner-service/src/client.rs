//! Client side of the request/reply contract.

use bytes::Bytes;
use ner_proto::{decode_reply, encode_request, Reply, Request};
use thiserror::Error;
use tracing::debug;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode reply: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Reply carried no frames")]
    EmptyReply,

    #[error("Service reported an error: {0}")]
    Service(String),
}

fn transport(e: ZmqError) -> ClientError {
    ClientError::Transport(e.to_string())
}

/// A REQ socket connected to the service.
pub struct NerClient {
    socket: ReqSocket,
}

impl NerClient {
    pub async fn connect(address: &str) -> Result<Self, ClientError> {
        let mut socket = ReqSocket::new();
        socket.connect(address).await.map_err(transport)?;
        debug!(address, "Connected to NER service");

        Ok(Self { socket })
    }

    /// Send one request and wait for its reply.
    pub async fn request(&mut self, request: &Request) -> Result<Reply, ClientError> {
        let payload = encode_request(request).map_err(ClientError::Encode)?;
        self.send_raw(payload).await
    }

    /// Send an arbitrary frame and wait for the reply.
    pub async fn send_raw(&mut self, payload: Vec<u8>) -> Result<Reply, ClientError> {
        self.socket
            .send(ZmqMessage::from(Bytes::from(payload)))
            .await
            .map_err(transport)?;
        let message = self.socket.recv().await.map_err(transport)?;

        let frame = message.get(0).ok_or(ClientError::EmptyReply)?;
        decode_reply(frame).map_err(ClientError::Decode)
    }

    /// First organization named in `text`, if any.
    pub async fn find_company(&mut self, text: &str) -> Result<Option<String>, ClientError> {
        let reply = self.request(&Request::new(text)).await?;
        match reply.error {
            Some(message) => Err(ClientError::Service(message)),
            None => Ok(reply.company),
        }
    }

    pub async fn close(self) {
        let _ = self.socket.close().await;
    }
}

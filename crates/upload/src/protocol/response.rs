//! Response side of a request.
//!
//! [`UploadResponse`] owns the host's [`ResponseSender`] and sends through it at most once.
//! It can be armed with a [`RequestEnd`]: the next send then waits for the request body to
//! be fully received before handing the response to the original sender.

use std::fmt;
use std::mem;

use async_trait::async_trait;
use futures::channel::oneshot;
use http::{HeaderValue, Response, StatusCode};
use tracing::{debug, warn};

use crate::protocol::{RequestEnd, ResponseBody, SendError};

/// Transmits a finished response to the client.
///
/// Implemented by the host connection. `send` consumes the sender, so a sender transmits
/// at most one response.
#[async_trait]
pub trait ResponseSender: Send {
    async fn send(self: Box<Self>, response: Response<ResponseBody>) -> Result<(), SendError>;
}

/// A [`ResponseSender`] handing the response to whoever holds the paired receiver.
#[derive(Debug)]
pub struct ChannelSender {
    inner: oneshot::Sender<Response<ResponseBody>>,
}

#[async_trait]
impl ResponseSender for ChannelSender {
    async fn send(self: Box<Self>, response: Response<ResponseBody>) -> Result<(), SendError> {
        self.inner.send(response).map_err(|_response| SendError::transmit("response receiver has been dropped"))
    }
}

enum SendGate {
    Ready(Box<dyn ResponseSender>),
    Deferred { sender: Box<dyn ResponseSender>, request_end: RequestEnd },
    Sent,
}

/// The response half handed through the middleware chain.
pub struct UploadResponse {
    status: StatusCode,
    gate: SendGate,
}

impl UploadResponse {
    pub fn new(sender: impl ResponseSender + 'static) -> Self {
        Self { status: StatusCode::OK, gate: SendGate::Ready(Box::new(sender)) }
    }

    /// Creates a response whose sent message can be awaited on the returned receiver.
    pub fn channel() -> (Self, oneshot::Receiver<Response<ResponseBody>>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(ChannelSender { inner: tx }), rx)
    }

    /// The status used by [`send_body`](Self::send_body) and by error handlers.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Returns true if the next send waits for the request body to end.
    pub fn is_deferred(&self) -> bool {
        matches!(self.gate, SendGate::Deferred { .. })
    }

    pub fn is_sent(&self) -> bool {
        matches!(self.gate, SendGate::Sent)
    }

    /// Arms the gate: the next send waits until `request_end` fires.
    ///
    /// Does nothing if the response was already sent or is already deferred.
    pub fn defer_until(&mut self, request_end: RequestEnd) {
        self.gate = match mem::replace(&mut self.gate, SendGate::Sent) {
            SendGate::Ready(sender) => SendGate::Deferred { sender, request_end },
            other => other,
        };
    }

    /// Sends `response` through the original sender.
    ///
    /// When deferred, waits for the request body to end first. If the body fails or is
    /// dropped before its end the response is discarded and [`SendError::RequestAborted`]
    /// is returned. Any send after the first returns [`SendError::AlreadySent`].
    pub async fn send(&mut self, response: Response<ResponseBody>) -> Result<(), SendError> {
        let sender = match mem::replace(&mut self.gate, SendGate::Sent) {
            SendGate::Ready(sender) => sender,
            SendGate::Deferred { sender, request_end } => {
                debug!("response deferred until request body ends");
                if let Err(e) = request_end.wait().await {
                    warn!(cause = %e, "request body never ended, response not sent");
                    return Err(e);
                }
                sender
            }
            SendGate::Sent => {
                warn!("response already sent, ignoring another send");
                return Err(SendError::AlreadySent);
            }
        };

        sender.send(response).await
    }

    /// Sends `body` with the current status.
    pub async fn send_body(&mut self, body: impl Into<ResponseBody>) -> Result<(), SendError> {
        let mut response = Response::new(body.into());
        *response.status_mut() = self.status;
        self.send(response).await
    }

    /// Sends `text` as `text/plain` with the current status.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), SendError> {
        let mut response = Response::new(ResponseBody::from(text.into()));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.send(response).await
    }
}

impl fmt::Debug for UploadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = match self.gate {
            SendGate::Ready(_) => "ready",
            SendGate::Deferred { .. } => "deferred",
            SendGate::Sent => "sent",
        };
        f.debug_struct("UploadResponse").field("status", &self.status).field("gate", &gate).finish()
    }
}

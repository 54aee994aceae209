//! Request body streaming with completion tracking.
//!
//! Every request body is wrapped in an [`ObservedBody`] as soon as the request is created.
//! The wrapper publishes the body's progress on a `watch` channel, and [`RequestEnd`] is the
//! subscriber side of that channel. Because the channel keeps its last value, a subscriber
//! created after the body already ended still observes the completion.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use pin_project_lite::pin_project;
use tokio::sync::watch;

use crate::protocol::{BoxError, SendError};

/// The raw request body handed to processors and handlers.
pub type ReqBody = ObservedBody<UnsyncBoxBody<Bytes, BoxError>>;

/// Progress of a request body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EndState {
    /// The body has not been read to its end yet
    Pending,
    /// The body has been read to its end
    Ended,
    /// Reading the body failed, the end will never be observed
    Failed,
}

pin_project! {
    /// A body that reports when it has been read to its end.
    ///
    /// The end state is published at most once: the first `Ready(None)` marks the body as
    /// [`EndState::Ended`], the first error marks it as [`EndState::Failed`].
    pub struct ObservedBody<B> {
        #[pin]
        inner: B,
        end: watch::Sender<EndState>,
    }
}

impl<B> ObservedBody<B> {
    /// Wraps `inner` and returns the completion signal subscribed to it.
    pub fn new(inner: B) -> (Self, RequestEnd) {
        let (end, receiver) = watch::channel(EndState::Pending);
        (Self { inner, end }, RequestEnd { state: receiver })
    }

    /// Creates another subscriber to this body's completion.
    pub fn end_signal(&self) -> RequestEnd {
        RequestEnd { state: self.end.subscribe() }
    }
}

impl<B: Body> Body for ObservedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Err(e)) => {
                publish(this.end, EndState::Failed);
                Poll::Ready(Some(Err(e)))
            }
            None => {
                publish(this.end, EndState::Ended);
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> fmt::Debug for ObservedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedBody").field("end", &*self.end.borrow()).finish_non_exhaustive()
    }
}

fn publish(end: &watch::Sender<EndState>, state: EndState) {
    end.send_if_modified(|current| {
        if *current == EndState::Pending {
            *current = state;
            true
        } else {
            false
        }
    });
}

/// Subscriber side of a request body's completion.
#[derive(Debug, Clone)]
pub struct RequestEnd {
    state: watch::Receiver<EndState>,
}

impl RequestEnd {
    pub fn state(&self) -> EndState {
        *self.state.borrow()
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        self.state() == EndState::Ended
    }

    /// Waits until the request body has been read to its end.
    ///
    /// Returns [`SendError::RequestAborted`] when the body failed, or when it was dropped
    /// before reaching its end: in both cases the end will never come.
    pub async fn wait(mut self) -> Result<(), SendError> {
        let ended = match self.state.wait_for(|state| *state != EndState::Pending).await {
            Ok(state) => *state == EndState::Ended,
            Err(_closed) => false,
        };

        if ended { Ok(()) } else { Err(SendError::RequestAborted) }
    }
}

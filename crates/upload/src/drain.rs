//! Discarding request bodies nobody will read.
//!
//! A body the application does not hand to a consumer must still be read to its end,
//! otherwise the connection stalls and deferred responses never go out. Errors are
//! swallowed here: once a body is discarded nobody is left to observe them.

use bytes::Buf;
use http_body::Body;
use http_body_util::BodyExt;
use std::fmt::Display;
use tracing::{debug, info};

/// Reads `body` to its end in a background task, discarding its data and errors.
///
/// Returns immediately. Taking the body by value means a body can only be drained once.
/// Must be called within a tokio runtime.
pub fn drain<B>(body: B)
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    tokio::spawn(skip_body(body));
}

/// Reads `body` until its end or its first error, returning the number of bytes skipped.
pub async fn skip_body<B>(body: B) -> usize
where
    B: Body,
    B::Error: Display,
{
    let mut body = Box::pin(body);
    let mut size: usize = 0;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    size += data.remaining();
                }
            }
            Err(e) => {
                debug!(cause = %e, size, "request body failed while skipping, stop reading");
                return size;
            }
        }
    }

    if size > 0 {
        info!(size, "skip request body");
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ObservedBody;
    use bytes::Bytes;
    use futures::SinkExt;
    use futures::channel::mpsc;
    use http_body::Frame;
    use http_body_util::{Full, StreamBody};
    use std::io;
    use std::time::Duration;

    #[tokio::test]
    async fn skips_whole_body() {
        let chunks: Vec<Result<_, io::Error>> =
            vec![Ok(Frame::data(Bytes::from_static(b"hello "))), Ok(Frame::data(Bytes::from_static(b"world")))];
        let (body, end) = ObservedBody::new(StreamBody::new(futures::stream::iter(chunks)));

        assert_eq!(skip_body(body).await, 11);
        assert!(end.is_ended());
    }

    #[tokio::test]
    async fn stops_at_first_error_without_failing() {
        let chunks: Vec<Result<_, io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Frame::data(Bytes::from_static(b"never read"))),
        ];

        assert_eq!(skip_body(StreamBody::new(futures::stream::iter(chunks))).await, 7);
    }

    #[tokio::test]
    async fn drain_releases_stream_that_errors_after_partial_data() {
        let (mut tx, rx) = mpsc::channel::<Result<Frame<Bytes>, io::Error>>(4);
        tx.send(Ok(Frame::data(Bytes::from_static(b"partial")))).await.unwrap();
        tx.send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "aborted"))).await.unwrap();

        drain(StreamBody::new(rx));

        // the drained body is dropped after the error, which closes the channel
        let released = async {
            while !tx.is_closed() {
                tokio::task::yield_now().await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), released).await.expect("drained body should be released");
    }

    #[tokio::test]
    async fn drain_does_not_block_the_caller() {
        let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, io::Error>>(4);
        let (body, end) = ObservedBody::new(StreamBody::new(rx));

        drain(body);
        assert!(!end.is_ended());

        drop(tx);
        assert!(end.wait().await.is_ok());
    }

    #[tokio::test]
    async fn drain_reaches_end_of_full_body() {
        let (body, end) = ObservedBody::new(Full::new(Bytes::from_static(b"ignored")));

        drain(body);

        assert!(end.wait().await.is_ok());
    }
}

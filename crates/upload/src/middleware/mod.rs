//! The upload-intercepting middleware and the handler seams around it.
//!
//! Downstream code implements [`Handler`] for the normal path and [`ErrorHandler`] for the
//! failure path. [`Next`] bundles both and is consumed by whichever path the middleware takes,
//! so a request continues exactly once.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::protocol::{BoxError, ProcessError, UploadRequest, UploadResponse};

mod error_handler;
pub use error_handler::DefaultErrorHandler;

mod graphql_upload;
pub use graphql_upload::GraphqlUpload;
pub use graphql_upload::UploadHandler;

/// Handles a request, eventually sending a response through the given [`UploadResponse`].
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: UploadRequest, response: UploadResponse) -> Result<(), BoxError>;
}

/// Handles a request whose processing failed.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle_error(
        &self,
        error: ProcessError,
        request: UploadRequest,
        response: UploadResponse,
    ) -> Result<(), BoxError>;
}

/// Continuation of the middleware chain.
pub struct Next<'a> {
    handler: &'a dyn Handler,
    error_handler: &'a dyn ErrorHandler,
}

impl<'a> Next<'a> {
    pub fn new(handler: &'a dyn Handler, error_handler: &'a dyn ErrorHandler) -> Self {
        Self { handler, error_handler }
    }

    /// Continues with the downstream handler.
    pub async fn run(self, request: UploadRequest, response: UploadResponse) -> Result<(), BoxError> {
        self.handler.call(request, response).await
    }

    /// Continues with the error handler.
    pub async fn fail(self, error: ProcessError, request: UploadRequest, response: UploadResponse) -> Result<(), BoxError> {
        self.error_handler.handle_error(error, request, response).await
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A [`Handler`] backed by an async closure.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(UploadRequest, UploadResponse) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn call(&self, request: UploadRequest, response: UploadResponse) -> Result<(), BoxError> {
        (self.f)(request, response).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(UploadRequest, UploadResponse) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    HandlerFn { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use http_body_util::Full;

    fn assert_is_handler<H: Handler>(_handler: &H) {
        // no op
    }

    #[test]
    fn closure_is_handler() {
        let handler = handler_fn(|_request, _response| async { Ok::<(), BoxError>(()) });
        assert_is_handler(&handler);
    }

    #[tokio::test]
    async fn next_runs_the_downstream_handler() {
        let handler = handler_fn(|_request, mut response: UploadResponse| async move {
            response.send_text("downstream").await?;
            Ok::<(), BoxError>(())
        });
        let next = Next::new(&handler, &DefaultErrorHandler);

        let (response, rx) = UploadResponse::channel();
        next.run(UploadRequest::new(Request::new(Full::new(Bytes::new()))), response).await.unwrap();

        assert_eq!(rx.await.unwrap().status(), http::StatusCode::OK);
    }
}

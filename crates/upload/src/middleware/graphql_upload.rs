use async_trait::async_trait;
use tracing::{debug, warn};

use crate::drain::drain;
use crate::middleware::{ErrorHandler, Handler, Next};
use crate::processor::{MultipartProcessor, ProcessRequest, ProcessRequestOptions};
use crate::protocol::{BoxError, RequestBody, UploadRequest, UploadResponse};

/// Intercepts GraphQL multipart requests.
///
/// For a `multipart/form-data` request the response is deferred until the request body has
/// been fully received, then the processor turns the request into GraphQL operations which
/// replace the logical body. Any other request passes through untouched.
///
/// Sending a response before the upload is over would make some clients stop sending the
/// rest of the request, so downstream code may send whenever it wants: the send completes
/// once the body has ended.
#[derive(Debug)]
pub struct GraphqlUpload<P = MultipartProcessor> {
    processor: P,
    options: ProcessRequestOptions,
}

impl GraphqlUpload {
    pub fn new(options: ProcessRequestOptions) -> Self {
        Self { processor: MultipartProcessor::new(), options }
    }
}

impl Default for GraphqlUpload {
    fn default() -> Self {
        Self::new(ProcessRequestOptions::default())
    }
}

impl<P: ProcessRequest> GraphqlUpload<P> {
    /// Uses `processor` instead of the default [`MultipartProcessor`].
    pub fn with_processor(processor: P, options: ProcessRequestOptions) -> Self {
        Self { processor, options }
    }

    pub fn options(&self) -> &ProcessRequestOptions {
        &self.options
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Runs the middleware for one request, then continues with `next`.
    pub async fn process(
        &self,
        mut request: UploadRequest,
        mut response: UploadResponse,
        next: Next<'_>,
    ) -> Result<(), BoxError> {
        if !request.header().is_multipart() {
            return next.run(request, response).await;
        }

        response.defer_until(request.end_signal());
        debug!(uri = %request.header().uri(), "graphql multipart request, response deferred until upload ends");

        match self.processor.process(&mut request, &mut response, &self.options).await {
            Ok(result) => {
                request.set_body(RequestBody::Operations(result));
                next.run(request, response).await
            }
            Err(error) => {
                if let Some(status) = error.exposed_status() {
                    response.set_status(status);
                }
                warn!(cause = %error, status = ?error.exposed_status(), "failed to process graphql multipart request");

                // nobody else will read it, and the deferred response waits for its end
                if let Some(stream) = request.take_stream() {
                    drain(stream);
                }
                next.fail(error, request, response).await
            }
        }
    }

    /// Wraps `handler` and `error_handler` into a single [`Handler`] running this middleware.
    pub fn decorate<H, E>(self, handler: H, error_handler: E) -> UploadHandler<H, E, P>
    where
        H: Handler,
        E: ErrorHandler,
    {
        UploadHandler { upload: self, handler, error_handler }
    }
}

/// A [`Handler`] running [`GraphqlUpload`] in front of a downstream handler.
#[derive(Debug)]
pub struct UploadHandler<H, E, P = MultipartProcessor> {
    upload: GraphqlUpload<P>,
    handler: H,
    error_handler: E,
}

#[async_trait]
impl<H, E, P> Handler for UploadHandler<H, E, P>
where
    H: Handler,
    E: ErrorHandler,
    P: ProcessRequest,
{
    async fn call(&self, request: UploadRequest, response: UploadResponse) -> Result<(), BoxError> {
        self.upload.process(request, response, Next::new(&self.handler, &self.error_handler)).await
    }
}

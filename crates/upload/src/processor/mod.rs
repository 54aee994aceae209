//! Turning a multipart request into GraphQL operations.
//!
//! A [`ProcessRequest`] implementation consumes the raw multipart stream of an
//! [`UploadRequest`] and returns the operations it carried, with every file replaced by an
//! [`Upload`] placeholder. It may return before the files have been received: each upload
//! resolves on its own once its part of the stream is reached.
//!
//! [`MultipartProcessor`] is the default implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;

use bytes::Bytes;

use crate::protocol::{ProcessError, UploadRequest, UploadResponse};

mod capsule;
pub use capsule::Capsule;
pub use capsule::CapsuleWriter;

mod multipart;
pub use multipart::MultipartProcessor;

mod options;
pub use options::DEFAULT_MAX_FIELD_SIZE;
pub use options::ProcessRequestOptions;
pub use options::ProcessRequestOptionsBuilder;

mod upload;
pub use upload::FileUpload;
pub use upload::Upload;
pub(crate) use upload::UploadResolver;

mod value;
pub use value::Operation;
pub use value::ProcessRequestResult;
pub use value::Value;

/// Stream of a file's contents.
pub type FileStream = BoxStream<'static, Result<Bytes, ProcessError>>;

/// Parses a multipart GraphQL request.
///
/// Implementations take the raw stream with [`UploadRequest::take_stream`]. An error should
/// be [client visible](ProcessError::ClientVisible) when the request itself is at fault, the
/// middleware then exposes its status on the response.
#[async_trait]
pub trait ProcessRequest: Send + Sync {
    async fn process(
        &self,
        request: &mut UploadRequest,
        response: &mut UploadResponse,
        options: &ProcessRequestOptions,
    ) -> Result<ProcessRequestResult, ProcessError>;
}

#[async_trait]
impl<P> ProcessRequest for Box<P>
where
    P: ProcessRequest + ?Sized,
{
    async fn process(
        &self,
        request: &mut UploadRequest,
        response: &mut UploadResponse,
        options: &ProcessRequestOptions,
    ) -> Result<ProcessRequestResult, ProcessError> {
        (**self).process(request, response, options).await
    }
}

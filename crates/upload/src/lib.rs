//! GraphQL multipart request middleware
//!
//! This crate intercepts [GraphQL multipart requests](https://github.com/jaydenseric/graphql-multipart-request-spec),
//! turns them into GraphQL operations whose files are replaced by [`Upload`] placeholders,
//! and defers the response until the request body has been fully received.
//!
//! # Features
//!
//! - Passthrough of any request that is not `multipart/form-data`
//! - Responses held back until the upload is over, whenever downstream code sends them
//! - Pluggable request processing through [`ProcessRequest`], [`MultipartProcessor`] by default
//! - Client visible errors exposed as response status codes
//! - Draining of request bodies nobody reads
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use futures::TryStreamExt;
//! use http::Request;
//! use http_body_util::Full;
//! use micro_upload::middleware::{DefaultErrorHandler, GraphqlUpload, Handler, handler_fn};
//! use micro_upload::processor::{ProcessRequestOptions, Value};
//! use micro_upload::protocol::{BoxError, UploadRequest, UploadResponse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let options = ProcessRequestOptions::builder().max_file_size(10_000_000).max_files(10).build();
//!
//!     let resolver = handler_fn(|request: UploadRequest, mut response: UploadResponse| async move {
//!         let operation = request.body().as_operations().and_then(|result| result.operations().first().cloned());
//!         let operation = Value::Object(operation.ok_or("no graphql operation")?);
//!         if let Some(upload) = operation.pointer("variables.file").and_then(Value::as_upload) {
//!             let file = upload.file().await?;
//!             let chunks: Vec<Bytes> = file.create_read_stream().try_collect().await?;
//!             response.send_text(format!("received {} bytes of {}", chunks.concat().len(), file.filename())).await?;
//!         }
//!         Ok::<(), BoxError>(())
//!     });
//!     let handler = GraphqlUpload::new(options).decorate(resolver, DefaultErrorHandler);
//!
//!     let request = Request::builder()
//!         .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=graphql")
//!         .body(Full::new(Bytes::from_static(b"...")))?;
//!     let (response, sent) = UploadResponse::channel();
//!
//!     handler.call(UploadRequest::new(request), response).await?;
//!     let _response = sent.await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: requests, responses, body completion and errors
//! - [`processor`]: turning multipart requests into GraphQL operations
//! - [`middleware`]: the upload middleware and the handler seams around it
//! - [`drain()`] and [`skip_body()`]: discarding request bodies
//!
//! ## Deferred responses
//!
//! Every [`UploadRequest`] observes its own body from the moment it is created. For a
//! multipart request the middleware arms the [`UploadResponse`] with that completion signal
//! before anything else runs: a later send waits for the body's end, then hands the response
//! to the host's [`ResponseSender`](protocol::ResponseSender). If the body fails or is dropped
//! first, the response is discarded.
//!
//! [`Upload`]: processor::Upload
//! [`ProcessRequest`]: processor::ProcessRequest
//! [`MultipartProcessor`]: processor::MultipartProcessor
//! [`UploadRequest`]: protocol::UploadRequest
//! [`UploadResponse`]: protocol::UploadResponse

mod drain;

pub mod middleware;
pub mod processor;
pub mod protocol;

pub use drain::drain;
pub use drain::skip_body;
pub use middleware::GraphqlUpload;

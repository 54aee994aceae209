//! Request and response abstractions the upload middleware operates on.
//!
//! # Architecture
//!
//! - **Request** ([`request`]): [`UploadRequest`] with its [`RequestHeader`], raw body stream
//!   and logical [`RequestBody`]
//! - **Body completion** ([`body`]): [`ObservedBody`] publishes when the raw body reaches its
//!   end, [`RequestEnd`] subscribes to it
//! - **Response** ([`response`]): [`UploadResponse`] sends through a host [`ResponseSender`] at
//!   most once, optionally deferred until a [`RequestEnd`] fires
//! - **Errors** ([`error`]): [`ProcessError`] and [`SendError`]

mod body;
pub use body::EndState;
pub use body::ObservedBody;
pub use body::ReqBody;
pub use body::RequestEnd;

mod request;
pub use request::RequestBody;
pub use request::RequestHeader;
pub use request::UploadRequest;

mod response;
pub use response::ChannelSender;
pub use response::ResponseSender;
pub use response::UploadResponse;

mod response_body;
pub use response_body::ResponseBody;

mod error;
pub use error::BoxError;
pub use error::ProcessError;
pub use error::SendError;

//! Request side of the middleware chain.
//!
//! An [`UploadRequest`] carries three things:
//! - the request header, used for content type detection
//! - the raw body stream, taken by whoever consumes it
//! - the logical body, which is what downstream handlers read

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use http_body::Body;
use http_body_util::BodyExt;
use mime::Mime;

use crate::processor::ProcessRequestResult;
use crate::protocol::{BoxError, ObservedBody, ReqBody, RequestEnd};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide access to the standard header
/// fields and content type inspection.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Parses the `Content-Type` header, `None` if it is absent or malformed.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers().get(http::header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// Returns true if the content type is `multipart/form-data`, whatever its parameters.
    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .is_some_and(|mime| mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA)
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// The logical body of a request, as seen by downstream handlers.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum RequestBody {
    /// Nothing has parsed the body
    #[default]
    Unparsed,
    /// A conventional JSON body parsed by the host
    Json(serde_json::Value),
    /// GraphQL operations decoded from a multipart request
    Operations(ProcessRequestResult),
}

impl RequestBody {
    pub fn as_operations(&self) -> Option<&ProcessRequestResult> {
        match self {
            RequestBody::Operations(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// A request flowing through the middleware chain.
#[derive(Debug)]
pub struct UploadRequest {
    header: RequestHeader,
    stream: Option<ReqBody>,
    end: RequestEnd,
    body: RequestBody,
}

impl UploadRequest {
    /// Creates a request from an `http::Request`, subscribing to its body's completion
    /// before anything can read it.
    pub fn new<B>(request: Request<B>) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let (stream, end) = ObservedBody::new(body.map_err(Into::into).boxed_unsync());
        Self { header: RequestHeader::from(parts), stream: Some(stream), end, body: RequestBody::Unparsed }
    }

    /// Sets the logical body, typically a JSON body the host already parsed.
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// The logical body.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: RequestBody) {
        self.body = body;
    }

    /// Takes the raw body stream, `None` if it was already taken.
    pub fn take_stream(&mut self) -> Option<ReqBody> {
        self.stream.take()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Subscribes to the raw body's completion.
    pub fn end_signal(&self) -> RequestEnd {
        self.end.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn request_with_content_type(content_type: &str) -> UploadRequest {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/graphql")
            .header(http::header::CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::new()))
            .unwrap();
        UploadRequest::new(request)
    }

    #[test]
    fn detects_multipart_with_boundary() {
        let request = request_with_content_type("multipart/form-data; boundary=----abc");
        assert!(request.header().is_multipart());
    }

    #[test]
    fn multipart_detection_ignores_case() {
        let request = request_with_content_type("Multipart/Form-Data; boundary=x");
        assert!(request.header().is_multipart());
    }

    #[test]
    fn json_and_other_multipart_are_not_uploads() {
        assert!(!request_with_content_type("application/json").header().is_multipart());
        assert!(!request_with_content_type("multipart/mixed; boundary=x").header().is_multipart());
        assert!(!request_with_content_type("not a mime").header().is_multipart());
    }

    #[test]
    fn missing_content_type_is_not_multipart() {
        let request = UploadRequest::new(Request::new(Full::new(Bytes::new())));
        assert!(request.header().content_type().is_none());
        assert!(!request.header().is_multipart());
    }

    #[tokio::test]
    async fn stream_can_be_taken_once() {
        let mut request = UploadRequest::new(Request::new(Full::new(Bytes::from_static(b"{}"))));
        let end = request.end_signal();

        let stream = request.take_stream().unwrap();
        assert!(!request.has_stream());
        assert!(request.take_stream().is_none());

        stream.collect().await.unwrap();
        assert!(end.is_ended());
    }

    #[test]
    fn host_parsed_body_is_kept() {
        let json = serde_json::json!({ "query": "{ hello }" });
        let request = UploadRequest::new(Request::new(Full::new(Bytes::new()))).with_body(RequestBody::Json(json.clone()));

        assert_eq!(request.body().as_json(), Some(&json));
        assert!(request.body().as_operations().is_none());
    }
}

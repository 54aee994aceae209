//! Streams a multipart upload in slow chunks through the middleware and prints the response,
//! which only comes out once the last chunk has been received.

use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, TryStreamExt};
use http::{Method, Request};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use micro_upload::middleware::{DefaultErrorHandler, GraphqlUpload, Handler, handler_fn};
use micro_upload::processor::{ProcessRequestOptions, Value};
use micro_upload::protocol::{BoxError, UploadRequest, UploadResponse};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const BODY: &str = "--graphql\r\n\
Content-Disposition: form-data; name=\"operations\"\r\n\
\r\n\
{ \"query\": \"mutation ($file: Upload!) { upload(file: $file) }\", \"variables\": { \"file\": null } }\r\n\
--graphql\r\n\
Content-Disposition: form-data; name=\"map\"\r\n\
\r\n\
{ \"1\": [\"variables.file\"] }\r\n\
--graphql\r\n\
Content-Disposition: form-data; name=\"1\"; filename=\"hello.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello upload\r\n\
--graphql--\r\n";

async fn upload_resolver(request: UploadRequest, mut response: UploadResponse) -> Result<(), BoxError> {
    let operation = request.body().as_operations().and_then(|result| result.operations().first().cloned());
    let operation = Value::Object(operation.ok_or("no graphql operation")?);
    let upload = operation.pointer("variables.file").and_then(Value::as_upload).ok_or("no file variable")?;

    let file = upload.file().await?;
    let chunks: Vec<Bytes> = file.create_read_stream().try_collect().await?;
    info!(filename = file.filename(), mimetype = file.mimetype(), size = chunks.concat().len(), "file received");

    info!("sending response");
    response.send_text(String::from_utf8(chunks.concat())?).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = ProcessRequestOptions::builder().max_file_size(1024).max_files(1).build();
    let handler = GraphqlUpload::new(options).decorate(handler_fn(upload_resolver), DefaultErrorHandler);

    let (mut body_tx, body_rx) = mpsc::channel::<Result<Frame<Bytes>, BoxError>>(4);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=graphql")
        .body(StreamBody::new(body_rx))
        .expect("valid request");

    let client = tokio::spawn(async move {
        for chunk in BODY.as_bytes().chunks(64) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if body_tx.send(Ok(Frame::data(Bytes::copy_from_slice(chunk)))).await.is_err() {
                return;
            }
        }
        info!("client finished uploading");
    });

    let (response, sent) = UploadResponse::channel();
    if let Err(e) = handler.call(UploadRequest::new(request), response).await {
        info!(cause = %e, "request failed");
        return;
    }

    let response = sent.await.expect("a response should be sent");
    let body = response.into_body().collect().await.expect("response body should be readable").to_bytes();
    info!(body = ?body, "response received");

    let _ = client.await;
}

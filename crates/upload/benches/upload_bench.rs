use std::hint::black_box;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::TryStreamExt;
use http::{Method, Request};
use http_body_util::Full;
use micro_upload::middleware::{DefaultErrorHandler, GraphqlUpload, Handler, handler_fn};
use micro_upload::processor::{ProcessRequestOptions, Value};
use micro_upload::protocol::{BoxError, UploadRequest, UploadResponse};

fn multipart_body(file_size: usize) -> Bytes {
    let mut body = String::from(
        "--graphql\r\n\
         Content-Disposition: form-data; name=\"operations\"\r\n\r\n\
         { \"query\": \"mutation ($file: Upload!) { upload(file: $file) }\", \"variables\": { \"file\": null } }\r\n\
         --graphql\r\n\
         Content-Disposition: form-data; name=\"map\"\r\n\r\n\
         { \"1\": [\"variables.file\"] }\r\n\
         --graphql\r\n\
         Content-Disposition: form-data; name=\"1\"; filename=\"a.bin\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n",
    );
    body.push_str(&"x".repeat(file_size));
    body.push_str("\r\n--graphql--\r\n");
    Bytes::from(body)
}

fn request(content_type: &str, body: Bytes) -> UploadRequest {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .header(http::header::CONTENT_TYPE, content_type)
        .body(Full::new(body))
        .expect("request should be valid");
    UploadRequest::new(request)
}

async fn read_upload(request: UploadRequest, mut response: UploadResponse) -> Result<(), BoxError> {
    if let Some(result) = request.body().as_operations() {
        let operation = Value::Object(result.operations()[0].clone());
        if let Some(upload) = operation.pointer("variables.file").and_then(Value::as_upload) {
            let chunks: Vec<Bytes> = upload.file().await?.create_read_stream().try_collect().await?;
            black_box(chunks);
        }
    }
    response.send_body(()).await?;
    Ok(())
}

fn benchmark_upload_middleware(criterion: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime should start");
    let handler = GraphqlUpload::new(ProcessRequestOptions::default()).decorate(handler_fn(read_upload), DefaultErrorHandler);

    let mut group = criterion.benchmark_group("upload_middleware");

    group.bench_function("passthrough_json", |b| {
        b.to_async(&runtime).iter(|| async {
            let (response, sent) = UploadResponse::channel();
            handler.call(request("application/json", Bytes::from_static(b"{}")), response).await.expect("passthrough");
            black_box(sent.await.expect("response should be sent"));
        });
    });

    for file_size in [1024usize, 64 * 1024, 1024 * 1024] {
        let body = multipart_body(file_size);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("multipart_file", file_size), &body, |b, body| {
            b.to_async(&runtime).iter(|| async {
                let (response, sent) = UploadResponse::channel();
                let request = request("multipart/form-data; boundary=graphql", body.clone());
                handler.call(request, response).await.expect("multipart upload");
                black_box(sent.await.expect("response should be sent"));
            });
        });
    }

    group.finish();
}

criterion_group!(upload, benchmark_upload_middleware);
criterion_main!(upload);

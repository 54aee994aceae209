//! Default [`ProcessRequest`] implementation, following the
//! [GraphQL multipart request spec](https://github.com/jaydenseric/graphql-multipart-request-spec).
//!
//! The raw body is pumped into a [`multer::Multipart`] parser. The `operations` and `map`
//! fields are parsed before [`MultipartProcessor::process`] returns, file parts are then read
//! by a background task which resolves the matching [`Upload`]s as it reaches them.
//!
//! The pump never stops before the body's end: once the parser is gone, whatever is left of
//! the body is skipped, so a deferred response is always released.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use http_body_util::BodyExt;
use multer::{Constraints, Field, Multipart, SizeLimit};
use tracing::{debug, warn};

use crate::drain::{drain, skip_body};
use crate::processor::{
    Capsule, CapsuleWriter, FileUpload, Operation, ProcessRequest, ProcessRequestOptions, ProcessRequestResult, Upload,
    UploadResolver, Value,
};
use crate::protocol::{BoxError, ProcessError, ReqBody, UploadRequest, UploadResponse};

const SPEC_URL: &str = "https://github.com/jaydenseric/graphql-multipart-request-spec";

const OPERATIONS_FIELD: &str = "operations";
const MAP_FIELD: &str = "map";

const DEFAULT_MIMETYPE: &str = "application/octet-stream";
const DEFAULT_ENCODING: &str = "7bit";

const PUMP_BUFFER: usize = 8;

/// Parses multipart requests with [`multer`], keeping file contents in memory.
///
/// Every received file stays buffered until its last [`Upload`] handle is dropped, whether
/// a resolver reads it or not. With the default unbounded
/// [`max_file_size`](crate::processor::ProcessRequestOptionsBuilder::max_file_size) a client can
/// make the server hold an upload of any size, so set `max_file_size` and `max_files` for
/// untrusted clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipartProcessor;

impl MultipartProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRequest for MultipartProcessor {
    async fn process(
        &self,
        request: &mut UploadRequest,
        _response: &mut UploadResponse,
        options: &ProcessRequestOptions,
    ) -> Result<ProcessRequestResult, ProcessError> {
        let stream = request
            .take_stream()
            .ok_or_else(|| ProcessError::internal("request body stream has already been consumed"))?;

        let boundary = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(multer::parse_boundary);
        let boundary = match boundary {
            Some(Ok(boundary)) => boundary,
            _ => {
                drain(stream);
                return Err(ProcessError::bad_request("Invalid multipart request: missing or malformed boundary."));
            }
        };

        let max_field_size = options.max_field_size();
        let constraints = Constraints::new().size_limit(
            SizeLimit::new().for_field(OPERATIONS_FIELD, max_field_size).for_field(MAP_FIELD, max_field_size),
        );
        let mut multipart = Multipart::with_constraints(pump(stream), boundary, constraints);

        let (operations, map) = read_operations_and_map(&mut multipart, max_field_size).await?;
        let (operations, pending) = place_uploads(operations, map, options.max_files())?;

        debug!(uploads = pending.len(), "graphql operations parsed, receiving files in background");
        tokio::spawn(receive_files(multipart, pending, *options));

        into_result(operations)
    }
}

/// Forwards the body's data to the parser, then skips the rest once the parser is gone.
fn pump(mut body: ReqBody) -> mpsc::Receiver<Result<Bytes, BoxError>> {
    let (mut tx, rx) = mpsc::channel(PUMP_BUFFER);

    tokio::spawn(async move {
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    if tx.send(Ok(data)).await.is_err() {
                        skip_body(body).await;
                        return;
                    }
                }
                Err(e) => {
                    // the parser may be gone already, nothing else to tell
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    });

    rx
}

async fn read_operations_and_map(
    multipart: &mut Multipart<'static>,
    max_field_size: u64,
) -> Result<(serde_json::Value, serde_json::Value), ProcessError> {
    let mut operations = None;

    loop {
        let field = match multipart.next_field().await.map_err(multipart_error)? {
            Some(field) => field,
            None if operations.is_none() => return Err(missing_field(OPERATIONS_FIELD)),
            None => return Err(missing_field(MAP_FIELD)),
        };

        match field.name() {
            Some(OPERATIONS_FIELD) => {
                let value = read_json_field(field, OPERATIONS_FIELD, max_field_size).await?;
                if !is_operations(&value) {
                    return Err(invalid_type(OPERATIONS_FIELD));
                }
                operations = Some(value);
            }
            Some(MAP_FIELD) => {
                let Some(operations) = operations else {
                    return Err(ProcessError::bad_request(format!(
                        "Misordered multipart fields; 'map' should follow 'operations' ({SPEC_URL})."
                    )));
                };
                let map = read_json_field(field, MAP_FIELD, max_field_size).await?;
                if !map.is_object() {
                    return Err(invalid_type(MAP_FIELD));
                }
                return Ok((operations, map));
            }
            _ if field.file_name().is_some() => {
                return Err(ProcessError::bad_request(format!(
                    "Misordered multipart fields; files should follow 'map' ({SPEC_URL})."
                )));
            }
            name => debug!(field = ?name, "skip unknown multipart field"),
        }
    }
}

async fn read_json_field(field: Field<'static>, name: &str, max_field_size: u64) -> Result<serde_json::Value, ProcessError> {
    let text = field.text().await.map_err(|e| match e {
        multer::Error::FieldSizeExceeded { .. } => ProcessError::payload_too_large(format!(
            "The '{name}' multipart field value exceeds the {max_field_size} byte size limit."
        )),
        other => multipart_error(other),
    })?;

    serde_json::from_str(&text)
        .map_err(|_| ProcessError::bad_request(format!("Invalid JSON in the '{name}' multipart field ({SPEC_URL}).")))
}

/// A single operation object, or a batch of them.
fn is_operations(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(_) => true,
        serde_json::Value::Array(items) => items.iter().all(serde_json::Value::is_object),
        _ => false,
    }
}

/// Puts a pending [`Upload`] at every path of the map, keyed by the file field name.
fn place_uploads(
    operations: serde_json::Value,
    map: serde_json::Value,
    max_files: Option<usize>,
) -> Result<(Value, HashMap<String, UploadResolver>), ProcessError> {
    let serde_json::Value::Object(map) = map else {
        return Err(invalid_type(MAP_FIELD));
    };
    if let Some(max_files) = max_files {
        if map.len() > max_files {
            return Err(too_many_files(max_files));
        }
    }

    let mut operations = Value::from(operations);
    let mut pending = HashMap::with_capacity(map.len());

    for (field_name, paths) in map {
        let serde_json::Value::Array(paths) = paths else {
            return Err(ProcessError::bad_request(format!(
                "Invalid type for the 'map' multipart field entry key '{field_name}' array ({SPEC_URL})."
            )));
        };

        let (resolver, upload) = Upload::pending();
        for (index, path) in paths.iter().enumerate() {
            let Some(path) = path.as_str() else {
                return Err(ProcessError::bad_request(format!(
                    "Invalid type for the 'map' multipart field entry key '{field_name}' array index '{index}' value ({SPEC_URL})."
                )));
            };
            if !operations.set_path(path, Value::Upload(upload.clone())) {
                return Err(ProcessError::bad_request(format!(
                    "Invalid object path for the 'map' multipart field entry key '{field_name}' array index '{index}' value '{path}' ({SPEC_URL})."
                )));
            }
        }
        pending.insert(field_name, resolver);
    }

    Ok((operations, pending))
}

fn into_result(operations: Value) -> Result<ProcessRequestResult, ProcessError> {
    match operations {
        Value::Object(operation) => Ok(ProcessRequestResult::Single(operation)),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(operation) => Ok(operation),
                _ => Err(invalid_type(OPERATIONS_FIELD)),
            })
            .collect::<Result<Vec<Operation>, _>>()
            .map(ProcessRequestResult::Batch),
        _ => Err(invalid_type(OPERATIONS_FIELD)),
    }
}

/// Reads file parts to the end of the multipart stream.
async fn receive_files(
    mut multipart: Multipart<'static>,
    mut pending: HashMap<String, UploadResolver>,
    options: ProcessRequestOptions,
) {
    let mut files = 0usize;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let error = multipart_error(e);
                warn!(cause = %error, pending = pending.len(), "multipart stream failed while receiving files");
                reject_all(pending, &error);
                return;
            }
        };

        // only file parts resolve uploads or count against the file limit
        if field.file_name().is_none() {
            debug!(field = ?field.name(), "skip non-file multipart field");
            continue;
        }

        files += 1;
        if let Some(max_files) = options.max_files() {
            if files > max_files {
                let error = too_many_files(max_files);
                warn!(max_files, "too many file uploads, stop receiving files");
                reject_all(pending, &error);
                return;
            }
        }

        let Some(resolver) = field.name().and_then(|name| pending.remove(name)) else {
            debug!(field = ?field.name(), "skip unmapped multipart field");
            continue;
        };

        let (writer, capsule) = Capsule::new();
        resolver.resolve(file_upload(&field, capsule));

        if let Err(e) = receive_file(&mut field, writer, options.max_file_size()).await {
            warn!(cause = %e, pending = pending.len(), "multipart stream failed while receiving a file");
            reject_all(pending, &e);
            return;
        }
    }

    for (field_name, resolver) in pending {
        debug!(field = field_name, "mapped file missing in the request");
        resolver.reject(ProcessError::bad_request("File missing in the request."));
    }
}

fn file_upload(field: &Field<'static>, capsule: Capsule) -> FileUpload {
    let filename = field.file_name().unwrap_or_default();
    let mimetype = field.content_type().map_or_else(|| DEFAULT_MIMETYPE.to_owned(), ToString::to_string);
    let encoding = field
        .headers()
        .get("content-transfer-encoding")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_ENCODING);

    FileUpload::new(filename, mimetype, encoding, capsule)
}

/// Writes a file part into its capsule.
///
/// A file exceeding `max_file_size` is truncated at the limit and its capsule fails, the
/// rest of the part is skipped. Only a broken multipart stream is returned as an error.
async fn receive_file(
    field: &mut Field<'static>,
    writer: CapsuleWriter,
    max_file_size: Option<u64>,
) -> Result<(), ProcessError> {
    let mut writer = Some(writer);

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let error = multipart_error(e);
                if let Some(writer) = writer {
                    writer.fail(error.clone());
                }
                return Err(error);
            }
        };

        let Some(current) = writer.as_mut() else {
            continue;
        };
        match max_file_size {
            Some(max) if current.len() + chunk.len() as u64 > max => {
                let fits = (max - current.len()) as usize;
                current.write(chunk.slice(..fits));
                if let Some(truncated) = writer.take() {
                    debug!(max, filename = field.file_name(), "file exceeds size limit, truncated");
                    truncated.fail(ProcessError::payload_too_large(format!(
                        "File truncated as it exceeds the {max} byte size limit."
                    )));
                }
            }
            _ => current.write(chunk),
        }
    }

    if let Some(writer) = writer {
        writer.finish();
    }
    Ok(())
}

fn reject_all(pending: HashMap<String, UploadResolver>, error: &ProcessError) {
    for resolver in pending.into_values() {
        resolver.reject(error.clone());
    }
}

fn multipart_error(e: multer::Error) -> ProcessError {
    match e {
        multer::Error::StreamReadFailed(_) => ProcessError::disconnected(),
        other => ProcessError::bad_request(format!("Invalid multipart request: {other}.")),
    }
}

fn missing_field(name: &str) -> ProcessError {
    ProcessError::bad_request(format!("Missing multipart field '{name}' ({SPEC_URL})."))
}

fn invalid_type(name: &str) -> ProcessError {
    ProcessError::bad_request(format!("Invalid type for the '{name}' multipart field ({SPEC_URL})."))
}

fn too_many_files(max_files: usize) -> ProcessError {
    ProcessError::payload_too_large(format!("{max_files} max file uploads exceeded."))
}

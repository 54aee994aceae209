use std::fmt;

use tokio::sync::watch;

use crate::processor::{Capsule, FileStream};
use crate::protocol::ProcessError;

/// A file received in a multipart request.
#[derive(Debug, Clone)]
pub struct FileUpload {
    filename: String,
    mimetype: String,
    encoding: String,
    capsule: Capsule,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, mimetype: impl Into<String>, encoding: impl Into<String>, capsule: Capsule) -> Self {
        Self { filename: filename.into(), mimetype: mimetype.into(), encoding: encoding.into(), capsule }
    }

    /// File name, provided by the client and can't be trusted.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// File MIME type, provided by the client and can't be trusted.
    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    /// File stream transfer encoding.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    #[doc(hidden)]
    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    /// Creates a stream of the file's contents, from the first byte.
    ///
    /// May be called any number of times; each stream follows the upload while it is still
    /// being received.
    pub fn create_read_stream(&self) -> FileStream {
        self.capsule.reader()
    }
}

#[derive(Debug, Clone)]
enum UploadState {
    Pending,
    Ready(FileUpload),
    Failed(ProcessError),
}

/// Placeholder for a file in the GraphQL operations.
///
/// Resolves once the file's multipart part has been reached, or fails with the error that
/// prevented it. Clones observe the same upload.
#[derive(Clone)]
pub struct Upload {
    state: watch::Receiver<UploadState>,
}

/// Resolves a pending [`Upload`]. Dropping it unresolved fails the upload.
pub(crate) struct UploadResolver {
    state: watch::Sender<UploadState>,
}

impl Upload {
    pub(crate) fn pending() -> (UploadResolver, Upload) {
        let (tx, rx) = watch::channel(UploadState::Pending);
        (UploadResolver { state: tx }, Upload { state: rx })
    }

    pub fn resolved(file: FileUpload) -> Upload {
        let (_tx, rx) = watch::channel(UploadState::Ready(file));
        Upload { state: rx }
    }

    pub fn rejected(error: ProcessError) -> Upload {
        let (_tx, rx) = watch::channel(UploadState::Failed(error));
        Upload { state: rx }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), UploadState::Pending)
    }

    /// Waits for the file.
    pub async fn file(&self) -> Result<FileUpload, ProcessError> {
        let mut state = self.state.clone();
        let result = match state.wait_for(|state| !matches!(state, UploadState::Pending)).await {
            Ok(state) => match &*state {
                UploadState::Ready(file) => Ok(file.clone()),
                UploadState::Failed(e) => Err(e.clone()),
                UploadState::Pending => Err(ProcessError::internal("file upload never resolved")),
            },
            Err(_closed) => Err(ProcessError::internal("file upload never resolved")),
        };
        result
    }
}

impl PartialEq for Upload {
    fn eq(&self, other: &Self) -> bool {
        self.state.same_channel(&other.state)
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            UploadState::Pending => f.write_str("Upload(pending)"),
            UploadState::Ready(file) => f.debug_tuple("Upload").field(&file.filename).finish(),
            UploadState::Failed(e) => f.debug_tuple("Upload").field(e).finish(),
        }
    }
}

impl UploadResolver {
    pub(crate) fn resolve(self, file: FileUpload) {
        self.settle(UploadState::Ready(file));
    }

    pub(crate) fn reject(self, error: ProcessError) {
        self.settle(UploadState::Failed(error));
    }

    fn settle(&self, state: UploadState) {
        self.state.send_if_modified(|current| {
            if matches!(current, UploadState::Pending) {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for UploadResolver {
    fn drop(&mut self) {
        self.settle(UploadState::Failed(ProcessError::internal("file upload was abandoned")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, TryStreamExt};

    fn file(name: &str, content: &'static str) -> FileUpload {
        FileUpload::new(name, "text/plain", "7bit", Capsule::from_bytes(content))
    }

    #[tokio::test]
    async fn resolved_upload_yields_file() {
        let upload = Upload::resolved(file("a.txt", "alpha"));

        let file = upload.file().await.unwrap();
        assert_eq!(file.filename(), "a.txt");
        assert_eq!(file.mimetype(), "text/plain");
        assert_eq!(file.encoding(), "7bit");

        let chunks: Vec<_> = file.create_read_stream().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"alpha");
    }

    #[tokio::test]
    async fn pending_upload_waits_for_resolver() {
        let (resolver, upload) = Upload::pending();
        assert!(upload.is_pending());

        let mut waiting = Box::pin(upload.file());
        assert!((&mut waiting).now_or_never().is_none());

        resolver.resolve(file("b.txt", "beta"));
        assert_eq!(waiting.await.unwrap().filename(), "b.txt");
        assert!(!upload.is_pending());
    }

    #[tokio::test]
    async fn abandoned_upload_fails() {
        let (resolver, upload) = Upload::pending();
        drop(resolver);

        assert!(matches!(upload.file().await, Err(ProcessError::Internal { .. })));
    }

    #[tokio::test]
    async fn rejection_is_shared_by_clones() {
        let (resolver, upload) = Upload::pending();
        let clone = upload.clone();
        resolver.reject(ProcessError::bad_request("File missing in the request."));

        assert_eq!(upload.file().await.unwrap_err(), ProcessError::bad_request("File missing in the request."));
        assert_eq!(clone.file().await.unwrap_err().message(), "File missing in the request.");
        assert_eq!(upload, clone);
        assert_ne!(upload, Upload::rejected(ProcessError::bad_request("File missing in the request.")));
    }
}

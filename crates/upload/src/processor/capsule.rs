//! Buffer decoupling multipart parsing from file consumption.
//!
//! The processor writes a file's bytes into a [`CapsuleWriter`] at the pace of the request,
//! consumers read them back through [`Capsule::reader`] at their own pace, possibly after the
//! request is over. Every reader starts at the first byte and follows the writer live.
//! Bytes are kept in memory for the capsule's lifetime.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use tokio::sync::watch;

use crate::processor::FileStream;
use crate::protocol::ProcessError;

#[derive(Debug, Default)]
struct CapsuleState {
    chunks: Vec<Bytes>,
    len: u64,
    status: CapsuleStatus,
}

#[derive(Debug, Default, Clone)]
enum CapsuleStatus {
    #[default]
    Writing,
    Finished,
    Failed(ProcessError),
}

enum Step {
    Chunk(Bytes),
    End,
    Failed(ProcessError),
    Wait,
}

impl CapsuleState {
    fn step(&self, index: usize) -> Step {
        if let Some(chunk) = self.chunks.get(index) {
            return Step::Chunk(chunk.clone());
        }
        match &self.status {
            CapsuleStatus::Writing => Step::Wait,
            CapsuleStatus::Finished => Step::End,
            CapsuleStatus::Failed(e) => Step::Failed(e.clone()),
        }
    }
}

/// Read side of a file buffer, cheap to clone.
#[derive(Debug, Clone)]
pub struct Capsule {
    state: watch::Receiver<CapsuleState>,
}

/// Write side of a file buffer.
///
/// Dropping the writer before [`finish`](CapsuleWriter::finish) fails every reader.
#[derive(Debug)]
pub struct CapsuleWriter {
    state: watch::Sender<CapsuleState>,
}

impl Capsule {
    pub fn new() -> (CapsuleWriter, Capsule) {
        let (tx, rx) = watch::channel(CapsuleState::default());
        (CapsuleWriter { state: tx }, Capsule { state: rx })
    }

    /// A finished capsule holding `bytes`.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Capsule {
        let (mut writer, capsule) = Capsule::new();
        writer.write(bytes.into());
        writer.finish();
        capsule
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.state.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state.borrow().status, CapsuleStatus::Finished)
    }

    /// A stream of the capsule's bytes from the first one.
    pub fn reader(&self) -> FileStream {
        stream::unfold(Some((self.state.clone(), 0usize)), |cursor| async move {
            let (mut state, index) = cursor?;
            loop {
                let step = state.borrow_and_update().step(index);
                match step {
                    Step::Chunk(bytes) => return Some((Ok(bytes), Some((state, index + 1)))),
                    Step::End => return None,
                    Step::Failed(e) => return Some((Err(e), None)),
                    Step::Wait => {
                        if state.changed().await.is_err() {
                            // writer gone: whatever it published last is final
                            let step = state.borrow().step(index);
                            return match step {
                                Step::Chunk(bytes) => Some((Ok(bytes), Some((state, index + 1)))),
                                Step::End => None,
                                Step::Failed(e) => Some((Err(e), None)),
                                Step::Wait => Some((Err(ProcessError::internal("file upload buffer closed")), None)),
                            };
                        }
                    }
                }
            }
        })
        .boxed()
    }
}

impl CapsuleWriter {
    pub fn write(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.state.send_modify(|state| {
            state.len += bytes.len() as u64;
            state.chunks.push(bytes);
        });
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.state.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(self) {
        self.close(CapsuleStatus::Finished);
    }

    /// Fails the capsule: readers get `error` once they consumed what was written.
    pub fn fail(self, error: ProcessError) {
        self.close(CapsuleStatus::Failed(error));
    }

    fn close(&self, status: CapsuleStatus) {
        self.state.send_if_modified(|state| {
            if matches!(state.status, CapsuleStatus::Writing) {
                state.status = status;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for CapsuleWriter {
    fn drop(&mut self) {
        self.close(CapsuleStatus::Failed(ProcessError::internal("file upload was destroyed before it was fully written")));
    }
}

use http::StatusCode;
use thiserror::Error;

/// Boxed error used at handler boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error reported by a [`ProcessRequest`](crate::processor::ProcessRequest) implementation.
///
/// The processor decides whether a failure is safe to show to the client. Client visible
/// errors carry the status code the response should use, internal errors carry only a
/// message and leave the response status to the host's error handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("{message}")]
    ClientVisible { status: StatusCode, message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ProcessError {
    pub fn client_visible<S: ToString>(status: StatusCode, message: S) -> Self {
        Self::ClientVisible { status, message: message.to_string() }
    }

    pub fn bad_request<S: ToString>(message: S) -> Self {
        Self::client_visible(StatusCode::BAD_REQUEST, message)
    }

    pub fn payload_too_large<S: ToString>(message: S) -> Self {
        Self::client_visible(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    /// The client went away before the multipart stream was fully parsed.
    ///
    /// Uses the non standard `499 Client Closed Request` status.
    pub fn disconnected() -> Self {
        let status = StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST);
        Self::client_visible(status, "Request disconnected during file upload stream parsing.")
    }

    pub fn internal<S: ToString>(message: S) -> Self {
        Self::Internal { message: message.to_string() }
    }

    /// Returns the status code to expose to the client, `None` for internal errors.
    #[inline]
    pub fn exposed_status(&self) -> Option<StatusCode> {
        match self {
            Self::ClientVisible { status, .. } => Some(*status),
            Self::Internal { .. } => None,
        }
    }

    #[inline]
    pub fn is_client_visible(&self) -> bool {
        matches!(self, Self::ClientVisible { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ClientVisible { message, .. } | Self::Internal { message } => message,
        }
    }
}

/// Error returned when sending a response through an [`UploadResponse`](crate::protocol::UploadResponse).
#[derive(Error, Debug)]
pub enum SendError {
    #[error("response has already been sent")]
    AlreadySent,

    #[error("request body ended before it was fully received, response dropped")]
    RequestAborted,

    #[error("failed to transmit response: {reason}")]
    Transmit { reason: String },
}

impl SendError {
    pub fn transmit<S: ToString>(str: S) -> Self {
        Self::Transmit { reason: str.to_string() }
    }
}

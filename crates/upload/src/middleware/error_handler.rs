use async_trait::async_trait;
use http::StatusCode;
use tracing::error;

use crate::middleware::ErrorHandler;
use crate::protocol::{BoxError, ProcessError, UploadRequest, UploadResponse};

/// Renders a processing error as a `text/plain` response.
///
/// Keeps the response status when it is already an error status, uses `500` otherwise. The
/// error message is only exposed for client visible errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle_error(
        &self,
        error: ProcessError,
        _request: UploadRequest,
        mut response: UploadResponse,
    ) -> Result<(), BoxError> {
        let status = response.status();
        if !status.is_client_error() && !status.is_server_error() {
            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        let text = match &error {
            ProcessError::ClientVisible { message, .. } => message.clone(),
            ProcessError::Internal { .. } => {
                error!(cause = %error, "internal error while processing upload request");
                String::from("Internal Server Error")
            }
        };

        response.send_text(text).await?;
        Ok(())
    }
}

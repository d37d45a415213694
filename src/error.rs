//! # Error Handling
//!
//! One error category per pipeline stage, mapped to a distinct HTTP status
//! and a structured JSON body. Clients can branch on `error.kind` instead of
//! string-matching messages.
//!
//! ## Status mapping:
//! - `Upload` (writing the payload to scratch) → 500
//! - `AudioDecode` (corrupt or unsupported audio) → 422
//! - `Transcription` (model inference failure) → 500
//! - `Dialogue` (webhook unreachable or non-JSON reply) → 502
//! - `BadRequest` (malformed multipart, missing file, oversized payload) → 400

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors surfaced by the audio pipeline and its HTTP layer.
#[derive(Debug)]
pub enum AppError {
    /// I/O failure while persisting the upload to scratch space
    Upload(String),

    /// Normalizer could not decode or transcode the audio
    AudioDecode(String),

    /// Whisper inference failed
    Transcription(String),

    /// Dialogue engine unreachable, or its reply was not JSON
    Dialogue(String),

    /// Client sent an invalid request (multipart errors, missing field, size cap)
    BadRequest(String),

    /// Anything that does not fit a pipeline stage
    Internal(String),
}

impl AppError {
    /// Machine-readable category name used in the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Upload(_) => "upload_io",
            AppError::AudioDecode(_) => "audio_decode",
            AppError::Transcription(_) => "transcription",
            AppError::Dialogue(_) => "dialogue_engine",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Upload(msg) => write!(f, "Upload error: {}", msg),
            AppError::AudioDecode(msg) => write!(f, "Audio decode error: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription error: {}", msg),
            AppError::Dialogue(msg) => write!(f, "Dialogue engine error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::AudioDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Transcription(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Dialogue(_) => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Upload(msg)
            | AppError::AudioDecode(msg)
            | AppError::Transcription(msg)
            | AppError::Dialogue(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg) => msg.clone(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "kind": self.kind(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for handler and pipeline results.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::Upload("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::AudioDecode("bad mp3".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Dialogue("connection refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::BadRequest("no file".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn error_body_carries_kind_and_message() {
        let response = AppError::AudioDecode("unsupported container".into()).error_response();
        let bytes = response.into_body().try_into_bytes().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"]["kind"], "audio_decode");
        assert_eq!(body["error"]["message"], "unsupported container");
        assert!(!body["error"]["timestamp"].as_str().unwrap().is_empty());
    }

    #[test]
    fn display_includes_stage_context() {
        let err = AppError::Dialogue("connection refused".into());
        assert!(err.to_string().contains("Dialogue engine"));
        assert!(err.to_string().contains("connection refused"));
    }
}

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("Strip error: {0}")]
    Strip(#[from] StripError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("No camera configured")]
    Unavailable,

    #[error("Camera device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Failed to capture frame: {0}")]
    CaptureError(String),

    #[error("No frame available")]
    NoFrameAvailable,

    #[error("Camera I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Maximum {capacity} photos reached")]
    CapacityExceeded { capacity: usize },

    #[error("Photo index {index} out of range (collection holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum StripError {
    #[error("No photos to composite")]
    EmptyInput,

    #[error("Failed to decode image: {0}")]
    DecodeFailure(String),

    #[error("Failed to encode image: {0}")]
    EncodeFailure(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Strip composition error: {0}")]
    Composition(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid tile dimensions")]
    InvalidTileDimensions,

    #[error("Invalid session idle TTL: {0}")]
    InvalidSessionTtl(String),

    #[error("Unsupported camera device type: {device_type}")]
    UnsupportedCameraType { device_type: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Changing template will reset {photos} photo(s); confirmation required")]
    ConfirmationRequired { photos: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Camera(_) => 503, // Service Unavailable
            AppError::Collection(CollectionError::CapacityExceeded { .. }) => 409,
            AppError::Collection(CollectionError::IndexOutOfRange { .. }) => 404,
            AppError::Strip(StripError::EmptyInput) => 204,
            AppError::Strip(StripError::DecodeFailure(_)) => 422,
            AppError::Strip(StripError::InvalidDimensions(_)) => 422,
            AppError::Strip(StripError::InvalidColor(_)) => 400,
            AppError::Strip(_) => 500,
            AppError::Config(_) => 500,
            AppError::Session(SessionError::NotFound { .. }) => 404,
            AppError::Session(SessionError::ConfirmationRequired { .. }) => 409,
            AppError::Session(SessionError::InvalidRequest(_)) => 400,
        }
    }

    pub fn error_response(&self) -> serde_json::Value {
        serde_json::json!({
            "ok": false,
            "error": self.to_string(),
            "error_type": self.error_type()
        })
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Camera(_) => "camera_error",
            AppError::Collection(CollectionError::CapacityExceeded { .. }) => "capacity_exceeded",
            AppError::Collection(CollectionError::IndexOutOfRange { .. }) => "index_out_of_range",
            AppError::Strip(StripError::EmptyInput) => "empty_input",
            AppError::Strip(StripError::DecodeFailure(_)) => "decode_failure",
            AppError::Strip(_) => "strip_error",
            AppError::Config(_) => "config_error",
            AppError::Session(SessionError::ConfirmationRequired { .. }) => "confirmation_required",
            AppError::Session(_) => "session_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        // 204 must not carry a body
        if matches!(self, AppError::Strip(StripError::EmptyInput)) {
            return HttpResponse::NoContent().finish();
        }
        HttpResponse::build(ResponseError::status_code(self)).json(AppError::error_response(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_display() {
        let err = CameraError::DeviceNotFound {
            device: "/dev/video0".to_string(),
        };
        assert_eq!(err.to_string(), "Camera device not found: /dev/video0");
    }

    #[test]
    fn test_app_error_status_codes() {
        let err = AppError::Collection(CollectionError::CapacityExceeded { capacity: 3 });
        assert_eq!(err.status_code(), 409);

        let err = AppError::Camera(CameraError::Unavailable);
        assert_eq!(err.status_code(), 503);

        let err = AppError::Strip(StripError::EmptyInput);
        assert_eq!(err.status_code(), 204);
    }

    #[test]
    fn test_error_response_json() {
        let err = AppError::Collection(CollectionError::CapacityExceeded { capacity: 4 });
        let json = err.error_response();

        assert_eq!(json["ok"], false);
        assert_eq!(
            json["error"],
            "Collection error: Maximum 4 photos reached"
        );
        assert_eq!(json["error_type"], "capacity_exceeded");
    }

    #[test]
    fn test_empty_input_responds_without_body() {
        let err = AppError::Strip(StripError::EmptyInput);
        let response = ResponseError::error_response(&err);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}

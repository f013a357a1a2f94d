// Centralized error handling for the card store

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::io;
use thiserror::Error;

/// Errors returned by the card store API
#[derive(Error, Debug)]
pub enum RfidError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Card 0x{0:08X} not found")]
    NotFound(u32),

    #[error("Card 0x{0:08X} already exists")]
    DuplicateIdentifier(u32),

    #[error("Card table is full ({capacity} slots active)")]
    CapacityExceeded { capacity: usize },

    #[error("Timed out after {timeout_ms} ms waiting for the card table lock")]
    LockTimeout { timeout_ms: u64 },

    #[error("I/O failure while {action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Stored card image rejected: {0}")]
    CorruptionDetected(String),

    #[error("Storage directory {0} is not available")]
    StorageUnavailable(String),

    #[error("Rendered JSON needs {needed} bytes but only {capacity} are available")]
    RenderOverflow { needed: usize, capacity: usize },
}

impl RfidError {
    pub fn io(action: &'static str, source: io::Error) -> Self {
        RfidError::Io { action, source }
    }
}

/// Reasons an image cannot be restored from flash
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Image file does not exist")]
    NotFound,

    #[error("Image size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Image capacity mismatch: expected {expected} slots, header says {actual}")]
    CapacityMismatch { expected: usize, actual: usize },

    #[error("Image checksum mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    ChecksumInvalid { stored: u32, computed: u32 },

    #[error("Failed to read image: {0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    /// Whether the caller should fall back to the built-in default cards
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LoadError::Io(_))
    }
}

impl From<LoadError> for RfidError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Io(source) => RfidError::io("reading the card image", source),
            other => RfidError::CorruptionDetected(other.to_string()),
        }
    }
}

/// Errors surfaced by the HTTP card endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Store(#[from] RfidError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use crate::models::api::ErrorResponse;

        let status = match &self {
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => match err {
                RfidError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                RfidError::NotFound(_) => StatusCode::NOT_FOUND,
                RfidError::DuplicateIdentifier(_) => StatusCode::CONFLICT,
                RfidError::CapacityExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
                RfidError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RfidError::Io { .. }
                | RfidError::CorruptionDetected(_)
                | RfidError::StorageUnavailable(_)
                | RfidError::RenderOverflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                status: "error".to_string(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub const GENERATE_FAILED: &str = "Failed to generate QR code";
pub const DOWNLOAD_FAILED: &str = "Failed to generate QR code for download";
pub const CLEANUP_FAILED: &str = "Failed to clean up temp files";

/// Ошибки обработки запроса. Всё, что не вина клиента, уходит в `Internal`
/// и отдаётся наружу только общим сообщением.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Text is required to generate QR code")]
    EmptyText,

    #[error("Text is too long to fit in a QR code")]
    TextTooLong,

    #[error("Size must be between {min} and {max} pixels, got {size}")]
    InvalidSize { size: i64, min: u32, max: u32 },

    #[error("Size must be a number, got {0:?}")]
    SizeNotANumber(String),

    #[error("Size too small for this content (needs at least {needed} px, got {size})")]
    SizeTooSmall { size: u32, needed: u32 },

    #[error("Margin must be between 0 and {max}, got {margin}")]
    InvalidMargin { margin: i64, max: u32 },

    #[error("Margin must be a number, got {0:?}")]
    MarginNotANumber(String),

    #[error("Invalid color {0:?}, expected #RRGGBB or #RGB")]
    InvalidColor(String),

    #[error("Invalid error correction level {0:?}, expected one of L, M, Q, H")]
    InvalidEcLevel(String),

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn internal(context: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            context,
            source: source.into(),
        }
    }

    /// Переписать контекст внутренней ошибки (например, для /download)
    pub fn with_context(self, context: &'static str) -> Self {
        match self {
            Self::Internal { source, .. } => Self::Internal { context, source },
            other => other,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Сообщение, которое видит клиент
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { context, .. } => context.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<qrcode::types::QrError> for ApiError {
    fn from(err: qrcode::types::QrError) -> Self {
        match err {
            qrcode::types::QrError::DataTooLong => Self::TextTooLong,
            other => Self::internal(GENERATE_FAILED, anyhow::anyhow!("QR encoding failed: {}", other)),
        }
    }
}

impl From<image::ImageError> for ApiError {
    fn from(err: image::ImageError) -> Self {
        Self::internal(GENERATE_FAILED, err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        if self.is_internal() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.public_message(),
        })
    }
}

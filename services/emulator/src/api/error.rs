//! The API error type and its rendering.
//!
//! One variant per failure kind, constructed at the point of detection and
//! carried unchanged to the dispatch boundary. The mapping to HTTP status is
//! a pure function; handlers never touch status codes themselves.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mobymock_image::ImageError;

/// Errors surfaced by the emulated APIs.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed client input (bad digest, bad name count). 400.
    #[error("{0}")]
    InvalidParameter(String),

    /// Bad or missing credentials or bearer token. 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown reference, absent blob, unopenable tarball. 404.
    #[error("{0}")]
    NotFound(String),

    /// Unsupported protocol version. 501.
    #[error("{0}")]
    NotImplemented(String),

    /// A server-local data problem: parse failures, violated tarball
    /// invariants, encode failures. 503.
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match &err {
            // The backing file could not be opened, or a layer could not be
            // sized: the image is effectively absent.
            ImageError::OpenSource { .. } | ImageError::LayerSize { .. } => {
                Self::NotFound(err.to_string())
            }
            ImageError::InvalidDigest(_) => Self::InvalidParameter(err.to_string()),
            // Parse failures and violated tarball invariants are data
            // problems on our side.
            ImageError::Archive(_)
            | ImageError::Json(_)
            | ImageError::NotSingleImage(_)
            | ImageError::LayerCountMismatch { .. } => Self::Unavailable(err.to_string()),
        }
    }
}

/// JSON error body shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// JSON error bodies exist since API 1.23; older clients get plain text.
const FIRST_JSON_ERROR_VERSION: &str = "1.23";

pub fn supports_json_errors(version: &str) -> bool {
    version.is_empty() || version_greater_than(version, FIRST_JSON_ERROR_VERSION)
}

/// Dotted-numeric version comparison; missing segments count as zero and
/// non-numeric segments as zero.
fn version_greater_than(a: &str, b: &str) -> bool {
    let mut left = a.split('.').map(|s| s.parse::<u64>().unwrap_or(0));
    let mut right = b.split('.').map(|s| s.parse::<u64>().unwrap_or(0));
    loop {
        match (left.next(), right.next()) {
            (None, None) => return false,
            (l, r) => {
                let (l, r) = (l.unwrap_or(0), r.unwrap_or(0));
                if l != r {
                    return l > r;
                }
            }
        }
    }
}

/// Render an error for the requested API version.
pub fn error_response(err: &ApiError, version: &str) -> Response {
    let status = err.status_code();
    if supports_json_errors(version) {
        (
            status,
            Json(ErrorResponse {
                message: err.to_string(),
            }),
        )
            .into_response()
    } else {
        plain_text(status, &err.to_string())
    }
}

/// A plain-text error response, `http.Error` style: the message plus a
/// trailing newline.
pub fn plain_text(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(format!("{message}\n")))
        .unwrap_or_default()
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            Error::MissingConfig(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            Error::Unauthorized(_) => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            Error::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, err.to_string()),
            Error::RateLimited { .. } => Self::new(StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            Error::Api(_) | Error::Decode(_) => Self::new(StatusCode::BAD_GATEWAY, err.to_string()),
            Error::Database(_) | Error::Cache(_) | Error::Io(_) | Error::Config(_) => {
                tracing::error!("Request failed: {err}");
                Self::internal("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "data": null, "error": self.message });
        let mut response = (self.status, Json(body)).into_response();

        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                axum::http::HeaderValue::from_static("Bearer realm=\"commitsync\""),
            );
        }
        response
    }
}

/// Extension trait for converting library results to API errors.
pub trait ResultExt<T> {
    fn api(self) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for crate::error::Result<T> {
    fn api(self) -> Result<T, ApiError> {
        self.map_err(ApiError::from)
    }
}

pub mod routes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::types::Page;
use crate::error::OltError;

/// Success envelope: `{"code":200,"status":"OK","data":...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct WebResponse<T> {
    pub code: u16,
    pub status: String,
    pub data: T,
}

impl<T> WebResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            status: status_text(StatusCode::OK),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for WebResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Paged envelope. The page fields sit beside `code` and `status`:
/// `{"code":200,"status":"OK","page":1,"limit":10,"page_count":3,"total_rows":25,"data":[...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct PagedResponse<T> {
    pub code: u16,
    pub status: String,
    #[serde(flatten)]
    pub page: Page<T>,
}

impl<T> PagedResponse<T> {
    pub fn ok(page: Page<T>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            status: status_text(StatusCode::OK),
            page,
        }
    }
}

impl<T: Serialize> IntoResponse for PagedResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub message: String,
}

fn status_text(code: StatusCode) -> String {
    code.canonical_reason().unwrap_or("Unknown").to_string()
}

/// A failed request, rendered as an `ErrorResponse`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<OltError> for ApiError {
    fn from(err: OltError) -> Self {
        let status = match &err {
            OltError::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
            OltError::DeviceUnreachable(_) | OltError::Protocol(_) => StatusCode::BAD_GATEWAY,
            OltError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {}", self.message);
        } else {
            tracing::debug!("Request rejected: {}", self.message);
        }

        let body = ErrorResponse {
            code: self.status.as_u16(),
            status: status_text(self.status),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

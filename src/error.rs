use axum::{
    body::Body,
    http::StatusCode,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error("internal server error")]
    Internal,
}

impl RegistryError {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}

pub fn unauthorized(msg: &str) -> RegistryError {
    RegistryError::http(StatusCode::UNAUTHORIZED, msg)
}

pub fn forbidden(msg: &str) -> RegistryError {
    RegistryError::http(StatusCode::FORBIDDEN, msg)
}

pub fn bad_request(msg: &str) -> RegistryError {
    RegistryError::http(StatusCode::BAD_REQUEST, msg)
}

pub fn not_found(msg: &str) -> RegistryError {
    RegistryError::http(StatusCode::NOT_FOUND, msg)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::to_vec(&ErrorBody { error: message })
        .unwrap_or_else(|_| b"{\"error\":\"unknown error\"}".to_vec());
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        match self {
            RegistryError::Http { status, message } => error_response(status, &message),
            RegistryError::Internal => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "unknown error")
            }
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(_: std::io::Error) -> Self {
        RegistryError::Internal
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(_: serde_json::Error) -> Self {
        RegistryError::Internal
    }
}

//! Central error type for request handling.
//!
//! Handlers return `Result<T, ServerError>`. Client-facing variants carry their
//! message as-is; internal faults are logged and answered with a generic
//! message, with the raw detail attached as an [`ErrorDetail`] extension so
//! that development deployments can surface it (see `expose_error_details`).

use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::error;
use serde_json::json;
use std::any::Any;
use thiserror::Error;

use crate::auth::AuthError;
use crate::llm::chat::UpstreamError;

pub const GENERIC_ERROR: &str = "An unexpected error occurred. Please try again later.";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("File size exceeds the {} MB limit", .0 / (1024 * 1024))]
    PayloadTooLarge(usize),

    #[error("login required")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Raw error text attached to generic 5xx responses.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let client_error = |status: StatusCode, message: String| {
            (status, Json(json!({ "error": message }))).into_response()
        };

        match &self {
            ServerError::NotFound(m) => client_error(StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => client_error(StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized | ServerError::Auth(AuthError::InvalidSession) =>
                client_error(StatusCode::UNAUTHORIZED, self.to_string()),
            // Reported under `message` so the chat UI shows it like a reply.
            ServerError::PayloadTooLarge(_) =>
                (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "message": self.to_string() }))).into_response(),
            ServerError::Auth(e) if e.is_user_facing() =>
                client_error(StatusCode::BAD_REQUEST, e.to_string()),
            ServerError::Upstream(e) => {
                error!("upstream error: {}", e);
                internal(StatusCode::BAD_GATEWAY, self.to_string())
            }
            _ => {
                error!("{}", self);
                internal(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
    }
}

fn internal(status: StatusCode, detail: String) -> Response {
    let mut response = (status, Json(json!({ "error": GENERIC_ERROR }))).into_response();
    response.extensions_mut().insert(ErrorDetail(detail));
    response
}

/// `CatchPanicLayer` handler: a panicking handler becomes an internal error.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("handler panicked: {}", detail);
    internal(StatusCode::INTERNAL_SERVER_ERROR, format!("panic: {}", detail))
}

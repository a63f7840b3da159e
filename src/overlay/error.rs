use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Outcome of a request that could not be served normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Malformed JSON body, missing field or unknown action.
    BadRequest(String),
    NotFound,
    /// The request is valid but no collaborator handles it.
    Unavailable(String),
    Internal(String),
}

impl RequestError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RequestError::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            RequestError::NotFound => write!(f, "not found"),
            RequestError::Unavailable(what) => write!(f, "{what} is not available"),
            RequestError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RequestError {}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

//! API error taxonomy and its HTTP rendering.
//!
//! Client errors render a JSON body. Server errors render an empty body and
//! log the underlying cause instead.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::TokenError;
use crate::models::Role;
use crate::storage::StoreError;

/// One failed check, shaped like the validator output clients already parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub location: &'static str,
    pub path: String,
    pub msg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FieldError {
    pub fn invalid(location: &'static str, path: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            location,
            path: path.into(),
            msg: "Invalid value",
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or badly signed bearer token (401).
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    /// No user matches the submitted username/password (401).
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Valid token, wrong role (403).
    #[error("role '{required}' required")]
    Forbidden { required: Role },

    /// Required fields missing or identifier malformed (400).
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Body could not be decoded (400).
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// No record under the requested identifier (404).
    #[error("record not found")]
    NotFound,

    /// Downstream store failure (500).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Token signing failure (500).
    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Validation(errors) => (status, Json(json!({ "errors": errors }))).into_response(),
            ApiError::Store(_) | ApiError::Token(_) => {
                tracing::error!(error = %self, "request failed");
                status.into_response()
            }
            ApiError::Unauthenticated(_) => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

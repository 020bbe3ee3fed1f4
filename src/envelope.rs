//! The `{success, message, data?, error?}` body every endpoint answers with.

use axum::{
    extract::rejection::{BytesRejection, JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::auth::dto::IssuedToken;
use crate::validation::ValidationErrors;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<IssuedToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            token: None,
            error: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            token: None,
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            token: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, error: impl Into<Value>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::fail(message)
        }
    }

    pub fn with_token(mut self, token: IssuedToken) -> Self {
        self.token = Some(token);
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Request refused before any service ran.
#[derive(Debug)]
pub struct ApiRejection {
    pub status: StatusCode,
    pub body: Envelope<()>,
}

impl ApiRejection {
    pub fn new(status: StatusCode, body: Envelope<()>) -> Self {
        Self { status, body }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, Envelope::fail(message))
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ValidationErrors> for ApiRejection {
    fn from(errors: ValidationErrors) -> Self {
        let detail = serde_json::to_value(&errors).unwrap_or(Value::Null);
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            Envelope::error("Validation failed", detail),
        )
    }
}

impl From<JsonRejection> for ApiRejection {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Envelope::error("Invalid request body", rejection.body_text()),
        )
    }
}

impl From<PathRejection> for ApiRejection {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            rejection.status(),
            Envelope::error("Invalid path parameter", rejection.body_text()),
        )
    }
}

/// Keeps the extractor's status, so an over-limit body stays a 413.
impl From<BytesRejection> for ApiRejection {
    fn from(rejection: BytesRejection) -> Self {
        Self::new(
            rejection.status(),
            Envelope::error("Invalid request body", rejection.body_text()),
        )
    }
}

use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::models::ValidationError;
use crate::storage::StorageError;
use crate::utils::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Authentication required")]
    Authentication,
    #[error("Authentication failed")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl std::fmt::Debug for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Authentication | ApiError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Validation(e) => ErrorBody {
                message: e.to_string(),
                field: Some(e.field),
            },
            // Internals stay in the logs.
            ApiError::Unexpected(_) => ErrorBody {
                message: "Internal server error".into(),
                field: None,
            },
            other => ErrorBody {
                message: other.to_string(),
                field: None,
            },
        };
        let mut response = HttpResponse::build(self.status_code()).json(body);
        if let ApiError::InvalidCredentials(_) = self {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="optica""#),
            );
        }
        response
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ProductNotFound(id) => ApiError::NotFound(format!("Product {id}")),
            StorageError::MissingReference(field) => ApiError::Validation(ValidationError::new(
                field,
                "references a record that does not exist",
            )),
            StorageError::Conflict(message) => ApiError::Conflict(message),
            e @ StorageError::Database(_) => ApiError::Unexpected(e.into()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials(_) => ApiError::InvalidCredentials(e.into()),
            AuthError::UnexpectedError(_) => ApiError::Unexpected(e.into()),
        }
    }
}

/// Turns body, query and path extraction failures into 400s with our error
/// shape instead of actix-web's plain-text defaults.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    ApiError::Validation(ValidationError::new("body", err.to_string())).into()
}

pub fn query_error_handler(
    err: actix_web::error::QueryPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    ApiError::Validation(ValidationError::new("query", err.to_string())).into()
}

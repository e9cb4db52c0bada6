use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use std::fmt;
use std::sync::PoisonError;

/// A single rejected form field.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> FieldError {
        FieldError {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum InternalError {
    #[error("Invalid input: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Generic internal error: {0}")]
    Other(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|field| field.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl InternalError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> InternalError {
        InternalError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> Status {
        match self {
            InternalError::Validation(_) => Status::UnprocessableEntity,
            InternalError::Unauthenticated => Status::Unauthorized,
            InternalError::Forbidden(_) => Status::Forbidden,
            InternalError::NotFound(_) => Status::NotFound,
            InternalError::Database(_)
            | InternalError::PasswordHash(_)
            | InternalError::Other(_) => Status::InternalServerError,
        }
    }
}

impl<T> From<PoisonError<T>> for InternalError {
    fn from(e: PoisonError<T>) -> InternalError {
        InternalError::Other(e.to_string())
    }
}

impl From<argon2::password_hash::Error> for InternalError {
    fn from(e: argon2::password_hash::Error) -> InternalError {
        InternalError::PasswordHash(e.to_string())
    }
}

impl From<&str> for InternalError {
    fn from(s: &str) -> InternalError {
        InternalError::Other(s.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl<'r> Responder<'r, 'static> for InternalError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!(uri = %request.uri(), "{}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            fields: match self {
                InternalError::Validation(fields) => fields,
                _ => vec![],
            },
        };

        Response::build_from(Json(body).respond_to(request)?)
            .status(status)
            .ok()
    }
}

pub type InternalResult<T> = Result<T, InternalError>;

// Copyright 2023 Remi Bernotavicius

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::DatabaseErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication credentials were not provided or are invalid")]
    AuthenticationRequired,

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("you cannot subscribe to yourself")]
    SelfReference,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Duplicate(_) | Self::SelfReference => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Replaces a store-level unique violation with `error`, leaving every other outcome of
/// the write alone.
pub fn unique_violation_as<T>(result: diesel::QueryResult<T>, error: Error) -> Result<T> {
    match result {
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            Err(error)
        }
        r => Ok(r?),
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("request failed with {status}: {self}");
        }

        (status, Json(serde_json::json!({ "errors": self.to_string() }))).into_response()
    }
}

#[test]
fn error_status_codes() {
    assert_eq!(Error::validation("x").status(), StatusCode::BAD_REQUEST);
    assert_eq!(Error::Duplicate("x".into()).status(), StatusCode::BAD_REQUEST);
    assert_eq!(Error::SelfReference.status(), StatusCode::BAD_REQUEST);
    assert_eq!(Error::AuthenticationRequired.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(Error::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(Error::NotFound("recipe").status(), StatusCode::NOT_FOUND);
    assert_eq!(
        Error::Internal("x".into()).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

use actix_web::{http::StatusCode, ResponseError};
use sea_orm::DbErr;
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Integrity(String),
    #[error(transparent)]
    Storage(#[from] DbErr),
}

impl AppError {
    pub fn param_error(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn duplicate() -> Self {
        Self::Duplicate("Duplicate entry".to_string())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Validation(_) => 1,
            Self::NotFound(_) => 2,
            Self::Duplicate(_) => 3,
            Self::Integrity(_) => 4,
            Self::Storage(_) => 99,
        }
    }

    pub fn msg(&self) -> String {
        match self {
            Self::Storage(_) => "system_exception".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Duplicate(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Integrity(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}

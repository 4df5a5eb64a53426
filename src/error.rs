//! Application error taxonomy.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

/// Application-level errors.
///
/// Transport failures are deliberately absent: a failed email send is an
/// expected business state reported through `SendOutcome`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The spreadsheet template is not on disk. Fatal for every render.
    #[error("template introuvable: {0}")]
    TemplateMissing(String),

    /// Record or file absent
    #[error("{0}")]
    NotFound(&'static str),

    /// Invalid input data
    #[error("donnée invalide: {0}")]
    Validation(String),

    /// Database operation failed
    #[error("erreur base de données: {0}")]
    Database(String),

    /// Generated-files directory operation failed
    #[error("erreur fichier: {0}")]
    Storage(String),

    /// Workbook patching failed
    #[error("erreur génération Excel: {0}")]
    Render(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, code) = match self {
            AppError::TemplateMissing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_MISSING"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Database(err) => {
                tracing::error!("database error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AppError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RENDER_ERROR"),
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        })
    }
}

/// JSON body for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type AppResult<T> = Result<T, AppError>;

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

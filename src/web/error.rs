use crate::error::AttendanceError;
use crate::web::views;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tera::Context;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Could not encode query: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("The attendance store is unavailable")]
    Poisoned,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::Attendance(AttendanceError::StudentNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::BadRequest(_) | AppError::Attendance(AttendanceError::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Attendance(
                AttendanceError::DuplicateStudent | AttendanceError::AlreadyMarked(_),
            ) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        let (template, key) = match status {
            StatusCode::NOT_FOUND => ("404.html", "error_message"),
            StatusCode::INTERNAL_SERVER_ERROR => {
                error!("An error occurred: {self}");
                ("general_error.html", "error")
            }
            _ => ("error.html", "error_message"),
        };

        let mut context = Context::new();
        context.insert(key, &message);

        match views::render(template, &context) {
            Ok(page) => (status, page).into_response(),
            Err(e) => {
                error!("Could not render {template}: {e}");
                (status, message).into_response()
            }
        }
    }
}

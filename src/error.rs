use chrono::NaiveDate;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

pub type Result<T, E = AttendanceError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Roll number or email already exists. Please try again with unique values.")]
    DuplicateStudent,

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Attendance for some students already exists for {0}.")]
    AlreadyMarked(NaiveDate),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("Could not connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: diesel::ConnectionError,
    },

    #[error("Could not run migrations: {0}")]
    Migration(Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not encode QR code: {0}")]
    QrCode(#[from] qrcode::types::QrError),

    #[error("Could not encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Could not render PDF: {0}")]
    Pdf(#[from] printpdf::Error),
}

/// Returns `true` if the error is a violated `UNIQUE` constraint.
pub fn is_unique_violation(error: &DieselError) -> bool {
    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

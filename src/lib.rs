//! A school attendance service: students are registered with a QR code that points at their
//! check-in URL, scanning it records them as present for the day, and teachers can mark whole days
//! by hand, browse the records, and download a PDF report.

pub mod cli;
pub mod display;
pub mod error;
pub mod mailer;
pub mod manager;
pub mod models;
pub mod qr;
pub mod report;
pub mod roster;
pub mod schema;
pub mod settings;
pub mod web;

pub use error::{AttendanceError, Result};
pub use manager::AttendanceManager;
pub use settings::Settings;

//! Bulk registration of students from a CSV roster.
//!
//! The roster has a header row with the columns `name`, `roll_number`, `class_name` and an
//! optional `email`.

use crate::error::{AttendanceError, Result};
use crate::manager::AttendanceManager;
use crate::models::NewStudentForm;
use crate::qr::CodeIssuer;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    /// Rows whose roll number or e-mail was already registered.
    pub skipped: usize,
}

/// Reads every student from the CSV roster at `path`.
pub fn read_roster(path: impl AsRef<Path>) -> anyhow::Result<Vec<NewStudentForm>> {
    let file = File::open(path.as_ref())?;
    read_roster_from(file)
}

pub fn read_roster_from<R: Read>(reader: R) -> anyhow::Result<Vec<NewStudentForm>> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let students = reader
        .deserialize()
        .collect::<Result<Vec<NewStudentForm>, csv::Error>>()?;

    Ok(students)
}

/// Registers every student on the roster, skipping the ones that are already registered.
pub fn import_roster(
    manager: &mut AttendanceManager,
    issuer: &CodeIssuer,
    roster: &[NewStudentForm],
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for student in roster {
        match manager.register_student(student, issuer) {
            Ok(_) => summary.added += 1,
            Err(AttendanceError::DuplicateStudent) => {
                warn!(roll = %student.roll_number, "student already registered, skipping");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(summary)
}

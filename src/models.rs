use crate::schema::{attendance, students};
use chrono::NaiveDate;
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A student on the roster.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub roll_number: String,
    pub class_name: String,
    pub email: Option<String>,
    /// Location of the student's QR code, relative to the static asset root.
    pub qr_code_path: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = students)]
pub struct NewStudent<'a> {
    pub name: &'a str,
    pub roll_number: &'a str,
    pub class_name: &'a str,
    pub email: Option<&'a str>,
    pub qr_code_path: Option<&'a str>,
}

/// The registration data for a student, as submitted through the form, the CLI, or a roster CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudentForm {
    pub name: String,
    pub roll_number: String,
    pub class_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl NewStudentForm {
    /// Returns the e-mail address, treating a blank value as no address at all.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// The attendance status of a student on a given day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsExpression, FromSqlRow, Serialize, Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
    Excused,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Present, Status::Absent, Status::Excused];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Excused => "excused",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown attendance status `{0}`")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            "excused" => Ok(Status::Excused),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl ToSql<Text, Sqlite> for Status {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for Status {
    fn from_sql(value: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        Ok(text.parse()?)
    }
}

/// A single attendance record for one student on one day.
#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = attendance)]
#[diesel(belongs_to(Student))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Attendance {
    pub id: i32,
    pub date: NaiveDate,
    pub student_id: i32,
    pub status: Status,
}

#[derive(Insertable, Debug, Clone, Copy)]
#[diesel(table_name = attendance)]
pub struct NewAttendance {
    pub date: NaiveDate,
    pub student_id: i32,
    pub status: Status,
}

/// An attendance record joined with the student it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: i32,
    pub date: NaiveDate,
    pub status: Status,
    pub student: Student,
}

impl From<(Attendance, Student)> for AttendanceRecord {
    fn from((record, student): (Attendance, Student)) -> Self {
        Self {
            id: record.id,
            date: record.date,
            status: record.status,
            student,
        }
    }
}

/// A student's attendance over every recorded day, organized by status.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StudentAttendance {
    pub present: Vec<NaiveDate>,
    pub excused: Vec<NaiveDate>,
    pub absent: Vec<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Present".parse(), Ok(Status::Present));
        assert_eq!(" absent ".parse(), Ok(Status::Absent));
        assert_eq!("EXCUSED".parse(), Ok(Status::Excused));
        assert!("late".parse::<Status>().is_err());
    }

    #[test]
    fn blank_email_is_no_email() {
        let mut form = NewStudentForm {
            name: "Alice".into(),
            roll_number: "R1".into(),
            class_name: "10A".into(),
            email: Some("   ".into()),
        };
        assert_eq!(form.email(), None);

        form.email = Some(" alice@example.com ".into());
        assert_eq!(form.email(), Some("alice@example.com"));
    }
}

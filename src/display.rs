use crate::error::Result;
use crate::manager::AttendanceManager;
use crate::models::{AttendanceRecord, Student};
use chrono::NaiveDate;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct StudentRow {
    id: i32,
    roll_number: String,
    name: String,
    class_name: String,
    email: String,
}

impl From<Student> for StudentRow {
    fn from(student: Student) -> Self {
        Self {
            id: student.id,
            roll_number: student.roll_number,
            name: student.name,
            class_name: student.class_name,
            email: student.email.unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct RecordRow {
    date: String,
    roll_number: String,
    name: String,
    class_name: String,
    status: String,
}

impl From<AttendanceRecord> for RecordRow {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            date: record.date.to_string(),
            roll_number: record.student.roll_number,
            name: record.student.name,
            class_name: record.student.class_name,
            status: record.status.to_string(),
        }
    }
}

fn roster_table(students: Vec<Student>) -> Table {
    let mut table = Table::new(students.into_iter().map(StudentRow::from));
    table.with(Style::modern());
    table
}

fn records_table(records: Vec<AttendanceRecord>) -> Table {
    let mut table = Table::new(records.into_iter().map(RecordRow::from));
    table.with(Style::modern());
    table
}

/// Pretty prints the roster.
pub fn show_roster(manager: &mut AttendanceManager, query: Option<&str>) -> Result<()> {
    let roster = manager.search_students(query)?;

    println!("Roster:\n{}", roster_table(roster));

    Ok(())
}

/// Pretty prints the attendance records.
pub fn show_records(manager: &mut AttendanceManager, query: Option<&str>) -> Result<()> {
    let records = manager.get_records(query)?;
    let shown = records.len();
    let total = manager.num_records()?;

    println!(
        "Attendance:\n{}\n{shown} of {total} record(s)",
        records_table(records)
    );

    Ok(())
}

/// Pretty prints every record for a single day.
pub fn show_day(manager: &mut AttendanceManager, date: NaiveDate) -> Result<()> {
    let records = manager.records_on(date)?;

    println!("Attendance on {date}:\n{}", records_table(records));

    Ok(())
}

/// Prints all info about a student, including the days they were present, excused, and absent.
pub fn show_student_info(manager: &mut AttendanceManager, student_id: i32) -> Result<()> {
    let student = manager.get_student(student_id)?;

    println!("Student Information:\n{:#?}", student);

    let attendance = manager.get_student_attendance(student_id)?;

    println!("Attendance:\n{:#?}", attendance);

    Ok(())
}

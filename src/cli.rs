//! This module contains the command-line interface [`Cli`] parser for running the attendance
//! server and managing attendance records from a terminal.

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::display;
use crate::manager::{AttendanceManager, CheckInOutcome};
use crate::models::{NewStudentForm, Status};
use crate::qr::CodeIssuer;
use crate::report::{EMPTY_REPORT_MESSAGE, ReportGenerator, ReportOutcome};
use crate::roster;
use crate::settings::Settings;
use crate::web;

/// The command line configuration struct, where the command-line interface parser is automatically
/// derived by [`clap::Parser`].
#[derive(Parser, Debug)]
#[command(version, about = "QR code check-in attendance for a school")]
pub struct Cli {
    /// The different commands available for managing student attendance records.
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the web server.
    Serve,

    /// Register a new student and issue their QR code.
    AddStudent(StudentArgs),

    /// Check a student in for today, as if their QR code was scanned.
    CheckIn { roll_number: String },

    /// Mark attendance for every student on a date. Students not listed are marked absent.
    Mark {
        /// The date to mark, as YYYY-MM-DD.
        #[arg(long)]
        date: NaiveDate,

        /// Roll numbers of students who were present.
        #[arg(long)]
        present: Vec<String>,

        /// Roll numbers of students who were excused.
        #[arg(long)]
        excused: Vec<String>,
    },

    /// List students, optionally only those whose name contains the query.
    ShowRoster {
        #[arg(long)]
        query: Option<String>,
    },

    /// List attendance records, optionally only those of students whose name contains the query.
    ShowRecords {
        #[arg(long)]
        query: Option<String>,
    },

    /// Show a student's details and attendance.
    ShowStudent { student_id: i32 },

    /// Write the PDF attendance report.
    Report {
        #[arg(long)]
        query: Option<String>,

        /// Also write the HTML rendering of the report to this file.
        #[arg(long)]
        html: Option<PathBuf>,
    },

    /// Register every student from a CSV roster.
    ImportRoster { file_path: PathBuf },
}

#[derive(Args, Debug)]
pub struct StudentArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub roll_number: String,

    #[arg(long)]
    pub class_name: String,

    #[arg(long)]
    pub email: Option<String>,
}

impl From<StudentArgs> for NewStudentForm {
    fn from(args: StudentArgs) -> Self {
        Self {
            name: args.name,
            roll_number: args.roll_number,
            class_name: args.class_name,
            email: args.email,
        }
    }
}

impl Command {
    pub fn run(self, settings: Settings) -> anyhow::Result<()> {
        if let Command::Serve = self {
            let runtime = tokio::runtime::Runtime::new()?;
            return runtime.block_on(web::start_server(settings));
        }

        let mut manager = AttendanceManager::connect(&settings.database.url)?;
        let issuer = CodeIssuer::new(&settings.server.base_url, &settings.paths.static_dir);

        match self {
            Command::Serve => unreachable!("handled above"),
            Command::AddStudent(args) => {
                let student = manager.register_student(&args.into(), &issuer)?;
                println!(
                    "Registered {} (ID {}), QR code at {}",
                    student.name,
                    student.id,
                    issuer
                        .static_dir()
                        .join(student.qr_code_path.unwrap_or_default())
                        .display()
                );
            }
            Command::CheckIn { roll_number } => {
                let check_in = manager.check_in(&roll_number)?;
                match check_in.outcome {
                    CheckInOutcome::Recorded => {
                        println!("Checked in {} for {}", check_in.student.name, check_in.date)
                    }
                    CheckInOutcome::AlreadyRecorded => println!(
                        "{} already has a record for {}",
                        check_in.student.name, check_in.date
                    ),
                }
            }
            Command::Mark {
                date,
                present,
                excused,
            } => {
                let mut submitted = HashMap::new();
                for (rolls, status) in [(present, Status::Present), (excused, Status::Excused)] {
                    for roll in rolls {
                        let Some(student) = manager.find_by_roll(&roll)? else {
                            bail!("no student with roll number `{roll}`");
                        };
                        submitted.insert(student.id, status);
                    }
                }

                let summary = manager.mark_attendance(date, &submitted)?;
                println!(
                    "Marked {} student(s) for {date}, {} already had a record",
                    summary.inserted, summary.skipped
                );
                display::show_day(&mut manager, date)?;
            }
            Command::ShowRoster { query } => display::show_roster(&mut manager, query.as_deref())?,
            Command::ShowRecords { query } => {
                display::show_records(&mut manager, query.as_deref())?
            }
            Command::ShowStudent { student_id } => {
                display::show_student_info(&mut manager, student_id)?
            }
            Command::Report { query, html } => {
                let generator =
                    ReportGenerator::new(&settings.paths.reports_dir, &settings.paths.static_dir)?;
                match generator.generate(&mut manager, query.as_deref())? {
                    ReportOutcome::Empty => println!("{EMPTY_REPORT_MESSAGE}"),
                    ReportOutcome::Generated(report) => {
                        println!(
                            "Wrote {} record(s) to {}",
                            report.total_records,
                            report.path.display()
                        );
                        if let Some(html_path) = html {
                            fs::write(&html_path, &report.html).with_context(|| {
                                format!("failed to write {}", html_path.display())
                            })?;
                            println!("Wrote HTML report to {}", html_path.display());
                        }
                    }
                }
            }
            Command::ImportRoster { file_path } => {
                let students = roster::read_roster(&file_path)
                    .with_context(|| format!("failed to read roster {}", file_path.display()))?;
                let summary = roster::import_roster(&mut manager, &issuer, &students)?;
                println!(
                    "Students added: {}, already registered: {}",
                    summary.added, summary.skipped
                );
            }
        }

        Ok(())
    }
}

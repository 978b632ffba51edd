use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form,
    extract::{Path, Query, State as AxumState},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tera::Context;
use tracing::{debug, warn};

use crate::{
    error::AttendanceError,
    manager::MarkSummary,
    models::{NewStudentForm, Status, Student},
    report::{EMPTY_REPORT_MESSAGE, REPORT_FILE_NAME, ReportOutcome},
    web::{error::AppError, state::State, views},
};

type AppState = AxumState<Arc<State>>;

const DUPLICATE_ATTENDANCE_MESSAGE: &str =
    "Attendance for some students already exists for this date.";

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuccessQuery {
    student_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorQuery {
    message: Option<String>,
}

pub async fn index_handler(
    AxumState(state): AppState,
    Query(search): Query<SearchQuery>,
) -> Result<Html<String>, AppError> {
    let query = search.query.clone();
    let students = state
        .with_manager(move |_, manager| Ok(manager.search_students(query.as_deref())?))
        .await?;

    let mut context = Context::new();
    context.insert("students", &students);
    context.insert("query", &search.query);

    Ok(views::render("index.html", &context)?)
}

pub async fn add_student_form_handler() -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("form", &NewStudentForm::default());

    Ok(views::render("add_student.html", &context)?)
}

pub async fn add_student_handler(
    AxumState(state): AppState,
    Form(form): Form<NewStudentForm>,
) -> Result<Response, AppError> {
    let submitted = form.clone();
    let registered = state
        .with_manager(move |state, manager| manager.register_student(&submitted, &state.issuer))
        .await;

    match registered {
        Ok(student) => {
            send_registration_email(&state, &student);
            Ok(Redirect::to(&format!("/student_details/{}", student.id)).into_response())
        }
        Err(AppError::Attendance(
            e @ (AttendanceError::DuplicateStudent | AttendanceError::InvalidInput(_)),
        )) => {
            let status = match e {
                AttendanceError::DuplicateStudent => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };

            let mut context = Context::new();
            context.insert("form", &form);
            context.insert("message", &e.to_string());
            context.insert("kind", "danger");

            Ok((status, views::render("add_student.html", &context)?).into_response())
        }
        Err(e) => Err(e),
    }
}

/// E-mails the student their QR code in the background. Failures are logged and otherwise
/// ignored.
fn send_registration_email(state: &Arc<State>, student: &Student) {
    let (Some(email), Some(qr_code_path)) = (&student.email, &student.qr_code_path) else {
        return;
    };
    if state.mailer.is_none() {
        debug!(id = student.id, "no mailer configured, skipping registration e-mail");
        return;
    }

    let state = Arc::clone(state);
    let email = email.clone();
    let name = student.name.clone();
    let qr_code_path = qr_code_path.clone();

    tokio::task::spawn_blocking(move || {
        let Some(mailer) = &state.mailer else {
            return;
        };

        let sent = state
            .issuer
            .read(&qr_code_path)
            .map_err(|e| e.to_string())
            .and_then(|png| {
                mailer
                    .send_registration(&email, &name, png)
                    .map_err(|e| e.to_string())
            });

        if let Err(e) = sent {
            warn!(%email, "Failed to send registration e-mail: {e}");
        }
    });
}

pub async fn student_details_handler(
    AxumState(state): AppState,
    Path(student_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let student_id: i32 = student_id
        .parse()
        .map_err(|_| AppError::NotFound(format!("No student with ID `{student_id}`")))?;

    let (student, summary, qr_code) = state
        .with_manager(move |state, manager| {
            let student = manager.get_student(student_id)?;
            let summary = manager.get_student_attendance(student_id)?;

            // Inline the image so the page doesn't depend on how static files are served.
            let qr_code = student
                .qr_code_path
                .as_deref()
                .and_then(|path| state.issuer.read(path).ok())
                .map(|png| format!("data:image/png;base64,{}", STANDARD.encode(png)));

            Ok((student, summary, qr_code))
        })
        .await?;

    let mut context = Context::new();
    context.insert("check_in_url", &state.issuer.check_in_url(&student.roll_number));
    context.insert("student", &student);
    context.insert("summary", &summary);
    context.insert("qr_code", &qr_code);

    Ok(views::render("student_details.html", &context)?)
}

pub async fn mark_attendance_form_handler(
    AxumState(state): AppState,
) -> Result<Html<String>, AppError> {
    let students = state
        .with_manager(|_, manager| Ok(manager.get_roster()?))
        .await?;

    render_mark_attendance(&students, Utc::now().date_naive(), None)
}

pub async fn mark_attendance_handler(
    AxumState(state): AppState,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let date = parse_date(fields.get("date").map(String::as_str))?;
    let submitted = parse_statuses(&fields)?;

    let (marked, students) = state
        .with_manager(move |_, manager| {
            let marked = match manager.mark_attendance(date, &submitted) {
                Ok(summary) => Ok(summary),
                Err(AttendanceError::AlreadyMarked(_)) => Err(()),
                Err(e) => return Err(e),
            };
            Ok((marked, manager.get_roster()?))
        })
        .await?;

    let page = render_mark_attendance(&students, date, Some(marked))?;
    let status = if marked.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };

    Ok((status, page).into_response())
}

fn render_mark_attendance(
    students: &[Student],
    date: NaiveDate,
    marked: Option<Result<MarkSummary, ()>>,
) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("students", students);
    context.insert("date", &date);
    context.insert(
        "statuses",
        &Status::ALL.iter().map(Status::as_str).collect::<Vec<_>>(),
    );

    match marked {
        Some(Ok(summary)) => {
            context.insert(
                "message",
                &format!(
                    "Attendance marked successfully. {} new record(s), {} student(s) already marked.",
                    summary.inserted, summary.skipped
                ),
            );
            context.insert("kind", "success");
        }
        Some(Err(())) => {
            context.insert("message", DUPLICATE_ATTENDANCE_MESSAGE);
            context.insert("kind", "danger");
        }
        None => {}
    }

    Ok(views::render("mark_attendance.html", &context)?)
}

fn parse_date(date: Option<&str>) -> Result<NaiveDate, AppError> {
    let date = date
        .map(str::trim)
        .filter(|date| !date.is_empty())
        .ok_or_else(|| AppError::BadRequest("A date is required.".to_string()))?;

    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date `{date}`, expected YYYY-MM-DD.")))
}

/// Collects the `status_<student id>` fields of the attendance form.
fn parse_statuses(fields: &HashMap<String, String>) -> Result<HashMap<i32, Status>, AppError> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix("status_")?.parse::<i32>().ok()?;
            Some((id, value))
        })
        .map(|(id, value)| {
            value
                .parse::<Status>()
                .map(|status| (id, status))
                .map_err(|e| AppError::BadRequest(e.to_string()))
        })
        .collect()
}

pub async fn check_in_handler(
    AxumState(state): AppState,
    Path(roll_number): Path<String>,
) -> Result<Redirect, AppError> {
    let checked_in = state
        .with_manager(move |_, manager| manager.check_in(&roll_number))
        .await;

    match checked_in {
        Ok(check_in) => redirect_with("/success", "student_name", &check_in.student.name),
        Err(AppError::Attendance(AttendanceError::StudentNotFound(_))) => {
            redirect_with("/error", "message", "Student not found")
        }
        Err(e) => Err(e),
    }
}

fn redirect_with(path: &str, key: &str, value: &str) -> Result<Redirect, AppError> {
    let query = serde_urlencoded::to_string([(key, value)])?;
    Ok(Redirect::to(&format!("{path}?{query}")))
}

pub async fn success_handler(Query(query): Query<SuccessQuery>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("student_name", &query.student_name);

    Ok(views::render("success.html", &context)?)
}

pub async fn error_handler(Query(query): Query<ErrorQuery>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("error_message", &query.message);

    Ok(views::render("error.html", &context)?)
}

pub async fn view_records_handler(
    AxumState(state): AppState,
    Query(search): Query<SearchQuery>,
) -> Result<Html<String>, AppError> {
    let query = search.query.clone();
    let (students, records) = state
        .with_manager(move |_, manager| {
            let students = manager.search_students(query.as_deref())?;
            let records = manager.get_records(query.as_deref())?;
            Ok((students, records))
        })
        .await?;

    let mut context = Context::new();
    context.insert("students", &students);
    context.insert("attendance_records", &records);
    context.insert("query", &search.query);

    Ok(views::render("view_records.html", &context)?)
}

pub async fn generate_report_handler(
    AxumState(state): AppState,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let outcome = state
        .with_manager(move |state, manager| state.reports.generate(manager, search.query.as_deref()))
        .await?;

    match outcome {
        ReportOutcome::Empty => {
            let mut context = Context::new();
            context.insert("error_message", EMPTY_REPORT_MESSAGE);

            Ok(views::render("error.html", &context)?.into_response())
        }
        ReportOutcome::Generated(report) => Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{REPORT_FILE_NAME}\""),
                ),
            ],
            report.pdf,
        )
            .into_response()),
    }
}

pub async fn not_found_handler() -> AppError {
    AppError::NotFound("The page you requested does not exist.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_read_from_prefixed_fields() {
        let fields = HashMap::from([
            ("date".to_string(), "2024-01-10".to_string()),
            ("status_1".to_string(), "present".to_string()),
            ("status_2".to_string(), "Excused".to_string()),
            ("status_x".to_string(), "present".to_string()),
        ]);

        let statuses = parse_statuses(&fields).unwrap();

        assert_eq!(
            statuses,
            HashMap::from([(1, Status::Present), (2, Status::Excused)])
        );
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        let fields = HashMap::from([("status_1".to_string(), "late".to_string())]);
        assert!(matches!(
            parse_statuses(&fields),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn dates_must_be_iso_formatted() {
        assert_eq!(
            parse_date(Some("2024-01-10")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
        assert!(matches!(
            parse_date(Some("10/01/2024")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(parse_date(None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn redirects_encode_their_query() {
        let redirect = redirect_with("/error", "message", "Student not found").unwrap();
        let response = redirect.into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/error?message=Student+not+found"
        );
    }
}

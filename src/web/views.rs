//! The HTML pages served by the web surface. Templates are compiled into the binary.

use axum::response::Html;
use std::sync::OnceLock;
use tera::{Context, Tera};

const TEMPLATES: [(&str, &str); 10] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("index.html", include_str!("../../templates/index.html")),
    ("add_student.html", include_str!("../../templates/add_student.html")),
    (
        "student_details.html",
        include_str!("../../templates/student_details.html"),
    ),
    (
        "mark_attendance.html",
        include_str!("../../templates/mark_attendance.html"),
    ),
    ("success.html", include_str!("../../templates/success.html")),
    ("error.html", include_str!("../../templates/error.html")),
    ("view_records.html", include_str!("../../templates/view_records.html")),
    ("404.html", include_str!("../../templates/404.html")),
    (
        "general_error.html",
        include_str!("../../templates/general_error.html"),
    ),
];

static VIEWS: OnceLock<Tera> = OnceLock::new();

/// Parses the built-in templates on first use. The server calls this while starting up, so a
/// broken template stops it before it accepts requests.
pub fn load() -> Result<&'static Tera, tera::Error> {
    if let Some(views) = VIEWS.get() {
        return Ok(views);
    }

    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES)?;

    Ok(VIEWS.get_or_init(|| tera))
}

pub fn render(template: &str, context: &Context) -> Result<Html<String>, tera::Error> {
    load()?.render(template, context).map(Html)
}

//! Renders every attendance record into a downloadable PDF report.
//!
//! The report is a flat list of records, labelled with the date of the first record and the total
//! number of records. The same projection feeds both the HTML document (rendered with the
//! `report_template.html` template) and the PDF written to the reports directory. Both show each
//! student's QR code, read from the resolved path under the static asset root.

use crate::error::Result;
use crate::manager::AttendanceManager;
use crate::models::{AttendanceRecord, Status};
use chrono::{NaiveDate, Utc};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, image_crate,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Tera};
use tracing::{info, warn};

pub const EMPTY_REPORT_MESSAGE: &str = "No attendance records found for the report.";
pub const REPORT_FILE_NAME: &str = "attendance_report.pdf";

const REPORT_TEMPLATE: &str = "report_template.html";
const REPORT_TITLE: &str = "Attendance Report";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const LINE_HEIGHT: f32 = 7.0;
const ROW_HEIGHT: f32 = 14.0;
const FONT_SIZE: f32 = 10.0;

/// Edge length of the QR code drawn on each row, in millimetres.
const QR_SIZE: f32 = 12.0;
const QR_COLUMN: (&str, f32) = ("QR code", 172.0);

/// Left edge and width (in characters) of each text column in the PDF table.
const COLUMNS: [(&str, f32, usize); 5] = [
    ("Date", MARGIN, 12),
    ("Name", 44.0, 26),
    ("Roll number", 100.0, 14),
    ("Class", 130.0, 10),
    ("Status", 152.0, 8),
];

#[derive(Debug)]
pub enum ReportOutcome {
    /// There were no attendance records to report on.
    Empty,
    Generated(GeneratedReport),
}

#[derive(Debug)]
pub struct GeneratedReport {
    /// Where the PDF was written.
    pub path: PathBuf,
    pub html: String,
    pub pdf: Vec<u8>,
    /// The date of the first record in the report.
    pub date: NaiveDate,
    pub total_records: usize,
}

/// One line of the report.
#[derive(Debug, Clone, Serialize)]
struct ReportRow {
    date: NaiveDate,
    name: String,
    roll_number: String,
    class_name: String,
    status: Status,
    /// Absolute path of the student's QR code image.
    qr_code: Option<String>,
}

pub struct ReportGenerator {
    reports_dir: PathBuf,
    static_dir: PathBuf,
    templates: Tera,
}

impl ReportGenerator {
    pub fn new(reports_dir: impl Into<PathBuf>, static_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut templates = Tera::default();
        templates.add_raw_template(
            REPORT_TEMPLATE,
            include_str!("../templates/report_template.html"),
        )?;

        Ok(Self {
            reports_dir: reports_dir.into(),
            static_dir: static_dir.into(),
            templates,
        })
    }

    /// The fixed location the PDF report is written to.
    pub fn report_path(&self) -> PathBuf {
        self.reports_dir.join(REPORT_FILE_NAME)
    }

    /// Generates the report over every attendance record, or only the records of students whose
    /// name contains `query`.
    pub fn generate(
        &self,
        manager: &mut AttendanceManager,
        query: Option<&str>,
    ) -> Result<ReportOutcome> {
        let records = manager.get_records(query)?;

        // The report is labelled with whichever record the query returned first.
        let Some(date) = records.first().map(|record| record.date) else {
            info!(?query, "no attendance records to report");
            return Ok(ReportOutcome::Empty);
        };

        let rows: Vec<ReportRow> = records
            .into_iter()
            .map(|record| self.project(record))
            .collect();
        let total_records = rows.len();

        let html = self.render_html(&rows, date)?;
        let pdf = render_pdf(&rows, date)?;

        fs::create_dir_all(&self.reports_dir)?;
        let path = self.report_path();
        fs::write(&path, &pdf)?;
        info!(path = %path.display(), total_records, "generated attendance report");

        Ok(ReportOutcome::Generated(GeneratedReport {
            path,
            html,
            pdf,
            date,
            total_records,
        }))
    }

    /// Resolves a `static/...` reference to a file under the static asset root. Any other
    /// reference is returned unchanged.
    pub fn resolve_asset(&self, uri: &str) -> String {
        match uri.strip_prefix("static/") {
            Some(relative) => {
                let path = self.static_dir.join(relative);
                std::path::absolute(&path)
                    .unwrap_or(path)
                    .display()
                    .to_string()
            }
            None => uri.to_string(),
        }
    }

    fn project(&self, record: AttendanceRecord) -> ReportRow {
        let qr_code = record
            .student
            .qr_code_path
            .as_deref()
            .map(|path| self.resolve_asset(&format!("static/{path}")));

        ReportRow {
            date: record.date,
            name: record.student.name,
            roll_number: record.student.roll_number,
            class_name: record.student.class_name,
            status: record.status,
            qr_code,
        }
    }

    fn render_html(&self, rows: &[ReportRow], date: NaiveDate) -> Result<String> {
        let mut context = Context::new();
        context.insert("attendance_records", rows);
        context.insert("date", &date);
        context.insert("total_records", &rows.len());
        context.insert(
            "generated_at",
            &Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        );

        Ok(self.templates.render(REPORT_TEMPLATE, &context)?)
    }
}

fn render_pdf(rows: &[ReportRow], date: NaiveDate) -> Result<Vec<u8>> {
    let (doc, page, layer) =
        PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut layer = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT - MARGIN;

    layer.use_text(REPORT_TITLE, 20.0, Mm(MARGIN), Mm(y), &bold);
    y -= 2.0 * LINE_HEIGHT;
    layer.use_text(format!("Date: {date}"), 12.0, Mm(MARGIN), Mm(y), &regular);
    y -= LINE_HEIGHT;
    layer.use_text(
        format!("Total records: {}", rows.len()),
        12.0,
        Mm(MARGIN),
        Mm(y),
        &regular,
    );
    y -= 2.0 * LINE_HEIGHT;

    write_header(&layer, y, &bold);
    y -= ROW_HEIGHT;

    // A student with many records shares one decoded image.
    let mut codes: HashMap<&str, Option<image::GrayImage>> = HashMap::new();

    for row in rows {
        if y < MARGIN {
            layer = new_page(&doc);
            y = PAGE_HEIGHT - MARGIN;
            write_header(&layer, y, &bold);
            y -= ROW_HEIGHT;
        }

        let cells = [
            row.date.to_string(),
            row.name.clone(),
            row.roll_number.clone(),
            row.class_name.clone(),
            row.status.to_string(),
        ];
        for (cell, (_, x, width)) in cells.iter().zip(COLUMNS) {
            layer.use_text(fit(cell, width), FONT_SIZE, Mm(x), Mm(y), &regular);
        }

        if let Some(path) = row.qr_code.as_deref() {
            let code = codes.entry(path).or_insert_with(|| load_qr_code(path));
            if let Some(code) = code {
                draw_qr_code(&layer, code, y);
            }
        }

        y -= ROW_HEIGHT;
    }

    Ok(doc.save_to_bytes()?)
}

/// Reads a student's QR code for embedding. A missing or unreadable image leaves the cell blank.
fn load_qr_code(path: &str) -> Option<image::GrayImage> {
    match image::open(path) {
        Ok(code) => Some(code.to_luma8()),
        Err(e) => {
            warn!(path, error = %e, "could not read QR code for report");
            None
        }
    }
}

/// Draws `code` in the QR column, scaled to `QR_SIZE` and centred on the row's text line.
fn draw_qr_code(layer: &PdfLayerReference, code: &image::GrayImage, y: f32) {
    let (width, height) = code.dimensions();
    let Some(pixels) = image_crate::GrayImage::from_raw(width, height, code.as_raw().clone())
    else {
        return;
    };
    let image = Image::from_dynamic_image(&image_crate::DynamicImage::ImageLuma8(pixels));

    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(QR_COLUMN.1)),
            translate_y: Some(Mm(y - QR_SIZE / 3.0)),
            dpi: Some(width as f32 * 25.4 / QR_SIZE),
            ..Default::default()
        },
    );
}

fn new_page(doc: &PdfDocumentReference) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

fn write_header(layer: &PdfLayerReference, y: f32, font: &IndirectFontRef) {
    for (title, x, _) in COLUMNS {
        layer.use_text(title, FONT_SIZE, Mm(x), Mm(y), font);
    }
    let (title, x) = QR_COLUMN;
    layer.use_text(title, FONT_SIZE, Mm(x), Mm(y), font);
}

/// Truncates `text` to at most `width` characters, marking the cut with an ellipsis.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }

    let mut fitted: String = text.chars().take(width.saturating_sub(3)).collect();
    fitted.push_str("...");
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::{form, setup};
    use std::collections::HashMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn is_pdf(path: &std::path::Path) -> bool {
        fs::read(path)
            .map(|bytes| bytes.starts_with(b"%PDF"))
            .unwrap_or(false)
    }

    fn embeds_image(pdf: &[u8]) -> bool {
        pdf.windows(b"/Image".len()).any(|window| window == b"/Image")
    }

    #[test]
    fn empty_store_yields_empty_outcome() {
        let (mut manager, _issuer, dir) = setup();
        let generator = ReportGenerator::new(dir.path().join("reports"), dir.path()).unwrap();

        let outcome = generator.generate(&mut manager, None).unwrap();

        assert!(matches!(outcome, ReportOutcome::Empty));
        assert!(!generator.report_path().exists());
    }

    #[test]
    fn report_lists_every_record_with_first_date() {
        let (mut manager, issuer, dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager
            .register_student(&form("Bob", "R2", None), &issuer)
            .unwrap();
        manager.check_in_on("R2", date("2024-02-01")).unwrap();
        manager
            .mark_attendance(date("2024-01-10"), &HashMap::new())
            .unwrap();

        let generator =
            ReportGenerator::new(dir.path().join("reports"), dir.path().join("static")).unwrap();
        let ReportOutcome::Generated(report) = generator.generate(&mut manager, None).unwrap()
        else {
            panic!("expected a generated report");
        };

        // The first record by insertion order, not the earliest date.
        assert_eq!(report.date, date("2024-02-01"));
        assert_eq!(report.total_records, 3);
        assert_eq!(report.path, dir.path().join("reports").join(REPORT_FILE_NAME));
        assert!(is_pdf(&report.path));
        assert!(report.pdf.starts_with(b"%PDF"));
        assert!(report.html.contains("Alice"));
        assert!(report.html.contains("Bob"));
        assert!(report.html.contains("Total records: 3"));
    }

    #[test]
    fn report_can_be_filtered_by_name() {
        let (mut manager, issuer, dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager
            .register_student(&form("Bob", "R2", None), &issuer)
            .unwrap();
        manager.check_in("R1").unwrap();
        manager.check_in("R2").unwrap();

        let generator = ReportGenerator::new(dir.path().join("reports"), dir.path()).unwrap();

        let ReportOutcome::Generated(report) =
            generator.generate(&mut manager, Some("ali")).unwrap()
        else {
            panic!("expected a generated report");
        };
        assert_eq!(report.total_records, 1);
        assert!(!report.html.contains("Bob"));

        let nobody = generator.generate(&mut manager, Some("Zed")).unwrap();
        assert!(matches!(nobody, ReportOutcome::Empty));
    }

    #[test]
    fn report_embeds_each_students_qr_code() {
        let (mut manager, issuer, dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager.check_in("R1").unwrap();

        let generator =
            ReportGenerator::new(dir.path().join("reports"), dir.path().join("static")).unwrap();
        let ReportOutcome::Generated(report) = generator.generate(&mut manager, None).unwrap()
        else {
            panic!("expected a generated report");
        };

        let qr_code = generator.resolve_asset("static/qr_codes/R1.png");
        let escaped = tera::escape_html(&qr_code);
        assert!(report.html.contains(&format!("src=\"{escaped}\"")));
        assert!(embeds_image(&report.pdf));
    }

    #[test]
    fn missing_qr_codes_leave_the_cell_blank() {
        let (mut manager, issuer, dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager.check_in("R1").unwrap();
        fs::remove_file(dir.path().join("static/qr_codes/R1.png")).unwrap();

        let generator =
            ReportGenerator::new(dir.path().join("reports"), dir.path().join("static")).unwrap();
        let ReportOutcome::Generated(report) = generator.generate(&mut manager, None).unwrap()
        else {
            panic!("expected a generated report");
        };

        assert_eq!(report.total_records, 1);
        assert!(report.pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn long_reports_span_pages() {
        let (mut manager, issuer, dir) = setup();
        for i in 0..60 {
            manager
                .register_student(&form(&format!("Student {i}"), &format!("R{i}"), None), &issuer)
                .unwrap();
        }
        manager
            .mark_attendance(date("2024-01-10"), &HashMap::new())
            .unwrap();

        let generator = ReportGenerator::new(dir.path().join("reports"), dir.path()).unwrap();
        let ReportOutcome::Generated(report) = generator.generate(&mut manager, None).unwrap()
        else {
            panic!("expected a generated report");
        };

        assert_eq!(report.total_records, 60);
        assert!(report.pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn static_references_resolve_under_static_root() {
        let dir = tempfile::tempdir().unwrap();
        let generator =
            ReportGenerator::new(dir.path().join("reports"), dir.path().join("assets")).unwrap();

        let resolved = generator.resolve_asset("static/qr_codes/R1.png");
        assert!(resolved.ends_with("qr_codes/R1.png"));
        assert!(resolved.contains("assets"));

        assert_eq!(
            generator.resolve_asset("https://example.com/logo.png"),
            "https://example.com/logo.png"
        );
    }

    #[test]
    fn fit_truncates_long_cells() {
        assert_eq!(fit("Alice", 10), "Alice");
        assert_eq!(fit("Bartholomew Montgomery", 10), "Barthol...");
    }
}

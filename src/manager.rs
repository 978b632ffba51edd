use crate::error::{AttendanceError, Result, is_unique_violation};
use crate::models::{
    Attendance, AttendanceRecord, NewAttendance, NewStudent, NewStudentForm, Status, Student,
    StudentAttendance,
};
use crate::qr::{self, CodeIssuer};
use crate::schema::{attendance, students};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::{Error as DieselError, QueryResult};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// What happened when a student scanned their check-in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// A new `present` record was created.
    Recorded,
    /// The student already had a record for the day, so nothing changed.
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub student: Student,
    pub date: NaiveDate,
    pub outcome: CheckInOutcome,
}

/// The result of marking attendance for a whole day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkSummary {
    /// Students that received a new record.
    pub inserted: usize,
    /// Students that already had a record for the day and were left untouched.
    pub skipped: usize,
}

/// The manager for recording and retrieving attendance data.
pub struct AttendanceManager {
    db: SqliteConnection,
}

impl AttendanceManager {
    /// Creates a new `AttendanceManager` by connecting to the `sqlite3` database at `database_url`
    /// and bringing its schema up to date.
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut db = SqliteConnection::establish(database_url).map_err(|source| {
            AttendanceError::Connection {
                url: database_url.to_string(),
                source,
            }
        })?;

        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut db)?;

        let applied = db
            .run_pending_migrations(MIGRATIONS)
            .map_err(AttendanceError::Migration)?;
        if !applied.is_empty() {
            info!(count = applied.len(), "applied pending migrations");
        }

        Ok(Self { db })
    }

    /// Returns the total number of students on the roster.
    pub fn num_students(&mut self) -> QueryResult<usize> {
        students::table
            .count()
            .get_result(&mut self.db)
            .map(|count: i64| count as usize)
    }

    /// Returns the total number of attendance records.
    pub fn num_records(&mut self) -> QueryResult<usize> {
        attendance::table
            .count()
            .get_result(&mut self.db)
            .map(|count: i64| count as usize)
    }

    /// Retrieves all students on the roster.
    pub fn get_roster(&mut self) -> QueryResult<Vec<Student>> {
        self.search_students(None)
    }

    /// Retrieves all students whose name contains `query`, or every student if there is no query.
    pub fn search_students(&mut self, query: Option<&str>) -> QueryResult<Vec<Student>> {
        let mut found = students::table
            .select(Student::as_select())
            .order(students::id)
            .into_boxed();

        if let Some(query) = normalize_query(query) {
            found = found.filter(students::name.like(like_pattern(query)).escape('\\'));
        }

        found.load(&mut self.db)
    }

    /// Retrieves a specific student from the roster based on their ID.
    pub fn get_student(&mut self, student_id: i32) -> Result<Student> {
        students::table
            .find(student_id)
            .select(Student::as_select())
            .first(&mut self.db)
            .optional()?
            .ok_or_else(|| AttendanceError::StudentNotFound(student_id.to_string()))
    }

    /// Looks up a student by their roll number.
    pub fn find_by_roll(&mut self, roll: &str) -> QueryResult<Option<Student>> {
        students::table
            .filter(students::roll_number.eq(roll))
            .select(Student::as_select())
            .first(&mut self.db)
            .optional()
    }

    /// Registers a new student and issues their QR code.
    ///
    /// The insert and the QR code are one unit: if the code cannot be written, the student is not
    /// registered. A roll number or e-mail that is already taken yields
    /// [`AttendanceError::DuplicateStudent`] and leaves the roster unchanged.
    pub fn register_student(
        &mut self,
        form: &NewStudentForm,
        issuer: &CodeIssuer,
    ) -> Result<Student> {
        let name = required(&form.name, "name")?;
        let roll_number = required(&form.roll_number, "roll number")?;
        let class_name = required(&form.class_name, "class")?;
        qr::validate_roll_number(roll_number)?;

        let qr_code_path = CodeIssuer::relative_path(roll_number);
        let new_student = NewStudent {
            name,
            roll_number,
            class_name,
            email: form.email(),
            qr_code_path: Some(&qr_code_path),
        };

        let registered = self.db.transaction::<_, AttendanceError, _>(|conn| {
            let student = diesel::insert_into(students::table)
                .values(&new_student)
                .returning(Student::as_returning())
                .get_result(conn)?;

            issuer.issue(roll_number)?;

            Ok(student)
        });

        match registered {
            Ok(student) => {
                info!(id = student.id, roll = %student.roll_number, "registered student");
                Ok(student)
            }
            Err(AttendanceError::Database(e)) if is_unique_violation(&e) => {
                debug!(roll = %roll_number, "rejected duplicate student: {e}");
                Err(AttendanceError::DuplicateStudent)
            }
            Err(e) => Err(e),
        }
    }

    /// Records a `present` status for the student with the given roll number for today (UTC).
    pub fn check_in(&mut self, roll: &str) -> Result<CheckIn> {
        self.check_in_on(roll, Utc::now().date_naive())
    }

    /// Records a `present` status for the student with the given roll number on `date`.
    ///
    /// Checking in more than once on the same day is harmless: the first record stands and no
    /// second record is created.
    pub fn check_in_on(&mut self, roll: &str, date: NaiveDate) -> Result<CheckIn> {
        let student = self
            .find_by_roll(roll)?
            .ok_or_else(|| AttendanceError::StudentNotFound(roll.to_string()))?;

        let record = NewAttendance {
            date,
            student_id: student.id,
            status: Status::Present,
        };

        // If the record already exists, do nothing.
        let inserted = self.db.transaction::<_, DieselError, _>(|conn| {
            diesel::insert_or_ignore_into(attendance::table)
                .values(&record)
                .execute(conn)
        })?;

        let outcome = if inserted == 0 {
            CheckInOutcome::AlreadyRecorded
        } else {
            CheckInOutcome::Recorded
        };
        info!(roll = %student.roll_number, %date, ?outcome, "check-in");

        Ok(CheckIn {
            student,
            date,
            outcome,
        })
    }

    /// For a given date, gives every student without a record for that date the status submitted
    /// for them in `submitted`, or [`Status::Absent`] if nothing was submitted.
    ///
    /// Students that already have a record for `date` are skipped; existing records are never
    /// overwritten. The whole batch is a single transaction: if any insert hits the uniqueness
    /// constraint, nothing from the batch is kept and [`AttendanceError::AlreadyMarked`] is
    /// returned.
    pub fn mark_attendance(
        &mut self,
        date: NaiveDate,
        submitted: &HashMap<i32, Status>,
    ) -> Result<MarkSummary> {
        let marked = self.db.transaction::<_, DieselError, _>(|conn| {
            let roster: Vec<Student> = students::table
                .select(Student::as_select())
                .order(students::id)
                .load(conn)?;

            for id in submitted.keys() {
                if !roster.iter().any(|student| student.id == *id) {
                    warn!(student_id = id, "tried to mark an unknown student");
                }
            }

            let already_marked: HashSet<i32> = attendance::table
                .filter(attendance::date.eq(date))
                .select(attendance::student_id)
                .load::<i32>(conn)?
                .into_iter()
                .collect();

            let records: Vec<NewAttendance> = roster
                .iter()
                .filter(|student| !already_marked.contains(&student.id))
                .map(|student| NewAttendance {
                    date,
                    student_id: student.id,
                    status: submitted
                        .get(&student.id)
                        .copied()
                        .unwrap_or(Status::Absent),
                })
                .collect();

            let skipped = roster.len() - records.len();
            if records.is_empty() {
                return Ok(MarkSummary {
                    inserted: 0,
                    skipped,
                });
            }

            let inserted = diesel::insert_into(attendance::table)
                .values(&records)
                .execute(conn)?;

            Ok(MarkSummary { inserted, skipped })
        });

        match marked {
            Ok(summary) => {
                info!(%date, inserted = summary.inserted, skipped = summary.skipped, "marked attendance");
                Ok(summary)
            }
            Err(e) if is_unique_violation(&e) => Err(AttendanceError::AlreadyMarked(date)),
            Err(e) => Err(e.into()),
        }
    }

    /// Retrieves every attendance record along with its student, optionally restricted to
    /// students whose name contains `query`.
    pub fn get_records(&mut self, query: Option<&str>) -> QueryResult<Vec<AttendanceRecord>> {
        let mut found = attendance::table
            .inner_join(students::table)
            .select((Attendance::as_select(), Student::as_select()))
            .order(attendance::id)
            .into_boxed();

        if let Some(query) = normalize_query(query) {
            found = found.filter(students::name.like(like_pattern(query)).escape('\\'));
        }

        Ok(found
            .load::<(Attendance, Student)>(&mut self.db)?
            .into_iter()
            .map(AttendanceRecord::from)
            .collect())
    }

    /// Retrieves the attendance records for a single day.
    pub fn records_on(&mut self, date: NaiveDate) -> QueryResult<Vec<AttendanceRecord>> {
        Ok(attendance::table
            .inner_join(students::table)
            .filter(attendance::date.eq(date))
            .select((Attendance::as_select(), Student::as_select()))
            .order(attendance::id)
            .load::<(Attendance, Student)>(&mut self.db)?
            .into_iter()
            .map(AttendanceRecord::from)
            .collect())
    }

    /// Retrieves a student's attendance over every recorded day.
    pub fn get_student_attendance(&mut self, student_id: i32) -> Result<StudentAttendance> {
        let student = self.get_student(student_id)?;

        let records = Attendance::belonging_to(&student)
            .select(Attendance::as_select())
            .order(attendance::date)
            .load(&mut self.db)?;

        // Organize records by status
        let mut summary = StudentAttendance::default();
        for record in records {
            match record.status {
                Status::Present => summary.present.push(record.date),
                Status::Excused => summary.excused.push(record.date),
                Status::Absent => summary.absent.push(record.date),
            }
        }

        Ok(summary)
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        Err(AttendanceError::InvalidInput(format!("{field} is required")))
    } else {
        Ok(value)
    }
}

/// Treats a missing or blank search query as no filter at all.
fn normalize_query(query: Option<&str>) -> Option<&str> {
    query.map(str::trim).filter(|query| !query.is_empty())
}

/// Builds a `LIKE` pattern matching any name that contains `query` literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn setup() -> (AttendanceManager, CodeIssuer, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = AttendanceManager::connect(":memory:").unwrap();
        let issuer = CodeIssuer::new("http://localhost:5000", dir.path().join("static"));
        (manager, issuer, dir)
    }

    pub(crate) fn form(name: &str, roll: &str, email: Option<&str>) -> NewStudentForm {
        NewStudentForm {
            name: name.to_string(),
            roll_number: roll.to_string(),
            class_name: "10A".to_string(),
            email: email.map(str::to_string),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn register_student_issues_qr_code() {
        let (mut manager, issuer, dir) = setup();

        let student = manager
            .register_student(&form("Alice", "R1", Some("alice@example.com")), &issuer)
            .unwrap();

        assert_eq!(student.roll_number, "R1");
        assert_eq!(student.qr_code_path.as_deref(), Some("qr_codes/R1.png"));
        assert!(dir.path().join("static/qr_codes/R1.png").exists());
        assert_eq!(manager.get_student(student.id).unwrap(), student);
    }

    #[test]
    fn duplicate_roll_number_or_email_is_rejected() {
        let (mut manager, issuer, _dir) = setup();
        manager
            .register_student(&form("Alice", "R1", Some("alice@example.com")), &issuer)
            .unwrap();

        let same_roll = manager.register_student(&form("Bob", "R1", None), &issuer);
        assert!(matches!(same_roll, Err(AttendanceError::DuplicateStudent)));

        let same_email =
            manager.register_student(&form("Bob", "R2", Some("alice@example.com")), &issuer);
        assert!(matches!(same_email, Err(AttendanceError::DuplicateStudent)));

        assert_eq!(manager.num_students().unwrap(), 1);
        assert!(manager.find_by_roll("R2").unwrap().is_none());
    }

    #[test]
    fn students_without_email_do_not_collide() {
        let (mut manager, issuer, _dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager
            .register_student(&form("Bob", "R2", Some("")), &issuer)
            .unwrap();

        assert_eq!(manager.num_students().unwrap(), 2);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let (mut manager, issuer, _dir) = setup();

        let result = manager.register_student(&form("  ", "R1", None), &issuer);

        assert!(matches!(result, Err(AttendanceError::InvalidInput(_))));
        assert_eq!(manager.num_students().unwrap(), 0);
    }

    #[test]
    fn repeated_check_in_creates_one_record() {
        let (mut manager, issuer, _dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();

        let first = manager.check_in("R1").unwrap();
        let second = manager.check_in("R1").unwrap();

        assert_eq!(first.outcome, CheckInOutcome::Recorded);
        assert_eq!(second.outcome, CheckInOutcome::AlreadyRecorded);

        let records = manager.get_records(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Present);
        assert_eq!(records[0].date, Utc::now().date_naive());
        assert_eq!(records[0].student.roll_number, "R1");
    }

    #[test]
    fn check_in_on_another_day_is_a_new_record() {
        let (mut manager, issuer, _dir) = setup();
        manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();

        manager.check_in_on("R1", date("2024-01-10")).unwrap();
        manager.check_in_on("R1", date("2024-01-11")).unwrap();

        assert_eq!(manager.num_records().unwrap(), 2);
    }

    #[test]
    fn unknown_roll_number_is_not_found() {
        let (mut manager, _issuer, _dir) = setup();

        let result = manager.check_in("nobody");

        assert!(matches!(result, Err(AttendanceError::StudentNotFound(roll)) if roll == "nobody"));
        assert_eq!(manager.num_records().unwrap(), 0);
    }

    #[test]
    fn mark_attendance_defaults_to_absent() {
        let (mut manager, issuer, _dir) = setup();
        let x = manager
            .register_student(&form("Xavier", "X", None), &issuer)
            .unwrap();
        let y = manager
            .register_student(&form("Yasmin", "Y", None), &issuer)
            .unwrap();
        let on = date("2024-01-10");

        let submitted = HashMap::from([(x.id, Status::Absent)]);
        let summary = manager.mark_attendance(on, &submitted).unwrap();

        assert_eq!(
            summary,
            MarkSummary {
                inserted: 2,
                skipped: 0
            }
        );
        let records = manager.records_on(on).unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.status, Status::Absent);
            assert_eq!(record.date, on);
        }
        assert!(records.iter().any(|r| r.student.id == y.id));
    }

    #[test]
    fn mark_attendance_skips_students_already_marked() {
        let (mut manager, issuer, _dir) = setup();
        let alice = manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        let bob = manager
            .register_student(&form("Bob", "R2", None), &issuer)
            .unwrap();
        let on = date("2024-01-10");
        manager.check_in_on("R1", on).unwrap();

        let submitted = HashMap::from([(alice.id, Status::Absent), (bob.id, Status::Excused)]);
        let summary = manager.mark_attendance(on, &submitted).unwrap();

        assert_eq!(
            summary,
            MarkSummary {
                inserted: 1,
                skipped: 1
            }
        );
        let records = manager.records_on(on).unwrap();
        let status_of = |id| records.iter().find(|r| r.student.id == id).unwrap().status;
        assert_eq!(status_of(alice.id), Status::Present);
        assert_eq!(status_of(bob.id), Status::Excused);

        let again = manager.mark_attendance(on, &HashMap::new()).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(manager.num_records().unwrap(), 2);
    }

    #[test]
    fn mark_attendance_rolls_back_the_whole_batch_on_conflict() {
        let (mut manager, issuer, _dir) = setup();
        for (name, roll) in [("Alice", "R1"), ("Bob", "R2"), ("Carol", "R3")] {
            manager
                .register_student(&form(name, roll, None), &issuer)
                .unwrap();
        }
        let bob = manager.find_by_roll("R2").unwrap().unwrap();

        // Simulates another writer marking Bob while the batch is being inserted.
        diesel::sql_query(format!(
            "CREATE TEMP TRIGGER concurrent_mark AFTER INSERT ON attendance \
             WHEN NEW.student_id = {} BEGIN \
             INSERT INTO attendance (date, student_id, status) \
             VALUES (NEW.date, NEW.student_id, 'present'); END",
            bob.id
        ))
        .execute(&mut manager.db)
        .unwrap();

        let on = date("2024-01-10");
        let marked = manager.mark_attendance(on, &HashMap::new());

        assert!(matches!(marked, Err(AttendanceError::AlreadyMarked(d)) if d == on));
        assert!(manager.records_on(on).unwrap().is_empty());
        assert_eq!(manager.num_records().unwrap(), 0);
    }

    #[test]
    fn search_matches_name_substring() {
        let (mut manager, issuer, _dir) = setup();
        manager
            .register_student(&form("Alice Smith", "R1", None), &issuer)
            .unwrap();
        manager
            .register_student(&form("Bob Jones", "R2", None), &issuer)
            .unwrap();
        manager.check_in("R1").unwrap();
        manager.check_in("R2").unwrap();

        let found = manager.search_students(Some("smith")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Alice Smith");

        assert_eq!(manager.search_students(Some("  ")).unwrap().len(), 2);
        assert!(manager.search_students(Some("%")).unwrap().is_empty());

        let records = manager.get_records(Some("Jones")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student.roll_number, "R2");
    }

    #[test]
    fn student_attendance_is_grouped_by_status() {
        let (mut manager, issuer, _dir) = setup();
        let alice = manager
            .register_student(&form("Alice", "R1", None), &issuer)
            .unwrap();
        manager.check_in_on("R1", date("2024-01-10")).unwrap();
        manager
            .mark_attendance(date("2024-01-11"), &HashMap::new())
            .unwrap();
        manager
            .mark_attendance(
                date("2024-01-12"),
                &HashMap::from([(alice.id, Status::Excused)]),
            )
            .unwrap();

        let summary = manager.get_student_attendance(alice.id).unwrap();

        assert_eq!(summary.present, vec![date("2024-01-10")]);
        assert_eq!(summary.absent, vec![date("2024-01-11")]);
        assert_eq!(summary.excused, vec![date("2024-01-12")]);
    }

    #[test]
    fn missing_student_is_not_found() {
        let (mut manager, _issuer, _dir) = setup();
        assert!(matches!(
            manager.get_student(42),
            Err(AttendanceError::StudentNotFound(_))
        ));
    }
}

//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, warn};
use tutor_api::{
    Assignment, Cohort, Course, NewAssignment, NewCourse, NotificationCategory, Registration,
    RegistrationStatus, StoredNotification, Student, Submission, TimeSlot,
};
use tutor_util::{AssignmentId, CourseId, NotificationId, RegistrationId, StudentId, SubmissionId};

use crate::{AuditEvent, Store, StoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

const COURSE_COLUMNS: &str =
    "id, cohort, time_slot, start_date, end_date, is_active, is_data_exported, created_at";

const REGISTRATION_COLUMNS: &str =
    "id, student_id, course_id, status, rejection_reason, requested_at, processed_at";

const ASSIGNMENT_COLUMNS: &str =
    "id, course_id, title, description, due_at, created_at, is_active";

const SUBMISSION_COLUMNS: &str =
    "id, assignment_id, student_id, answer, submitted_at, grade, feedback, graded_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, category, is_read, created_at";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cohort TEXT NOT NULL,
                time_slot TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_data_exported INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Backstop for the in-process conflict check
            CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_active_slot
                ON courses(cohort, time_slot, start_date) WHERE is_active = 1;

            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                full_name TEXT NOT NULL,
                cohort TEXT
            );

            -- No cascade: a course with registrations cannot be removed
            CREATE TABLE IF NOT EXISTS registrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                course_id INTEGER NOT NULL REFERENCES courses(id),
                status TEXT NOT NULL,
                rejection_reason TEXT,
                requested_at TEXT NOT NULL,
                processed_at TEXT,
                UNIQUE (student_id, course_id)
            );

            -- One approved registration per student
            CREATE UNIQUE INDEX IF NOT EXISTS idx_registrations_one_approved
                ON registrations(student_id) WHERE status = 'approved';

            CREATE TABLE IF NOT EXISTS assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                due_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                assignment_id INTEGER NOT NULL REFERENCES assignments(id) ON DELETE CASCADE,
                student_id INTEGER NOT NULL,
                answer TEXT,
                submitted_at TEXT NOT NULL,
                grade REAL,
                feedback TEXT,
                graded_at TEXT,
                UNIQUE (assignment_id, student_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                category TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_registrations_course ON registrations(course_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_course ON assignments(course_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn query_courses(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<Course>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, course_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_registrations(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Registration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, registration_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_assignments(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Assignment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, assignment_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// Row decoding

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Local>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Local)))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: CourseId::new(row.get(0)?),
        cohort: parsed_at::<Cohort>(row, 1)?,
        time_slot: parsed_at::<TimeSlot>(row, 2)?,
        start_date: date_at(row, 3)?,
        end_date: date_at(row, 4)?,
        is_active: row.get(5)?,
        is_data_exported: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<Registration> {
    Ok(Registration {
        id: RegistrationId::new(row.get(0)?),
        student_id: StudentId::new(row.get(1)?),
        course_id: CourseId::new(row.get(2)?),
        status: parsed_at::<RegistrationStatus>(row, 3)?,
        rejection_reason: row.get(4)?,
        requested_at: timestamp_at(row, 5)?,
        processed_at: optional_timestamp_at(row, 6)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: AssignmentId::new(row.get(0)?),
        course_id: CourseId::new(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        due_at: timestamp_at(row, 4)?,
        created_at: timestamp_at(row, 5)?,
        is_active: row.get(6)?,
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: SubmissionId::new(row.get(0)?),
        assignment_id: AssignmentId::new(row.get(1)?),
        student_id: StudentId::new(row.get(2)?),
        answer: row.get(3)?,
        submitted_at: timestamp_at(row, 4)?,
        grade: row.get(5)?,
        feedback: row.get(6)?,
        graded_at: optional_timestamp_at(row, 7)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<StoredNotification> {
    Ok(StoredNotification {
        id: NotificationId::new(row.get(0)?),
        user_id: StudentId::new(row.get(1)?),
        title: row.get(2)?,
        message: row.get(3)?,
        category: parsed_at::<NotificationCategory>(row, 4)?,
        is_read: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
    })
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    let cohort = match row.get::<_, Option<String>>(3)? {
        Some(s) => Some(s.parse::<Cohort>().map_err(|e| conversion_error(3, e))?),
        None => None,
    };
    Ok(Student {
        id: StudentId::new(row.get(0)?),
        email: row.get(1)?,
        full_name: row.get(2)?,
        cohort,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl Store for SqliteStore {
    fn insert_course(&self, course: &NewCourse) -> StoreResult<Course> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO courses
                (cohort, time_slot, start_date, end_date, is_active, is_data_exported, created_at)
            VALUES (?, ?, ?, ?, 1, 0, ?)
            "#,
            params![
                course.cohort.as_str(),
                course.time_slot.as_str(),
                format_date(course.start_date),
                format_date(course.end_date),
                course.created_at.to_rfc3339(),
            ],
        )?;

        let id = CourseId::new(conn.last_insert_rowid());
        debug!(course_id = %id, cohort = %course.cohort, "Course inserted");

        Ok(Course {
            id,
            cohort: course.cohort,
            time_slot: course.time_slot,
            start_date: course.start_date,
            end_date: course.end_date,
            is_active: true,
            is_data_exported: false,
            created_at: course.created_at,
        })
    }

    fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
        Ok(conn
            .query_row(&sql, [id.get()], course_from_row)
            .optional()?)
    }

    fn list_courses(&self, active: Option<bool>) -> StoreResult<Vec<Course>> {
        match active {
            Some(active) => self.query_courses(
                &format!(
                    "SELECT {} FROM courses WHERE is_active = ? ORDER BY start_date, id",
                    COURSE_COLUMNS
                ),
                [active],
            ),
            None => self.query_courses(
                &format!("SELECT {} FROM courses ORDER BY start_date, id", COURSE_COLUMNS),
                [],
            ),
        }
    }

    fn active_courses_for(&self, cohort: Cohort, time_slot: TimeSlot) -> StoreResult<Vec<Course>> {
        self.query_courses(
            &format!(
                "SELECT {} FROM courses WHERE is_active = 1 AND cohort = ? AND time_slot = ? \
                 ORDER BY start_date, id",
                COURSE_COLUMNS
            ),
            params![cohort.as_str(), time_slot.as_str()],
        )
    }

    fn set_course_active(&self, id: CourseId, active: bool) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE courses SET is_active = ? WHERE id = ?",
            params![active, id.get()],
        )?;
        Ok(changed > 0)
    }

    fn mark_course_exported(&self, id: CourseId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE courses SET is_data_exported = 1 WHERE id = ?",
            [id.get()],
        )?;
        Ok(changed > 0)
    }

    fn delete_course(&self, id: CourseId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM courses WHERE id = ?", [id.get()])?;
        debug!(course_id = %id, removed = changed > 0, "Course delete");
        Ok(changed > 0)
    }

    fn insert_registration(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        requested_at: DateTime<Local>,
    ) -> StoreResult<Registration> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO registrations (student_id, course_id, status, requested_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                student_id.get(),
                course_id.get(),
                RegistrationStatus::Pending.as_str(),
                requested_at.to_rfc3339(),
            ],
        )?;

        let id = RegistrationId::new(conn.last_insert_rowid());
        debug!(
            registration_id = %id,
            student_id = %student_id,
            course_id = %course_id,
            "Registration inserted"
        );

        Ok(Registration {
            id,
            student_id,
            course_id,
            status: RegistrationStatus::Pending,
            rejection_reason: None,
            requested_at,
            processed_at: None,
        })
    }

    fn get_registration(&self, id: RegistrationId) -> StoreResult<Option<Registration>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM registrations WHERE id = ?", REGISTRATION_COLUMNS);
        Ok(conn
            .query_row(&sql, [id.get()], registration_from_row)
            .optional()?)
    }

    fn find_registration(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Registration>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM registrations WHERE student_id = ? AND course_id = ?",
            REGISTRATION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![student_id.get(), course_id.get()], registration_from_row)
            .optional()?)
    }

    fn registrations_for_student(&self, student_id: StudentId) -> StoreResult<Vec<Registration>> {
        self.query_registrations(
            &format!(
                "SELECT {} FROM registrations WHERE student_id = ? ORDER BY id",
                REGISTRATION_COLUMNS
            ),
            [student_id.get()],
        )
    }

    fn registrations_for_course(
        &self,
        course_id: CourseId,
        status: Option<RegistrationStatus>,
    ) -> StoreResult<Vec<Registration>> {
        match status {
            Some(status) => self.query_registrations(
                &format!(
                    "SELECT {} FROM registrations WHERE course_id = ? AND status = ? ORDER BY id",
                    REGISTRATION_COLUMNS
                ),
                params![course_id.get(), status.as_str()],
            ),
            None => self.query_registrations(
                &format!(
                    "SELECT {} FROM registrations WHERE course_id = ? ORDER BY id",
                    REGISTRATION_COLUMNS
                ),
                [course_id.get()],
            ),
        }
    }

    fn pending_registrations(&self) -> StoreResult<Vec<Registration>> {
        self.query_registrations(
            &format!(
                "SELECT {} FROM registrations WHERE status = ? ORDER BY id",
                REGISTRATION_COLUMNS
            ),
            [RegistrationStatus::Pending.as_str()],
        )
    }

    fn record_decision(
        &self,
        id: RegistrationId,
        status: RegistrationStatus,
        rejection_reason: Option<&str>,
        processed_at: DateTime<Local>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE registrations
            SET status = ?, rejection_reason = ?, processed_at = ?
            WHERE id = ? AND status = ?
            "#,
            params![
                status.as_str(),
                rejection_reason,
                processed_at.to_rfc3339(),
                id.get(),
                RegistrationStatus::Pending.as_str()
            ],
        )?;

        if changed > 0 {
            debug!(registration_id = %id, status = status.as_str(), "Decision recorded");
        }
        Ok(changed > 0)
    }

    fn delete_registration(&self, id: RegistrationId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM registrations WHERE id = ?", [id.get()])?;
        Ok(changed > 0)
    }

    fn upsert_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO students (id, email, full_name, cohort)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET
                email = excluded.email,
                full_name = excluded.full_name,
                cohort = excluded.cohort
            "#,
            params![
                student.id.get(),
                student.email,
                student.full_name,
                student.cohort.map(|c| c.as_str()),
            ],
        )?;
        Ok(())
    }

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, email, full_name, cohort FROM students WHERE id = ?",
                [id.get()],
                student_from_row,
            )
            .optional()?)
    }

    fn insert_assignment(&self, assignment: &NewAssignment) -> StoreResult<Assignment> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO assignments (course_id, title, description, due_at, created_at, is_active)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
            params![
                assignment.course_id.get(),
                assignment.title,
                assignment.description,
                assignment.due_at.to_rfc3339(),
                assignment.created_at.to_rfc3339(),
            ],
        )?;

        let id = AssignmentId::new(conn.last_insert_rowid());
        debug!(assignment_id = %id, course_id = %assignment.course_id, "Assignment inserted");

        Ok(Assignment {
            id,
            course_id: assignment.course_id,
            title: assignment.title.clone(),
            description: assignment.description.clone(),
            due_at: assignment.due_at,
            created_at: assignment.created_at,
            is_active: true,
        })
    }

    fn get_assignment(&self, id: AssignmentId) -> StoreResult<Option<Assignment>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM assignments WHERE id = ?", ASSIGNMENT_COLUMNS);
        Ok(conn
            .query_row(&sql, [id.get()], assignment_from_row)
            .optional()?)
    }

    fn assignments_for_course(&self, course_id: CourseId) -> StoreResult<Vec<Assignment>> {
        self.query_assignments(
            &format!(
                "SELECT {} FROM assignments WHERE course_id = ? ORDER BY id DESC",
                ASSIGNMENT_COLUMNS
            ),
            [course_id.get()],
        )
    }

    fn active_assignments(&self) -> StoreResult<Vec<Assignment>> {
        self.query_assignments(
            r#"
            SELECT a.id, a.course_id, a.title, a.description, a.due_at, a.created_at, a.is_active
            FROM assignments a
            JOIN courses c ON c.id = a.course_id
            WHERE a.is_active = 1 AND c.is_active = 1
            ORDER BY a.id
            "#,
            [],
        )
    }

    fn set_assignment_active(&self, id: AssignmentId, active: bool) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE assignments SET is_active = ? WHERE id = ?",
            params![active, id.get()],
        )?;
        Ok(changed > 0)
    }

    fn delete_assignment(&self, id: AssignmentId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM assignments WHERE id = ?", [id.get()])?;
        Ok(changed > 0)
    }

    fn insert_submission(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        answer: Option<&str>,
        submitted_at: DateTime<Local>,
    ) -> StoreResult<Submission> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO submissions (assignment_id, student_id, answer, submitted_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                assignment_id.get(),
                student_id.get(),
                answer,
                submitted_at.to_rfc3339(),
            ],
        )?;

        let id = SubmissionId::new(conn.last_insert_rowid());
        debug!(
            submission_id = %id,
            assignment_id = %assignment_id,
            student_id = %student_id,
            "Submission inserted"
        );

        Ok(Submission {
            id,
            assignment_id,
            student_id,
            answer: answer.map(str::to_string),
            submitted_at,
            grade: None,
            feedback: None,
            graded_at: None,
        })
    }

    fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM submissions WHERE id = ?", SUBMISSION_COLUMNS);
        Ok(conn
            .query_row(&sql, [id.get()], submission_from_row)
            .optional()?)
    }

    fn submissions_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> StoreResult<Vec<Submission>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM submissions WHERE assignment_id = ? ORDER BY id",
            SUBMISSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([assignment_id.get()], submission_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn record_grade(
        &self,
        id: SubmissionId,
        grade: f64,
        feedback: Option<&str>,
        graded_at: DateTime<Local>,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE submissions SET grade = ?, feedback = ?, graded_at = ? WHERE id = ?",
            params![grade, feedback, graded_at.to_rfc3339(), id.get()],
        )?;
        Ok(changed > 0)
    }

    fn insert_notification(
        &self,
        user_id: StudentId,
        title: &str,
        message: &str,
        category: NotificationCategory,
        created_at: DateTime<Local>,
    ) -> StoreResult<StoredNotification> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO notifications (user_id, title, message, category, is_read, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
            params![
                user_id.get(),
                title,
                message,
                category.as_str(),
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(StoredNotification {
            id: NotificationId::new(conn.last_insert_rowid()),
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            category,
            is_read: false,
            created_at,
        })
    }

    fn notifications_for_user(&self, user_id: StudentId) -> StoreResult<Vec<StoredNotification>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM notifications WHERE user_id = ? ORDER BY id DESC",
            NOTIFICATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id.get()], notification_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn mark_notification_read(&self, id: NotificationId) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?",
            [id.get()],
        )?;
        Ok(changed > 0)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| tutor_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

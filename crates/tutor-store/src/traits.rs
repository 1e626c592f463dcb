//! Store trait definitions

use chrono::{DateTime, Local};
use tutor_api::{
    Assignment, Cohort, Course, NewAssignment, NewCourse, NotificationCategory, Registration,
    RegistrationStatus, StoredNotification, Student, Submission, TimeSlot,
};
use tutor_util::{AssignmentId, CourseId, NotificationId, RegistrationId, StudentId, SubmissionId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
///
/// Every method is atomic on its own. Lookups that find nothing return
/// `Ok(None)`/`Ok(false)`; uniqueness violations return
/// [`StoreError::Conflict`](crate::StoreError::Conflict).
pub trait Store: Send + Sync {
    // Courses

    /// Insert a course. Two active courses may not share cohort, slot and start date.
    fn insert_course(&self, course: &NewCourse) -> StoreResult<Course>;

    fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>>;

    /// List courses, optionally filtered by the active flag
    fn list_courses(&self, active: Option<bool>) -> StoreResult<Vec<Course>>;

    /// Active courses sharing a cohort and time slot
    fn active_courses_for(&self, cohort: Cohort, time_slot: TimeSlot) -> StoreResult<Vec<Course>>;

    fn set_course_active(&self, id: CourseId, active: bool) -> StoreResult<bool>;

    fn mark_course_exported(&self, id: CourseId) -> StoreResult<bool>;

    /// Physically remove a course. Fails with a conflict while registrations reference it.
    fn delete_course(&self, id: CourseId) -> StoreResult<bool>;

    // Registrations

    /// Insert a pending registration. At most one row per (student, course).
    fn insert_registration(
        &self,
        student_id: StudentId,
        course_id: CourseId,
        requested_at: DateTime<Local>,
    ) -> StoreResult<Registration>;

    fn get_registration(&self, id: RegistrationId) -> StoreResult<Option<Registration>>;

    fn find_registration(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> StoreResult<Option<Registration>>;

    /// All registrations of a student, oldest request first
    fn registrations_for_student(&self, student_id: StudentId) -> StoreResult<Vec<Registration>>;

    /// Registrations of a course, optionally filtered by status, oldest request first
    fn registrations_for_course(
        &self,
        course_id: CourseId,
        status: Option<RegistrationStatus>,
    ) -> StoreResult<Vec<Registration>>;

    /// Pending registrations across all courses, oldest request first
    fn pending_registrations(&self) -> StoreResult<Vec<Registration>>;

    /// Record a decision on a pending registration. Returns `Ok(false)` when the
    /// row is missing or already decided. A student may hold only one approved
    /// registration.
    fn record_decision(
        &self,
        id: RegistrationId,
        status: RegistrationStatus,
        rejection_reason: Option<&str>,
        processed_at: DateTime<Local>,
    ) -> StoreResult<bool>;

    fn delete_registration(&self, id: RegistrationId) -> StoreResult<bool>;

    // Student directory

    fn upsert_student(&self, student: &Student) -> StoreResult<()>;

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>>;

    // Assignments

    fn insert_assignment(&self, assignment: &NewAssignment) -> StoreResult<Assignment>;

    fn get_assignment(&self, id: AssignmentId) -> StoreResult<Option<Assignment>>;

    /// Assignments of a course, newest first
    fn assignments_for_course(&self, course_id: CourseId) -> StoreResult<Vec<Assignment>>;

    /// Active assignments whose course is also active
    fn active_assignments(&self) -> StoreResult<Vec<Assignment>>;

    fn set_assignment_active(&self, id: AssignmentId, active: bool) -> StoreResult<bool>;

    fn delete_assignment(&self, id: AssignmentId) -> StoreResult<bool>;

    // Submissions

    /// Insert a submission. At most one per (assignment, student).
    fn insert_submission(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        answer: Option<&str>,
        submitted_at: DateTime<Local>,
    ) -> StoreResult<Submission>;

    fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>>;

    fn submissions_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> StoreResult<Vec<Submission>>;

    fn record_grade(
        &self,
        id: SubmissionId,
        grade: f64,
        feedback: Option<&str>,
        graded_at: DateTime<Local>,
    ) -> StoreResult<bool>;

    // Notification inbox

    fn insert_notification(
        &self,
        user_id: StudentId,
        title: &str,
        message: &str,
        category: NotificationCategory,
        created_at: DateTime<Local>,
    ) -> StoreResult<StoredNotification>;

    /// Inbox for a user, newest first
    fn notifications_for_user(&self, user_id: StudentId) -> StoreResult<Vec<StoredNotification>>;

    fn mark_notification_read(&self, id: NotificationId) -> StoreResult<bool>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

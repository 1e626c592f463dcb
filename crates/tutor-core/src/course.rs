//! Course section lifecycle

use chrono::{DateTime, Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info};
use tutor_api::{
    AbsenceReportRow, Cohort, Course, CourseState, CourseView, NewCourse, RegistrationStatus,
    TimeSlot,
};
use tutor_store::{AuditEvent, AuditEventType, Store};
use tutor_util::{Clock, CourseId, StudentId};

use crate::{
    ConflictChecker, ConflictReason, ConflictResult, CourseCandidate, ScheduleRules,
    WorkflowError, WorkflowResult,
};

const EXPORT_HEADER: &str = "Course ID,Cohort,TimeSlot,StartDate,EndDate";

/// Result of a course creation request
#[derive(Debug, Clone)]
pub enum CreateCourseDecision {
    Created(Course),
    Rejected { reason: ConflictReason },
}

/// Derive temporal flags for a course.
///
/// A course is over once `now` passes local midnight at the start of its end
/// date, and ending soon when that instant is at most `ending_soon` away.
pub fn course_state(
    course: &Course,
    now: DateTime<Local>,
    ending_soon: chrono::Duration,
) -> CourseState {
    let ends_at = course.ends_at();
    let is_ended = now > ends_at;
    CourseState {
        is_ended,
        is_ending_soon: !is_ended && ends_at - now <= ending_soon,
    }
}

/// Creates, queries and removes course sections
pub struct CourseLifecycle {
    checker: ConflictChecker,
    ending_soon: chrono::Duration,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl CourseLifecycle {
    pub fn new(
        checker: ConflictChecker,
        ending_soon: chrono::Duration,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            checker,
            ending_soon,
            store,
            clock,
        }
    }

    pub fn rules(&self) -> &ScheduleRules {
        self.checker.rules()
    }

    /// Create a section after the schedule and overlap checks pass.
    ///
    /// A uniqueness violation raised by the store is reported the same way
    /// as a conflict found up front.
    pub fn create(
        &self,
        cohort: Cohort,
        time_slot: TimeSlot,
        start_date: NaiveDate,
    ) -> WorkflowResult<CreateCourseDecision> {
        let candidate = CourseCandidate {
            cohort,
            time_slot,
            start_date,
        };
        let today = self.clock.today();

        let existing = self.store.active_courses_for(cohort, time_slot)?;
        if let ConflictResult::Conflict(reason) = self.checker.check(&candidate, today, &existing) {
            return Ok(self.reject(&candidate, reason));
        }

        let new_course = NewCourse {
            cohort,
            time_slot,
            start_date,
            end_date: self.rules().end_date(start_date),
            created_at: self.clock.now(),
        };

        let course = match self.store.insert_course(&new_course) {
            Ok(course) => course,
            Err(e) if e.is_conflict() => {
                // Lost a race with another writer; explain against the fresh snapshot
                let existing = self.store.active_courses_for(cohort, time_slot)?;
                let reason = match self.checker.check(&candidate, today, &existing) {
                    ConflictResult::Conflict(reason) => reason,
                    ConflictResult::Clear => ConflictReason::AlreadyScheduled {
                        cohort,
                        time_slot,
                        start_date,
                    },
                };
                return Ok(self.reject(&candidate, reason));
            }
            Err(e) => return Err(e.into()),
        };

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::CourseCreated {
            course_id: course.id,
            cohort,
            time_slot,
        }));

        info!(
            course_id = %course.id,
            cohort = %cohort,
            time_slot = time_slot.as_str(),
            start_date = %course.start_date,
            end_date = %course.end_date,
            "Course created"
        );

        Ok(CreateCourseDecision::Created(course))
    }

    fn reject(&self, candidate: &CourseCandidate, reason: ConflictReason) -> CreateCourseDecision {
        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::CourseRejected {
            cohort: candidate.cohort,
            time_slot: candidate.time_slot,
            reason: reason.to_string(),
        }));

        info!(
            cohort = %candidate.cohort,
            time_slot = candidate.time_slot.as_str(),
            start_date = %candidate.start_date,
            reason = %reason,
            "Course rejected"
        );

        CreateCourseDecision::Rejected { reason }
    }

    /// Temporal flags for a course at `now`
    pub fn derive_state(&self, course: &Course, now: DateTime<Local>) -> CourseState {
        course_state(course, now, self.ending_soon)
    }

    /// Physically remove a course with no registrations.
    ///
    /// Returns `Ok(false)` when the course does not exist and
    /// [`WorkflowError::CourseHasRegistrations`] when any registration, in
    /// any status, still references it.
    pub fn delete(&self, course_id: CourseId) -> WorkflowResult<bool> {
        if self.store.get_course(course_id)?.is_none() {
            return Ok(false);
        }

        if !self.store.registrations_for_course(course_id, None)?.is_empty() {
            return Err(WorkflowError::CourseHasRegistrations(course_id));
        }

        let removed = match self.store.delete_course(course_id) {
            Ok(removed) => removed,
            Err(e) if e.is_conflict() => {
                return Err(WorkflowError::CourseHasRegistrations(course_id));
            }
            Err(e) => return Err(e.into()),
        };

        if removed {
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::CourseDeleted { course_id }));
            info!(course_id = %course_id, "Course deleted");
        }

        Ok(removed)
    }

    /// Soft delete: the course stays on record but stops taking part in
    /// conflict checks, listings of available courses and reminders.
    pub fn deactivate(&self, course_id: CourseId) -> WorkflowResult<bool> {
        let changed = self.store.set_course_active(course_id, false)?;
        if changed {
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::CourseDeactivated { course_id }));
            info!(course_id = %course_id, "Course deactivated");
        }
        Ok(changed)
    }

    /// Students holding an approved registration for the course
    pub fn registered_students(&self, course_id: CourseId) -> WorkflowResult<Vec<StudentId>> {
        Ok(self
            .store
            .registrations_for_course(course_id, Some(RegistrationStatus::Approved))?
            .into_iter()
            .map(|r| r.student_id)
            .collect())
    }

    /// Approved registrations only; there is no capacity limit
    pub fn registered_student_count(&self, course_id: CourseId) -> WorkflowResult<usize> {
        Ok(self.registered_students(course_id)?.len())
    }

    fn view(&self, course: Course, now: DateTime<Local>) -> WorkflowResult<CourseView> {
        let student_count = self.registered_student_count(course.id)?;
        let state = self.derive_state(&course, now);
        Ok(CourseView {
            course,
            state,
            student_count,
        })
    }

    /// Courses with their derived flags, optionally filtered by the active flag
    pub fn list_courses(&self, active: Option<bool>) -> WorkflowResult<Vec<CourseView>> {
        let now = self.clock.now();
        self.store
            .list_courses(active)?
            .into_iter()
            .map(|course| self.view(course, now))
            .collect()
    }

    /// Active, not yet ended courses a student of `cohort` may ask to join
    pub fn available_for_cohort(&self, cohort: Cohort) -> WorkflowResult<Vec<CourseView>> {
        let views = self.list_courses(Some(true))?;
        Ok(views
            .into_iter()
            .filter(|v| v.course.cohort == cohort && !v.state.is_ended)
            .collect())
    }

    /// CSV summary of a course; marks it as exported.
    ///
    /// Returns `Ok(None)` for an unknown course.
    pub fn export_summary(&self, course_id: CourseId) -> WorkflowResult<Option<String>> {
        let Some(course) = self.store.get_course(course_id)? else {
            return Ok(None);
        };

        let csv = format!(
            "{}\n{},{},{},{},{}\n",
            EXPORT_HEADER,
            course.id,
            course.cohort.as_str(),
            course.time_slot.as_str(),
            course.start_date.format("%Y-%m-%d"),
            course.end_date.format("%Y-%m-%d"),
        );

        self.store.mark_course_exported(course_id)?;
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::CourseExported { course_id }));
        debug!(course_id = %course_id, "Course summary exported");

        Ok(Some(csv))
    }

    /// Approved students of a course with their absence streaks.
    ///
    /// Streaks are not tracked, so every row reports zero.
    pub fn absence_report(
        &self,
        course_id: CourseId,
    ) -> WorkflowResult<Option<Vec<AbsenceReportRow>>> {
        if self.store.get_course(course_id)?.is_none() {
            return Ok(None);
        }

        let mut rows = Vec::new();
        for student_id in self.registered_students(course_id)? {
            let student = self.store.get_student(student_id)?;
            let (full_name, email) = student
                .map(|s| (s.full_name, s.email))
                .unwrap_or_default();
            rows.push(AbsenceReportRow {
                student_id,
                full_name,
                email,
                consecutive_absent_days: 0,
            });
        }

        Ok(Some(rows))
    }
}

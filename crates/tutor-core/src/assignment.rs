//! Assignments and submissions

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use tutor_api::{
    Assignment, AssignmentState, NewAssignment, NotificationEvent, RegistrationStatus, Submission,
};
use tutor_store::{AuditEvent, AuditEventType, Store};
use tutor_util::{AssignmentId, Clock, CourseId, StudentId, SubmissionId};

use crate::{Dispatcher, NotificationDispatch, WorkflowResult, events_of};

/// Derive temporal flags for an assignment.
pub fn assignment_state(
    assignment: &Assignment,
    now: DateTime<Local>,
    due_soon: chrono::Duration,
) -> AssignmentState {
    let is_overdue = now > assignment.due_at;
    AssignmentState {
        is_overdue,
        is_due_soon: !is_overdue && assignment.due_at - now <= due_soon,
    }
}

/// What `delete` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRemoval {
    /// Submissions existed; the assignment was deactivated and students told
    Cancelled,
    /// No submissions; the row is gone
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDenial {
    AssignmentNotFound,
    AssignmentCancelled,
    NotEnrolled,
    AlreadySubmitted,
}

impl fmt::Display for SubmitDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitDenial::AssignmentNotFound => write!(f, "Assignment not found"),
            SubmitDenial::AssignmentCancelled => write!(f, "Assignment was cancelled"),
            SubmitDenial::NotEnrolled => write!(f, "Not enrolled in this course"),
            SubmitDenial::AlreadySubmitted => write!(f, "Already submitted"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubmitDecision {
    Submitted { submission: Submission, is_late: bool },
    Denied { reason: SubmitDenial },
}

pub struct AssignmentLifecycle {
    due_soon: chrono::Duration,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<Dispatcher>,
}

impl AssignmentLifecycle {
    pub fn new(
        due_soon: chrono::Duration,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            due_soon,
            store,
            clock,
            dispatcher,
        }
    }

    fn enrolled_students(&self, course_id: CourseId) -> WorkflowResult<Vec<StudentId>> {
        Ok(self
            .store
            .registrations_for_course(course_id, Some(RegistrationStatus::Approved))?
            .into_iter()
            .map(|r| r.student_id)
            .collect())
    }

    /// Post an assignment and tell every enrolled student.
    ///
    /// Returns `Ok(None)` for an unknown course.
    pub fn create(
        &self,
        course_id: CourseId,
        title: &str,
        description: Option<&str>,
        due_at: DateTime<Local>,
    ) -> WorkflowResult<Option<(Assignment, Vec<NotificationEvent>)>> {
        let Some(course) = self.store.get_course(course_id)? else {
            return Ok(None);
        };

        let assignment = self.store.insert_assignment(&NewAssignment {
            course_id,
            title: title.to_string(),
            description: description.map(str::to_string),
            due_at,
            created_at: self.clock.now(),
        })?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AssignmentCreated {
                assignment_id: assignment.id,
                course_id,
            }));

        let recipients = self.enrolled_students(course_id)?;
        info!(
            assignment_id = %assignment.id,
            course_id = %course_id,
            recipients = recipients.len(),
            "Assignment created"
        );

        let deliveries = NotificationDispatch::assignment_new(&assignment, &course, &recipients);
        self.dispatcher.deliver(&deliveries);

        Ok(Some((assignment, events_of(&deliveries))))
    }

    pub fn derive_state(&self, assignment: &Assignment, now: DateTime<Local>) -> AssignmentState {
        assignment_state(assignment, now, self.due_soon)
    }

    /// Assignments of a course with their flags at the current time, newest first
    pub fn list_for_course(
        &self,
        course_id: CourseId,
    ) -> WorkflowResult<Vec<(Assignment, AssignmentState)>> {
        let now = self.clock.now();
        Ok(self
            .store
            .assignments_for_course(course_id)?
            .into_iter()
            .map(|a| {
                let state = self.derive_state(&a, now);
                (a, state)
            })
            .collect())
    }

    /// Remove an assignment, or cancel it when work was already handed in.
    ///
    /// Returns `Ok(None)` for an unknown assignment.
    pub fn delete(&self, assignment_id: AssignmentId) -> WorkflowResult<Option<AssignmentRemoval>> {
        let Some(assignment) = self.store.get_assignment(assignment_id)? else {
            return Ok(None);
        };

        if self.store.submissions_for_assignment(assignment_id)?.is_empty() {
            self.store.delete_assignment(assignment_id)?;
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::AssignmentRemoved { assignment_id }));
            info!(assignment_id = %assignment_id, "Assignment removed");
            return Ok(Some(AssignmentRemoval::Removed));
        }

        self.store.set_assignment_active(assignment_id, false)?;
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AssignmentCancelled { assignment_id }));

        let recipients = self.enrolled_students(assignment.course_id)?;
        info!(
            assignment_id = %assignment_id,
            recipients = recipients.len(),
            "Assignment cancelled"
        );

        self.dispatcher
            .deliver(&NotificationDispatch::assignment_cancelled(&assignment, &recipients));

        Ok(Some(AssignmentRemoval::Cancelled))
    }

    /// Hand in work for an assignment; one submission per student
    pub fn submit(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        answer: Option<&str>,
    ) -> WorkflowResult<SubmitDecision> {
        let denied = |reason: SubmitDenial| -> WorkflowResult<SubmitDecision> {
            debug!(
                assignment_id = %assignment_id,
                student_id = %student_id,
                reason = %reason,
                "Submission denied"
            );
            Ok(SubmitDecision::Denied { reason })
        };

        let Some(assignment) = self.store.get_assignment(assignment_id)? else {
            return denied(SubmitDenial::AssignmentNotFound);
        };
        if !assignment.is_active {
            return denied(SubmitDenial::AssignmentCancelled);
        }

        let enrolled = self
            .store
            .find_registration(student_id, assignment.course_id)?
            .is_some_and(|r| r.is_approved());
        if !enrolled {
            return denied(SubmitDenial::NotEnrolled);
        }

        let submission = match self.store.insert_submission(
            assignment_id,
            student_id,
            answer,
            self.clock.now(),
        ) {
            Ok(submission) => submission,
            Err(e) if e.is_conflict() => return denied(SubmitDenial::AlreadySubmitted),
            Err(e) => return Err(e.into()),
        };

        let is_late = submission.is_late(assignment.due_at);
        info!(
            submission_id = %submission.id,
            assignment_id = %assignment_id,
            student_id = %student_id,
            is_late,
            "Submission received"
        );

        self.dispatcher.deliver(&[NotificationDispatch::submission_received(
            &submission,
            &assignment,
            is_late,
        )]);

        Ok(SubmitDecision::Submitted {
            submission,
            is_late,
        })
    }

    /// Record a grade and tell the student.
    ///
    /// Returns `Ok(false)` for an unknown submission.
    pub fn grade(
        &self,
        submission_id: SubmissionId,
        grade: f64,
        feedback: Option<&str>,
    ) -> WorkflowResult<bool> {
        let Some(submission) = self.store.get_submission(submission_id)? else {
            return Ok(false);
        };
        let Some(assignment) = self.store.get_assignment(submission.assignment_id)? else {
            return Ok(false);
        };

        let graded_at = self.clock.now();
        if !self
            .store
            .record_grade(submission_id, grade, feedback, graded_at)?
        {
            return Ok(false);
        }

        let submission = Submission {
            grade: Some(grade),
            feedback: feedback.map(str::to_string),
            graded_at: Some(graded_at),
            ..submission
        };

        info!(
            submission_id = %submission_id,
            student_id = %submission.student_id,
            grade,
            "Submission graded"
        );

        self.dispatcher
            .deliver(&[NotificationDispatch::grade_received(&submission, &assignment)]);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmailTemplate;
    use crate::dispatch::testing::{RecordingEmail, RecordingSink};
    use chrono::{NaiveDate, TimeZone};
    use tutor_api::{Cohort, NewCourse, NotificationCategory, Student, TimeSlot};
    use tutor_store::SqliteStore;
    use tutor_util::FixedClock;

    struct Fixture {
        store: Arc<dyn Store>,
        clock: Arc<FixedClock>,
        sink: Arc<RecordingSink>,
        email: Arc<RecordingEmail>,
        assignments: AssignmentLifecycle,
        course_id: CourseId,
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        fixture_with_email(RecordingEmail::default())
    }

    /// One course with student 1 approved and student 2 pending
    fn fixture_with_email(email: RecordingEmail) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(at(2025, 3, 10, 9)));
        let sink = Arc::new(RecordingSink::default());
        let email = Arc::new(email);
        let dispatcher =
            Arc::new(Dispatcher::new(sink.clone(), store.clone()).with_email(email.clone()));

        store
            .upsert_student(&Student {
                id: StudentId::new(1),
                email: "one@example.com".into(),
                full_name: "One".into(),
                cohort: Some(Cohort::Grade10),
            })
            .unwrap();

        let course = store
            .insert_course(&NewCourse {
                cohort: Cohort::Grade10,
                time_slot: TimeSlot::Slot1,
                start_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2025, 8, 3).unwrap(),
                created_at: at(2025, 2, 1, 9),
            })
            .unwrap();
        let approved = store
            .insert_registration(StudentId::new(1), course.id, at(2025, 2, 2, 9))
            .unwrap();
        store
            .record_decision(approved.id, RegistrationStatus::Approved, None, at(2025, 2, 2, 10))
            .unwrap();
        store
            .insert_registration(StudentId::new(2), course.id, at(2025, 2, 2, 9))
            .unwrap();

        Fixture {
            assignments: AssignmentLifecycle::new(
                chrono::Duration::days(3),
                store.clone(),
                clock.clone(),
                dispatcher,
            ),
            store,
            clock,
            sink,
            email,
            course_id: course.id,
        }
    }

    fn create(f: &Fixture, due_at: DateTime<Local>) -> Assignment {
        f.assignments
            .create(f.course_id, "Essay", Some("500 words"), due_at)
            .unwrap()
            .unwrap()
            .0
    }

    #[test]
    fn test_create_notifies_enrolled_students_only() {
        let f = fixture();
        let (assignment, events) = f
            .assignments
            .create(f.course_id, "Essay", None, at(2025, 3, 20, 23))
            .unwrap()
            .unwrap();

        assert!(assignment.is_active);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].recipient, StudentId::new(1));
        assert_eq!(events[0].category, NotificationCategory::AssignmentNew);
        assert_eq!(f.sink.events(), events);

        assert!(
            f.assignments
                .create(CourseId::new(99), "x", None, at(2025, 3, 20, 23))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_derive_state() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 20, 12));

        assert_eq!(f.assignments.derive_state(&a, at(2025, 3, 10, 12)), AssignmentState::default());

        let soon = f.assignments.derive_state(&a, at(2025, 3, 17, 12));
        assert!(soon.is_due_soon && !soon.is_overdue);

        let late = f.assignments.derive_state(&a, at(2025, 3, 20, 13));
        assert!(late.is_overdue && !late.is_due_soon);

        f.clock.set(at(2025, 3, 19, 12));
        let listed = f.assignments.list_for_course(f.course_id).unwrap();
        assert!(listed[0].1.is_due_soon);
    }

    #[test]
    fn test_delete_without_submissions_removes() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 20, 23));

        assert_eq!(f.assignments.delete(a.id).unwrap(), Some(AssignmentRemoval::Removed));
        assert!(f.store.get_assignment(a.id).unwrap().is_none());
        assert_eq!(f.assignments.delete(a.id).unwrap(), None);
    }

    #[test]
    fn test_delete_with_submissions_cancels() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 20, 23));
        f.assignments
            .submit(a.id, StudentId::new(1), Some("done"))
            .unwrap();

        assert_eq!(f.assignments.delete(a.id).unwrap(), Some(AssignmentRemoval::Cancelled));
        assert!(!f.store.get_assignment(a.id).unwrap().unwrap().is_active);

        let last = f.sink.events().pop().unwrap();
        assert_eq!(last.category, NotificationCategory::AssignmentCancelled);
        assert_eq!(last.recipient, StudentId::new(1));
    }

    #[test]
    fn test_submit_rules() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 20, 23));

        let SubmitDecision::Submitted { is_late, .. } =
            f.assignments.submit(a.id, StudentId::new(1), Some("answer")).unwrap()
        else {
            panic!("expected submission");
        };
        assert!(!is_late);

        assert!(matches!(
            f.assignments.submit(a.id, StudentId::new(1), None).unwrap(),
            SubmitDecision::Denied {
                reason: SubmitDenial::AlreadySubmitted
            }
        ));
        // Pending students have no access yet
        assert!(matches!(
            f.assignments.submit(a.id, StudentId::new(2), None).unwrap(),
            SubmitDecision::Denied {
                reason: SubmitDenial::NotEnrolled
            }
        ));
        assert!(matches!(
            f.assignments
                .submit(AssignmentId::new(99), StudentId::new(1), None)
                .unwrap(),
            SubmitDecision::Denied {
                reason: SubmitDenial::AssignmentNotFound
            }
        ));
    }

    #[test]
    fn test_late_submission_is_flagged() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 11, 9));
        f.clock.set(at(2025, 3, 12, 9));

        let SubmitDecision::Submitted { is_late, submission } =
            f.assignments.submit(a.id, StudentId::new(1), None).unwrap()
        else {
            panic!("expected submission");
        };
        assert!(is_late);
        assert!(submission.is_late(a.due_at));
    }

    #[test]
    fn test_submission_receipt_carries_late_flag() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 11, 9));
        f.clock.set(at(2025, 3, 12, 9));
        let inbox_before = f.sink.events().len();

        assert!(matches!(
            f.assignments.submit(a.id, StudentId::new(1), Some("late")).unwrap(),
            SubmitDecision::Submitted { is_late: true, .. }
        ));

        // The assignment announcement went out first
        let sent = f.email.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let (address, template, params) = &sent[1];
        assert_eq!(address, "one@example.com");
        assert_eq!(*template, EmailTemplate::SubmissionReceived);
        assert_eq!(params["title"], "Essay");
        assert_eq!(params["is_late"], "true");
        assert_eq!(params["status"], "late");
        assert!(params.contains_key("submitted_at"));
        assert!(params.contains_key("due_at"));

        // The receipt is email only
        assert_eq!(f.sink.events().len(), inbox_before);
    }

    #[test]
    fn test_submission_survives_email_failure() {
        let f = fixture_with_email(RecordingEmail {
            fail: true,
            ..Default::default()
        });
        let a = create(&f, at(2025, 3, 20, 23));

        let SubmitDecision::Submitted { submission, is_late } =
            f.assignments.submit(a.id, StudentId::new(1), None).unwrap()
        else {
            panic!("expected submission");
        };
        assert!(!is_late);
        assert!(f.store.get_submission(submission.id).unwrap().is_some());
        assert!(f.email.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_grade_notifies_student() {
        let f = fixture();
        let a = create(&f, at(2025, 3, 20, 23));
        let SubmitDecision::Submitted { submission, .. } =
            f.assignments.submit(a.id, StudentId::new(1), Some("x")).unwrap()
        else {
            panic!("expected submission");
        };

        assert!(f.assignments.grade(submission.id, 9.0, Some("well done")).unwrap());
        let stored = f.store.get_submission(submission.id).unwrap().unwrap();
        assert!(stored.is_graded());
        assert_eq!(stored.feedback.as_deref(), Some("well done"));

        let last = f.sink.events().pop().unwrap();
        assert_eq!(last.category, NotificationCategory::GradeReceived);
        assert!(last.body.contains("Essay"));

        assert!(!f.assignments.grade(SubmissionId::new(99), 1.0, None).unwrap());
    }
}

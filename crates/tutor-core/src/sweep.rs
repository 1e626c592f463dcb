//! Periodic reminder sweep

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use tutor_api::RegistrationStatus;
use tutor_store::{AuditEvent, AuditEventType, Store};
use tutor_util::{CourseId, StudentId, SweepId};

use crate::{Dispatcher, NotificationDispatch, WorkflowResult, assignment_state, course_state};

/// Summary of one sweep pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub sweep_id: SweepId,
    pub ran_at: DateTime<Local>,
    pub courses_ending_soon: usize,
    pub assignments_due_soon: usize,
    pub notifications: usize,
}

/// Scans active courses and assignments and sends reminders.
///
/// The sweep keeps no memory of earlier passes: a course that is still
/// ending soon on the next run is announced again.
pub struct Sweep {
    ending_soon: chrono::Duration,
    due_soon: chrono::Duration,
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
}

impl Sweep {
    pub fn new(
        ending_soon: chrono::Duration,
        due_soon: chrono::Duration,
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            ending_soon,
            due_soon,
            store,
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

    /// Run one pass evaluated at `now`
    pub fn run(&self, now: DateTime<Local>) -> WorkflowResult<SweepReport> {
        let sweep_id = SweepId::new();
        let mut deliveries = Vec::new();
        let mut courses_ending_soon = 0;
        let mut assignments_due_soon = 0;

        for course in self.store.list_courses(Some(true))? {
            if !course_state(&course, now, self.ending_soon).is_ending_soon {
                continue;
            }
            courses_ending_soon += 1;
            let recipients = self.enrolled_students(course.id)?;
            debug!(course_id = %course.id, recipients = recipients.len(), "Course ending soon");
            deliveries.extend(NotificationDispatch::course_ending_soon(&course, &recipients));
        }

        for assignment in self.store.active_assignments()? {
            if !assignment_state(&assignment, now, self.due_soon).is_due_soon {
                continue;
            }
            assignments_due_soon += 1;
            let recipients = self.enrolled_students(assignment.course_id)?;
            debug!(
                assignment_id = %assignment.id,
                recipients = recipients.len(),
                "Assignment due soon"
            );
            deliveries.extend(NotificationDispatch::assignment_due_soon(&assignment, &recipients));
        }

        let delivered = self.dispatcher.deliver(&deliveries);

        let report = SweepReport {
            sweep_id: sweep_id.clone(),
            ran_at: now,
            courses_ending_soon,
            assignments_due_soon,
            notifications: deliveries.len(),
        };

        let _ = self.store.append_audit(AuditEvent::at(
            now,
            AuditEventType::SweepCompleted {
                sweep_id,
                courses_ending_soon,
                assignments_due_soon,
                notifications: report.notifications,
            },
        ));

        info!(
            sweep_id = %report.sweep_id,
            courses_ending_soon,
            assignments_due_soon,
            notifications = report.notifications,
            failed = delivered.failed,
            "Sweep completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingSink;
    use chrono::{NaiveDate, TimeZone};
    use tutor_api::{Cohort, NewAssignment, NewCourse, NotificationCategory, TimeSlot};
    use tutor_store::SqliteStore;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Sweep, Arc<dyn Store>, Arc<RecordingSink>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(Dispatcher::new(sink.clone(), store.clone()));
        let sweep = Sweep::new(
            chrono::Duration::days(3),
            chrono::Duration::days(3),
            store.clone(),
            dispatcher,
        );
        (sweep, store, sink)
    }

    /// Course ending on `end_date` with student `first` approved and `first + 1` pending
    fn course_with_students(
        store: &Arc<dyn Store>,
        slot: TimeSlot,
        end_date: NaiveDate,
        first: i64,
    ) -> CourseId {
        let course = store
            .insert_course(&NewCourse {
                cohort: Cohort::Grade11,
                time_slot: slot,
                start_date: date(2025, 1, 6),
                end_date,
                created_at: at(2025, 1, 1, 9),
            })
            .unwrap();
        let approved = store
            .insert_registration(StudentId::new(first), course.id, at(2025, 1, 2, 9))
            .unwrap();
        store
            .record_decision(approved.id, RegistrationStatus::Approved, None, at(2025, 1, 2, 10))
            .unwrap();
        store
            .insert_registration(StudentId::new(first + 1), course.id, at(2025, 1, 2, 9))
            .unwrap();
        course.id
    }

    #[test]
    fn test_empty_sweep() {
        let (sweep, store, sink) = setup();
        let report = sweep.run(at(2025, 6, 1, 9)).unwrap();

        assert_eq!(report.notifications, 0);
        assert!(sink.events().is_empty());

        let audits = store.get_recent_audits(1).unwrap();
        assert!(matches!(
            audits[0].event,
            AuditEventType::SweepCompleted { notifications: 0, .. }
        ));
    }

    #[test]
    fn test_course_ending_soon_notifies_approved_students() {
        let (sweep, store, sink) = setup();
        course_with_students(&store, TimeSlot::Slot1, date(2025, 6, 6), 1);
        // Far from its end
        course_with_students(&store, TimeSlot::Slot2, date(2025, 7, 6), 11);

        let report = sweep.run(at(2025, 6, 4, 9)).unwrap();
        assert_eq!(report.courses_ending_soon, 1);
        assert_eq!(report.notifications, 1);

        let events = sink.events();
        assert_eq!(events[0].recipient, StudentId::new(1));
        assert_eq!(events[0].category, NotificationCategory::CourseEndingSoon);
    }

    #[test]
    fn test_ended_and_inactive_courses_are_skipped() {
        let (sweep, store, sink) = setup();
        course_with_students(&store, TimeSlot::Slot1, date(2025, 6, 1), 1);
        let inactive = course_with_students(&store, TimeSlot::Slot2, date(2025, 6, 3), 11);
        store.set_course_active(inactive, false).unwrap();

        let report = sweep.run(at(2025, 6, 2, 9)).unwrap();
        assert_eq!(report.courses_ending_soon, 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_assignment_due_soon() {
        let (sweep, store, sink) = setup();
        let course_id = course_with_students(&store, TimeSlot::Slot1, date(2025, 12, 6), 1);
        for (title, due_at) in [("soon", at(2025, 6, 3, 23)), ("later", at(2025, 6, 20, 23))] {
            store
                .insert_assignment(&NewAssignment {
                    course_id,
                    title: title.into(),
                    description: None,
                    due_at,
                    created_at: at(2025, 6, 1, 9),
                })
                .unwrap();
        }

        let report = sweep.run(at(2025, 6, 2, 9)).unwrap();
        assert_eq!(report.assignments_due_soon, 1);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, NotificationCategory::AssignmentDueSoon);
        assert!(events[0].body.contains("soon"));
    }

    #[test]
    fn test_repeated_sweep_notifies_again() {
        let (sweep, store, sink) = setup();
        course_with_students(&store, TimeSlot::Slot1, date(2025, 6, 6), 1);

        let first = sweep.run(at(2025, 6, 4, 9)).unwrap();
        let second = sweep.run(at(2025, 6, 4, 10)).unwrap();

        assert_ne!(first.sweep_id, second.sweep_id);
        assert_eq!(sink.events().len(), 2);
    }
}

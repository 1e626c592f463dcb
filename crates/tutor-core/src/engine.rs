//! Workflow engine wiring

use std::sync::Arc;
use tracing::info;
use tutor_api::StoredNotification;
use tutor_config::Policy;
use tutor_store::Store;
use tutor_util::{Clock, NotificationId, StudentId};

use crate::{
    AssignmentLifecycle, ConflictChecker, CourseLifecycle, Dispatcher, EmailSink, LogEmailSink,
    NotificationSink, RegistrationWorkflow, ScheduleRules, StoreNotificationSink, Sweep,
    WorkflowResult,
};

/// The tutoring-center workflow engine.
///
/// Owns one instance of each lifecycle, all sharing the same store, clock
/// and dispatcher.
pub struct TutorEngine {
    policy: Policy,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pub courses: CourseLifecycle,
    pub registrations: RegistrationWorkflow,
    pub assignments: AssignmentLifecycle,
    pub sweep: Sweep,
}

impl TutorEngine {
    /// Build an engine that writes notifications to the store inbox and,
    /// when email is enabled, logs outgoing mail.
    pub fn new(policy: Policy, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let notifications = Arc::new(StoreNotificationSink::new(store.clone(), clock.clone()));
        let email: Option<Arc<dyn EmailSink>> = policy.email.enabled.then(|| {
            Arc::new(LogEmailSink::new(policy.email.from_address.clone())) as Arc<dyn EmailSink>
        });
        Self::with_sinks(policy, store, clock, notifications, email)
    }

    /// Build an engine with explicit delivery collaborators
    pub fn with_sinks(
        policy: Policy,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifications: Arc<dyn NotificationSink>,
        email: Option<Arc<dyn EmailSink>>,
    ) -> Self {
        let mut dispatcher = Dispatcher::new(notifications, store.clone());
        if let Some(email) = email {
            dispatcher = dispatcher.with_email(email);
        }
        let dispatcher = Arc::new(dispatcher);

        let thresholds = &policy.thresholds;
        let checker = ConflictChecker::new(ScheduleRules::from_policy(&policy));

        let courses =
            CourseLifecycle::new(checker, thresholds.ending_soon, store.clone(), clock.clone());
        let registrations =
            RegistrationWorkflow::new(store.clone(), clock.clone(), dispatcher.clone());
        let assignments = AssignmentLifecycle::new(
            thresholds.due_soon,
            store.clone(),
            clock.clone(),
            dispatcher.clone(),
        );
        let sweep = Sweep::new(
            thresholds.ending_soon,
            thresholds.due_soon,
            store.clone(),
            dispatcher,
        );

        info!(
            course_length_months = thresholds.course_length_months,
            ending_soon_hours = thresholds.ending_soon.num_hours(),
            due_soon_hours = thresholds.due_soon.num_hours(),
            email = policy.email.enabled,
            "Core engine initialized"
        );

        Self {
            policy,
            store,
            clock,
            courses,
            registrations,
            assignments,
            sweep,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run the reminder sweep at the current time
    pub fn run_sweep(&self) -> WorkflowResult<crate::SweepReport> {
        self.sweep.run(self.clock.now())
    }

    /// Inbox for a user, newest first
    pub fn list_notifications(
        &self,
        user_id: StudentId,
    ) -> WorkflowResult<Vec<StoredNotification>> {
        Ok(self.store.notifications_for_user(user_id)?)
    }

    pub fn mark_read(&self, id: NotificationId) -> WorkflowResult<bool> {
        Ok(self.store.mark_notification_read(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingEmail;
    use crate::{CreateCourseDecision, DecideOutcome, RequestDecision};
    use chrono::{DateTime, Local, NaiveDate, TimeZone};
    use tutor_api::{Cohort, NotificationCategory, Student, TimeSlot};
    use tutor_store::SqliteStore;
    use tutor_util::FixedClock;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn engine(clock: Arc<FixedClock>) -> TutorEngine {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        TutorEngine::new(Policy::default(), store, clock)
    }

    #[test]
    fn test_approval_lands_in_inbox() {
        let clock = Arc::new(FixedClock::new(at(2025, 2, 1, 9)));
        let engine = engine(clock.clone());

        // 2025-02-03 is a Monday; grade 10 meets Monday and Wednesday
        let CreateCourseDecision::Created(course) = engine
            .courses
            .create(Cohort::Grade10, TimeSlot::Slot1, NaiveDate::from_ymd_opt(2025, 2, 3).unwrap())
            .unwrap()
        else {
            panic!("expected course");
        };

        let student = StudentId::new(7);
        let RequestDecision::Created(registration) =
            engine.registrations.request(student, course.id).unwrap()
        else {
            panic!("expected registration");
        };
        assert!(matches!(
            engine.registrations.decide(registration.id, true, None).unwrap(),
            DecideOutcome::Decided { .. }
        ));

        let inbox = engine.list_notifications(student).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].category, NotificationCategory::RegistrationApproved);
        assert!(!inbox[0].is_read);

        assert!(engine.mark_read(inbox[0].id).unwrap());
        assert!(engine.list_notifications(student).unwrap()[0].is_read);
    }

    #[test]
    fn test_email_goes_to_address_on_file() {
        let clock = Arc::new(FixedClock::new(at(2025, 2, 1, 9)));
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let email = Arc::new(RecordingEmail::default());
        let engine = TutorEngine::with_sinks(
            Policy::default(),
            store.clone(),
            clock.clone(),
            Arc::new(StoreNotificationSink::new(store.clone(), clock.clone())),
            Some(email.clone()),
        );

        store
            .upsert_student(&Student {
                id: StudentId::new(3),
                email: "ana@example.com".into(),
                full_name: "Ana".into(),
                cohort: Some(Cohort::Grade12),
            })
            .unwrap();

        let CreateCourseDecision::Created(course) = engine
            .courses
            .create(Cohort::Grade12, TimeSlot::Slot2, NaiveDate::from_ymd_opt(2025, 2, 7).unwrap())
            .unwrap()
        else {
            panic!("expected course");
        };
        let RequestDecision::Created(registration) =
            engine.registrations.request(StudentId::new(3), course.id).unwrap()
        else {
            panic!("expected registration");
        };
        engine.registrations.decide(registration.id, true, None).unwrap();

        let sent = email.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ana@example.com");
    }

    #[test]
    fn test_run_sweep_uses_clock() {
        let clock = Arc::new(FixedClock::new(at(2025, 2, 1, 9)));
        let engine = engine(clock.clone());
        let report = engine.run_sweep().unwrap();
        assert_eq!(report.ran_at, at(2025, 2, 1, 9));
    }
}

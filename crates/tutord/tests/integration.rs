//! Integration tests for tutord
//!
//! These tests drive the engine end to end against a real SQLite store.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use std::sync::Arc;
use tutor_api::{Cohort, NotificationCategory, RegistrationStatus, TimeSlot};
use tutor_config::{Policy, parse_config};
use tutor_core::{
    AssignmentRemoval, CreateCourseDecision, DecideOutcome, RequestDecision, RequestDenial,
    SubmitDecision, TutorEngine,
};
use tutor_store::{AuditEventType, SqliteStore, Store};
use tutor_util::{CourseId, FixedClock, StudentId};

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn make_engine(policy: Policy, clock: Arc<FixedClock>) -> (TutorEngine, Arc<dyn Store>) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    (TutorEngine::new(policy, store.clone(), clock), store)
}

fn create_course(
    engine: &TutorEngine,
    cohort: Cohort,
    slot: TimeSlot,
    start: NaiveDate,
) -> CourseId {
    match engine.courses.create(cohort, slot, start).unwrap() {
        CreateCourseDecision::Created(course) => course.id,
        CreateCourseDecision::Rejected { reason } => panic!("course rejected: {reason}"),
    }
}

fn enroll(engine: &TutorEngine, student: StudentId, course_id: CourseId) {
    let RequestDecision::Created(registration) =
        engine.registrations.request(student, course_id).unwrap()
    else {
        panic!("request denied");
    };
    assert!(matches!(
        engine.registrations.decide(registration.id, true, None).unwrap(),
        DecideOutcome::Decided { .. }
    ));
}

#[test]
fn test_full_enrollment_flow() {
    let clock = Arc::new(FixedClock::new(at(2025, 1, 10, 9)));
    let (engine, store) = make_engine(Policy::default(), clock.clone());

    // 2025-01-14 is a Tuesday; grade 11 meets Tuesday and Thursday
    let course_id = create_course(&engine, Cohort::Grade11, TimeSlot::Slot2, date(2025, 1, 14));
    let course = store.get_course(course_id).unwrap().unwrap();
    assert_eq!(course.end_date, date(2025, 6, 14));

    let student = StudentId::new(42);
    enroll(&engine, student, course_id);
    assert_eq!(engine.courses.registered_student_count(course_id).unwrap(), 1);

    // Three days before the course ends
    clock.set(at(2025, 6, 11, 9));
    let report = engine.run_sweep().unwrap();
    assert_eq!(report.courses_ending_soon, 1);
    assert_eq!(report.notifications, 1);

    let inbox = engine.list_notifications(student).unwrap();
    let categories: Vec<_> = inbox.iter().map(|n| n.category).collect();
    assert_eq!(
        categories,
        vec![
            NotificationCategory::CourseEndingSoon,
            NotificationCategory::RegistrationApproved,
        ]
    );

    let audits = store.get_recent_audits(1).unwrap();
    assert!(matches!(audits[0].event, AuditEventType::SweepCompleted { .. }));
}

#[test]
fn test_second_enrollment_is_denied() {
    let clock = Arc::new(FixedClock::new(at(2025, 1, 10, 9)));
    let (engine, _store) = make_engine(Policy::default(), clock);

    let first = create_course(&engine, Cohort::Grade10, TimeSlot::Slot1, date(2025, 1, 13));
    let second = create_course(&engine, Cohort::Grade10, TimeSlot::Slot2, date(2025, 1, 13));

    let student = StudentId::new(1);
    enroll(&engine, student, first);

    assert!(matches!(
        engine.registrations.request(student, second).unwrap(),
        RequestDecision::Denied {
            reason: RequestDenial::AlreadyEnrolled { course_id }
        } if course_id == first
    ));

    // Withdrawing frees the student for the other section
    assert!(engine.registrations.withdraw(student, first).unwrap());
    enroll(&engine, student, second);

    let registrations = engine.registrations.list_for_student(student).unwrap();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].status, RegistrationStatus::Approved);
}

#[test]
fn test_assignment_flow() {
    let clock = Arc::new(FixedClock::new(at(2025, 1, 10, 9)));
    let (engine, _store) = make_engine(Policy::default(), clock.clone());

    let course_id = create_course(&engine, Cohort::Grade12, TimeSlot::Slot1, date(2025, 1, 17));
    let student = StudentId::new(5);
    enroll(&engine, student, course_id);

    let (assignment, _) = engine
        .assignments
        .create(course_id, "Derivatives", None, at(2025, 1, 24, 23))
        .unwrap()
        .unwrap();

    clock.set(at(2025, 1, 22, 9));
    assert_eq!(engine.run_sweep().unwrap().assignments_due_soon, 1);

    let SubmitDecision::Submitted { submission, is_late } = engine
        .assignments
        .submit(assignment.id, student, Some("dy/dx = 2x"))
        .unwrap()
    else {
        panic!("submission denied");
    };
    assert!(!is_late);
    assert!(engine.assignments.grade(submission.id, 8.5, None).unwrap());

    assert_eq!(
        engine.assignments.delete(assignment.id).unwrap(),
        Some(AssignmentRemoval::Cancelled)
    );

    let categories: Vec<_> = engine
        .list_notifications(student)
        .unwrap()
        .into_iter()
        .map(|n| n.category)
        .collect();
    assert_eq!(
        categories,
        vec![
            NotificationCategory::AssignmentCancelled,
            NotificationCategory::GradeReceived,
            NotificationCategory::AssignmentDueSoon,
            NotificationCategory::AssignmentNew,
            NotificationCategory::RegistrationApproved,
        ]
    );
}

#[test]
fn test_config_schedule_override() {
    let policy = parse_config(
        r#"
        config_version = 1

        [thresholds]
        course_length_months = 3

        [[schedule]]
        cohort = "grade10"
        days = ["sat"]
        "#,
    )
    .unwrap();

    let clock = Arc::new(FixedClock::new(at(2025, 1, 10, 9)));
    let (engine, _store) = make_engine(policy, clock);

    // Monday is no longer a grade 10 class day
    assert!(matches!(
        engine.courses.create(Cohort::Grade10, TimeSlot::Slot1, date(2025, 1, 13)).unwrap(),
        CreateCourseDecision::Rejected { .. }
    ));

    let course_id = create_course(&engine, Cohort::Grade10, TimeSlot::Slot1, date(2025, 1, 11));
    let views = engine.courses.list_courses(Some(true)).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].course.id, course_id);
    assert_eq!(views[0].course.end_date, date(2025, 4, 11));
}

#[test]
fn test_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tutord.db");
    let clock = Arc::new(FixedClock::new(at(2025, 1, 10, 9)));

    let course_id = {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).unwrap());
        let engine = TutorEngine::new(Policy::default(), store, clock.clone());
        create_course(&engine, Cohort::Grade11, TimeSlot::Slot1, date(2025, 1, 14))
    };

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).unwrap());
    let engine = TutorEngine::new(Policy::default(), store, clock);

    // The same section cannot be created twice
    assert!(matches!(
        engine.courses.create(Cohort::Grade11, TimeSlot::Slot1, date(2025, 1, 14)).unwrap(),
        CreateCourseDecision::Rejected { .. }
    ));
    let summary = engine.courses.export_summary(course_id).unwrap().unwrap();
    assert!(summary.starts_with("Course ID,Cohort,TimeSlot,StartDate,EndDate\n"));
}

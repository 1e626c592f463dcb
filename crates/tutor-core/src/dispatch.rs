//! Notification fan-out and post-commit delivery
//!
//! Workflows build a list of [`Delivery`] values while they run and hand it
//! to the [`Dispatcher`] only after their store writes have committed. Each
//! sink call is made independently; a failing sink is logged and never
//! reported back to the workflow.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tutor_api::{
    Assignment, Course, NotificationCategory, NotificationEvent, Registration, RegistrationStatus,
    Submission,
};
use tutor_store::Store;
use tutor_util::{Clock, StudentId, TutorError, format_date, format_datetime_full};

/// Named parameters substituted into an email template
pub type EmailParams = BTreeMap<String, String>;

/// Kinds of email the service sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTemplate {
    RegistrationApproved,
    CourseEndingSoon,
    AssignmentDueSoon,
    AssignmentNew,
    SubmissionReceived,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::RegistrationApproved => "registration_approved",
            EmailTemplate::CourseEndingSoon => "course_ending_soon",
            EmailTemplate::AssignmentDueSoon => "assignment_due_soon",
            EmailTemplate::AssignmentNew => "assignment_new",
            EmailTemplate::SubmissionReceived => "submission_received",
        }
    }

    pub fn subject(&self, params: &EmailParams) -> String {
        match self {
            EmailTemplate::RegistrationApproved => "Your course registration was approved".into(),
            EmailTemplate::CourseEndingSoon => {
                format!("{} is ending soon", param(params, "course"))
            }
            EmailTemplate::AssignmentDueSoon => {
                format!("Reminder: {} is due soon", param(params, "title"))
            }
            EmailTemplate::AssignmentNew => format!("New assignment: {}", param(params, "title")),
            EmailTemplate::SubmissionReceived => {
                format!("Submission received: {}", param(params, "title"))
            }
        }
    }

    pub fn render(&self, params: &EmailParams) -> String {
        match self {
            EmailTemplate::RegistrationApproved => format!(
                "Your registration for {} has been approved. See you in class!",
                param(params, "course")
            ),
            EmailTemplate::CourseEndingSoon => format!(
                "{} ends on {}. Make sure all your work is handed in.",
                param(params, "course"),
                param(params, "end_date")
            ),
            EmailTemplate::AssignmentDueSoon => format!(
                "The assignment '{}' is due at {}.",
                param(params, "title"),
                param(params, "due_at")
            ),
            EmailTemplate::AssignmentNew => format!(
                "A new assignment '{}' was posted for {}. It is due at {}.",
                param(params, "title"),
                param(params, "course"),
                param(params, "due_at")
            ),
            EmailTemplate::SubmissionReceived => format!(
                "We received your submission for '{}' at {} ({}). It was due at {}.",
                param(params, "title"),
                param(params, "submitted_at"),
                param(params, "status"),
                param(params, "due_at")
            ),
        }
    }
}

impl fmt::Display for EmailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn param<'a>(params: &'a EmailParams, key: &str) -> &'a str {
    params.get(key).map(String::as_str).unwrap_or("")
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery to {address} failed: {reason}")]
    Failed { address: String, reason: String },
}

/// Inbox collaborator
pub trait NotificationSink: Send + Sync {
    fn record(
        &self,
        recipient: StudentId,
        title: &str,
        body: &str,
        category: NotificationCategory,
    ) -> tutor_util::Result<()>;
}

/// Outbound email collaborator
pub trait EmailSink: Send + Sync {
    fn send(
        &self,
        address: &str,
        template: EmailTemplate,
        params: &EmailParams,
    ) -> Result<(), DeliveryError>;
}

/// Persists notifications into the store-backed inbox
pub struct StoreNotificationSink {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn record(
        &self,
        recipient: StudentId,
        title: &str,
        body: &str,
        category: NotificationCategory,
    ) -> tutor_util::Result<()> {
        self.store
            .insert_notification(recipient, title, body, category, self.clock.now())
            .map(|_| ())
            .map_err(|e| TutorError::store(e.to_string()))
    }
}

/// Renders emails into the log instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogEmailSink {
    from_address: Option<String>,
}

impl LogEmailSink {
    pub fn new(from_address: Option<String>) -> Self {
        Self { from_address }
    }
}

impl EmailSink for LogEmailSink {
    fn send(
        &self,
        address: &str,
        template: EmailTemplate,
        params: &EmailParams,
    ) -> Result<(), DeliveryError> {
        info!(
            to = address,
            from = self.from_address.as_deref().unwrap_or("-"),
            template = %template,
            subject = %template.subject(params),
            "Email rendered"
        );
        debug!(body = %template.render(params), "Email body");
        Ok(())
    }
}

/// Email half of a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub template: EmailTemplate,
    pub params: EmailParams,
}

impl EmailRequest {
    fn new(template: EmailTemplate, params: &[(&str, String)]) -> Self {
        Self {
            template,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }
}

/// One outgoing message to a student: an inbox record, an email, or both
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: StudentId,
    pub event: Option<NotificationEvent>,
    pub email: Option<EmailRequest>,
}

impl Delivery {
    fn new(event: NotificationEvent, email: EmailRequest) -> Self {
        Self {
            recipient: event.recipient,
            event: Some(event),
            email: Some(email),
        }
    }

    fn inbox_only(event: NotificationEvent) -> Self {
        Self {
            recipient: event.recipient,
            event: Some(event),
            email: None,
        }
    }

    fn email_only(recipient: StudentId, email: EmailRequest) -> Self {
        Self {
            recipient,
            event: None,
            email: Some(email),
        }
    }
}

/// Collect the notification events out of a batch of deliveries
pub fn events_of(deliveries: &[Delivery]) -> Vec<NotificationEvent> {
    deliveries.iter().filter_map(|d| d.event.clone()).collect()
}

fn format_due(due_at: &DateTime<Local>) -> String {
    format_datetime_full(due_at)
}

/// Stateless fan-out: one delivery per (recipient, event) pair
pub struct NotificationDispatch;

impl NotificationDispatch {
    /// Decision on a registration, addressed to its student
    pub fn registration_decided(registration: &Registration, course: &Course) -> Delivery {
        let label = course.label();
        match registration.status {
            RegistrationStatus::Approved => Delivery::new(
                NotificationEvent::new(
                    registration.student_id,
                    "Registration approved",
                    format!("Your registration for {} has been approved.", label),
                    NotificationCategory::RegistrationApproved,
                ),
                EmailRequest::new(
                    EmailTemplate::RegistrationApproved,
                    &[("course", label)],
                ),
            ),
            // Pending is never dispatched; treat it like a refusal if it slips through
            RegistrationStatus::Rejected | RegistrationStatus::Pending => {
                Delivery::inbox_only(NotificationEvent::new(
                    registration.student_id,
                    "Registration rejected",
                    format!(
                        "Your registration for {} was rejected. Reason: {}",
                        label,
                        registration.rejection_reason.as_deref().unwrap_or("none given")
                    ),
                    NotificationCategory::RegistrationRejected,
                ))
            }
        }
    }

    /// Student taken off a course roster
    pub fn removed_from_course(student_id: StudentId) -> Delivery {
        Delivery::inbox_only(NotificationEvent::new(
            student_id,
            "Removed from course",
            "You have been removed from the course. You may register for another course.",
            NotificationCategory::RegistrationRejected,
        ))
    }

    pub fn course_ending_soon(course: &Course, recipients: &[StudentId]) -> Vec<Delivery> {
        let label = course.label();
        let end_date = format_date(course.end_date);
        recipients
            .iter()
            .map(|student_id| Delivery::new(
                NotificationEvent::new(
                    *student_id,
                    "Course ending soon",
                    format!("{} ends on {}.", label, end_date),
                    NotificationCategory::CourseEndingSoon,
                ),
                EmailRequest::new(
                    EmailTemplate::CourseEndingSoon,
                    &[("course", label.clone()), ("end_date", end_date.clone())],
                ),
            ))
            .collect()
    }

    pub fn assignment_due_soon(
        assignment: &Assignment,
        recipients: &[StudentId],
    ) -> Vec<Delivery> {
        let due = format_due(&assignment.due_at);
        recipients
            .iter()
            .map(|student_id| Delivery::new(
                NotificationEvent::new(
                    *student_id,
                    "Assignment due soon",
                    format!("Assignment '{}' is due at {}.", assignment.title, due),
                    NotificationCategory::AssignmentDueSoon,
                ),
                EmailRequest::new(
                    EmailTemplate::AssignmentDueSoon,
                    &[("title", assignment.title.clone()), ("due_at", due.clone())],
                ),
            ))
            .collect()
    }

    pub fn assignment_new(
        assignment: &Assignment,
        course: &Course,
        recipients: &[StudentId],
    ) -> Vec<Delivery> {
        let label = course.label();
        let due = format_due(&assignment.due_at);
        recipients
            .iter()
            .map(|student_id| Delivery::new(
                NotificationEvent::new(
                    *student_id,
                    format!("New assignment: {}", assignment.title),
                    format!("A new assignment was posted for {}. Due {}.", label, due),
                    NotificationCategory::AssignmentNew,
                ),
                EmailRequest::new(
                    EmailTemplate::AssignmentNew,
                    &[
                        ("title", assignment.title.clone()),
                        ("course", label.clone()),
                        ("due_at", due.clone()),
                    ],
                ),
            ))
            .collect()
    }

    pub fn assignment_cancelled(
        assignment: &Assignment,
        recipients: &[StudentId],
    ) -> Vec<Delivery> {
        recipients
            .iter()
            .map(|student_id| {
                Delivery::inbox_only(NotificationEvent::new(
                    *student_id,
                    "Assignment cancelled",
                    format!("Assignment '{}' was cancelled by the teacher.", assignment.title),
                    NotificationCategory::AssignmentCancelled,
                ))
            })
            .collect()
    }

    /// Email-only receipt for a new submission
    pub fn submission_received(
        submission: &Submission,
        assignment: &Assignment,
        is_late: bool,
    ) -> Delivery {
        let status = if is_late { "late" } else { "on time" };
        Delivery::email_only(
            submission.student_id,
            EmailRequest::new(
                EmailTemplate::SubmissionReceived,
                &[
                    ("title", assignment.title.clone()),
                    ("submitted_at", format_datetime_full(&submission.submitted_at)),
                    ("due_at", format_due(&assignment.due_at)),
                    ("status", status.into()),
                    ("is_late", is_late.to_string()),
                ],
            ),
        )
    }

    pub fn grade_received(submission: &Submission, assignment: &Assignment) -> Delivery {
        let grade = submission
            .grade
            .map(|g| g.to_string())
            .unwrap_or_else(|| "-".into());
        Delivery::inbox_only(NotificationEvent::new(
            submission.student_id,
            "Grade received",
            format!("You received {} for assignment: {}", grade, assignment.title),
            NotificationCategory::GradeReceived,
        ))
    }
}

/// What happened to a batch of deliveries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub recorded: usize,
    pub emailed: usize,
    pub failed: usize,
}

/// Hands deliveries to the sinks after the owning transition has committed
pub struct Dispatcher {
    notifications: Arc<dyn NotificationSink>,
    email: Option<Arc<dyn EmailSink>>,
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(notifications: Arc<dyn NotificationSink>, store: Arc<dyn Store>) -> Self {
        Self {
            notifications,
            email: None,
            store,
        }
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSink>) -> Self {
        self.email = Some(email);
        self
    }

    /// Deliver every message; failures are logged and counted, never returned
    pub fn deliver(&self, deliveries: &[Delivery]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for delivery in deliveries {
            if let Some(event) = &delivery.event {
                match self.notifications.record(
                    event.recipient,
                    &event.title,
                    &event.body,
                    event.category,
                ) {
                    Ok(()) => report.recorded += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            recipient = %event.recipient,
                            category = event.category.as_str(),
                            error = %e,
                            "Failed to record notification"
                        );
                    }
                }
            }

            if let (Some(sink), Some(email)) = (&self.email, &delivery.email) {
                match self.send_email(sink.as_ref(), delivery.recipient, email) {
                    Ok(true) => report.emailed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            recipient = %delivery.recipient,
                            template = %email.template,
                            error = %e,
                            "Failed to send email"
                        );
                    }
                }
            }
        }

        if !deliveries.is_empty() {
            debug!(
                recorded = report.recorded,
                emailed = report.emailed,
                failed = report.failed,
                "Deliveries dispatched"
            );
        }

        report
    }

    /// Returns Ok(false) when the student has no address on file
    fn send_email(
        &self,
        sink: &dyn EmailSink,
        recipient: StudentId,
        email: &EmailRequest,
    ) -> Result<bool, TutorError> {
        let student = self
            .store
            .get_student(recipient)
            .map_err(|e| TutorError::store(e.to_string()))?;

        let Some(student) = student else {
            debug!(recipient = %recipient, "No address on file, email skipped");
            return Ok(false);
        };

        sink.send(&student.email, email.template, &email.params)
            .map_err(|e| TutorError::delivery(e.to_string()))?;
        Ok(true)
    }
}

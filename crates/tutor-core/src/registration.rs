//! Enrollment workflow
//!
//! Registration states: Pending -> Approved | Rejected. Both decisions are
//! final; a row may also be removed from any state (withdrawal).
//!
//! A student holds at most one approved registration. The same guard runs
//! before a new request is accepted and before an approval is recorded, and
//! the store's partial unique index backs it up.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use tutor_api::{NotificationEvent, Registration, RegistrationStatus};
use tutor_store::{AuditEvent, AuditEventType, Store};
use tutor_util::{Clock, CourseId, RegistrationId, StudentId};

use crate::{Dispatcher, NotificationDispatch, WorkflowError, WorkflowResult, events_of};

/// Why a registration request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDenial {
    CourseNotFound,
    CourseInactive,
    /// A row already exists for this pair, in any status
    AlreadyRequested { status: RegistrationStatus },
    /// The student is enrolled elsewhere
    AlreadyEnrolled { course_id: CourseId },
}

impl fmt::Display for RequestDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestDenial::CourseNotFound => write!(f, "Course not found"),
            RequestDenial::CourseInactive => write!(f, "Course is no longer offered"),
            RequestDenial::AlreadyRequested { status } => {
                write!(f, "A registration for this course already exists ({})", status.as_str())
            }
            RequestDenial::AlreadyEnrolled { course_id } => write!(
                f,
                "Already enrolled in course {}; leave it before registering elsewhere",
                course_id
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestDecision {
    Created(Registration),
    Denied { reason: RequestDenial },
}

#[derive(Debug, Clone)]
pub enum DecideOutcome {
    /// Decision stored; `events` were handed to the sinks
    Decided {
        registration: Registration,
        events: Vec<NotificationEvent>,
    },
    NotFound,
    /// Approval refused: the student is already approved for another course
    Blocked { approved_course: CourseId },
}

/// Request, decide and withdraw registrations
pub struct RegistrationWorkflow {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<Dispatcher>,
}

impl RegistrationWorkflow {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            clock,
            dispatcher,
        }
    }

    /// The student's approved registration, if any
    fn current_enrollment(&self, student_id: StudentId) -> WorkflowResult<Option<Registration>> {
        Ok(self
            .store
            .registrations_for_student(student_id)?
            .into_iter()
            .find(Registration::is_approved))
    }

    /// Ask to join a course. Creates a pending row or says why not.
    pub fn request(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> WorkflowResult<RequestDecision> {
        let denied = |reason: RequestDenial| -> WorkflowResult<RequestDecision> {
            debug!(
                student_id = %student_id,
                course_id = %course_id,
                reason = %reason,
                "Registration denied"
            );
            Ok(RequestDecision::Denied { reason })
        };

        let Some(course) = self.store.get_course(course_id)? else {
            return denied(RequestDenial::CourseNotFound);
        };
        if !course.is_active {
            return denied(RequestDenial::CourseInactive);
        }

        if let Some(existing) = self.store.find_registration(student_id, course_id)? {
            return denied(RequestDenial::AlreadyRequested {
                status: existing.status,
            });
        }

        if let Some(enrollment) = self.current_enrollment(student_id)? {
            return denied(RequestDenial::AlreadyEnrolled {
                course_id: enrollment.course_id,
            });
        }

        let registration =
            match self
                .store
                .insert_registration(student_id, course_id, self.clock.now())
            {
                Ok(registration) => registration,
                Err(e) if e.is_conflict() => {
                    let status = self
                        .store
                        .find_registration(student_id, course_id)?
                        .map(|r| r.status)
                        .unwrap_or(RegistrationStatus::Pending);
                    return denied(RequestDenial::AlreadyRequested { status });
                }
                Err(e) => return Err(e.into()),
            };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RegistrationRequested {
                registration_id: registration.id,
                student_id,
                course_id,
            }));

        info!(
            registration_id = %registration.id,
            student_id = %student_id,
            course_id = %course_id,
            "Registration requested"
        );

        Ok(RequestDecision::Created(registration))
    }

    /// Approve or reject a pending registration.
    ///
    /// The rejection reason is kept only when rejecting. Notifications go
    /// out after the decision is stored and cannot undo it.
    pub fn decide(
        &self,
        registration_id: RegistrationId,
        approved: bool,
        rejection_reason: Option<&str>,
    ) -> WorkflowResult<DecideOutcome> {
        let Some(registration) = self.store.get_registration(registration_id)? else {
            return Ok(DecideOutcome::NotFound);
        };

        if registration.status != RegistrationStatus::Pending {
            return Err(WorkflowError::InvalidDecision {
                id: registration_id,
                status: registration.status,
            });
        }

        if approved
            && let Some(enrollment) = self.current_enrollment(registration.student_id)?
        {
            info!(
                registration_id = %registration_id,
                student_id = %registration.student_id,
                approved_course = %enrollment.course_id,
                "Approval blocked by existing enrollment"
            );
            return Ok(DecideOutcome::Blocked {
                approved_course: enrollment.course_id,
            });
        }

        let Some(course) = self.store.get_course(registration.course_id)? else {
            return Ok(DecideOutcome::NotFound);
        };

        let (status, reason) = if approved {
            (RegistrationStatus::Approved, None)
        } else {
            (RegistrationStatus::Rejected, rejection_reason)
        };
        let processed_at = self.clock.now();

        match self
            .store
            .record_decision(registration_id, status, reason, processed_at)
        {
            Ok(true) => {}
            Ok(false) => return self.unrecorded_decision(registration_id),
            Err(e) if e.is_conflict() => {
                if let Some(enrollment) = self.current_enrollment(registration.student_id)? {
                    return Ok(DecideOutcome::Blocked {
                        approved_course: enrollment.course_id,
                    });
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }

        let registration = Registration {
            status,
            rejection_reason: reason.map(str::to_string),
            processed_at: Some(processed_at),
            ..registration
        };

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RegistrationDecided {
                registration_id,
                status,
            }));

        info!(
            registration_id = %registration_id,
            student_id = %registration.student_id,
            course_id = %registration.course_id,
            status = status.as_str(),
            "Registration decided"
        );

        let deliveries = [NotificationDispatch::registration_decided(&registration, &course)];
        self.dispatcher.deliver(&deliveries);

        Ok(DecideOutcome::Decided {
            registration,
            events: events_of(&deliveries),
        })
    }

    /// The store declined the write: the row is gone, or another decision
    /// landed first.
    fn unrecorded_decision(
        &self,
        registration_id: RegistrationId,
    ) -> WorkflowResult<DecideOutcome> {
        match self.store.get_registration(registration_id)? {
            Some(current) => Err(WorkflowError::InvalidDecision {
                id: registration_id,
                status: current.status,
            }),
            None => Ok(DecideOutcome::NotFound),
        }
    }

    /// Remove the registration for a pair, whatever its status.
    ///
    /// Returns `Ok(false)` when there is no such row.
    pub fn withdraw(&self, student_id: StudentId, course_id: CourseId) -> WorkflowResult<bool> {
        let Some(registration) = self.store.find_registration(student_id, course_id)? else {
            return Ok(false);
        };

        if !self.store.delete_registration(registration.id)? {
            return Ok(false);
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RegistrationWithdrawn {
                student_id,
                course_id,
            }));

        info!(
            student_id = %student_id,
            course_id = %course_id,
            status = registration.status.as_str(),
            "Registration withdrawn"
        );

        self.dispatcher
            .deliver(&[NotificationDispatch::removed_from_course(student_id)]);

        Ok(true)
    }

    /// Pending registrations, oldest request first
    pub fn list_pending(&self) -> WorkflowResult<Vec<Registration>> {
        Ok(self.store.pending_registrations()?)
    }

    /// A student's registrations, oldest request first
    pub fn list_for_student(&self, student_id: StudentId) -> WorkflowResult<Vec<Registration>> {
        Ok(self.store.registrations_for_student(student_id)?)
    }
}

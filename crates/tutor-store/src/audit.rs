//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tutor_api::{Cohort, RegistrationStatus, TimeSlot};
use tutor_util::{AssignmentId, CourseId, RegistrationId, StudentId, SweepId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Course section created
    CourseCreated {
        course_id: CourseId,
        cohort: Cohort,
        time_slot: TimeSlot,
    },

    /// Course creation refused by the schedule rules
    CourseRejected {
        cohort: Cohort,
        time_slot: TimeSlot,
        reason: String,
    },

    /// Course physically removed
    CourseDeleted { course_id: CourseId },

    /// Course soft-deleted
    CourseDeactivated { course_id: CourseId },

    /// Course summary exported
    CourseExported { course_id: CourseId },

    /// Student asked to join a course
    RegistrationRequested {
        registration_id: RegistrationId,
        student_id: StudentId,
        course_id: CourseId,
    },

    /// Teacher decision recorded
    RegistrationDecided {
        registration_id: RegistrationId,
        status: RegistrationStatus,
    },

    /// Registration row removed
    RegistrationWithdrawn {
        student_id: StudentId,
        course_id: CourseId,
    },

    /// Assignment posted
    AssignmentCreated {
        assignment_id: AssignmentId,
        course_id: CourseId,
    },

    /// Assignment with submissions was deactivated
    AssignmentCancelled { assignment_id: AssignmentId },

    /// Assignment without submissions was removed
    AssignmentRemoved { assignment_id: AssignmentId },

    /// Periodic reminder sweep finished
    SweepCompleted {
        sweep_id: SweepId,
        courses_ending_soon: usize,
        assignments_due_soon: usize,
        notifications: usize,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: tutor_util::now(),
            event,
        }
    }

    pub fn at(timestamp: DateTime<Local>, event: AuditEventType) -> Self {
        Self {
            id: 0,
            timestamp,
            event,
        }
    }
}

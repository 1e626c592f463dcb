//! Notification events produced by the dispatch fan-out

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tutor_util::{NotificationId, StudentId};

use crate::UnknownVariant;

/// Notification categories understood by the inbox and email templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    AssignmentNew,
    AssignmentDueSoon,
    AssignmentCancelled,
    GradeReceived,
    RegistrationApproved,
    /// Also used when a student is removed from a course
    RegistrationRejected,
    CourseEndingSoon,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::AssignmentNew => "assignment_new",
            NotificationCategory::AssignmentDueSoon => "assignment_due_soon",
            NotificationCategory::AssignmentCancelled => "assignment_cancelled",
            NotificationCategory::GradeReceived => "grade_received",
            NotificationCategory::RegistrationApproved => "registration_approved",
            NotificationCategory::RegistrationRejected => "registration_rejected",
            NotificationCategory::CourseEndingSoon => "course_ending_soon",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment_new" => Ok(NotificationCategory::AssignmentNew),
            "assignment_due_soon" => Ok(NotificationCategory::AssignmentDueSoon),
            "assignment_cancelled" => Ok(NotificationCategory::AssignmentCancelled),
            "grade_received" => Ok(NotificationCategory::GradeReceived),
            "registration_approved" => Ok(NotificationCategory::RegistrationApproved),
            "registration_rejected" => Ok(NotificationCategory::RegistrationRejected),
            "course_ending_soon" => Ok(NotificationCategory::CourseEndingSoon),
            other => Err(UnknownVariant {
                kind: "notification category",
                value: other.to_string(),
            }),
        }
    }
}

/// One (recipient, message) pair. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient: StudentId,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
}

impl NotificationEvent {
    pub fn new(
        recipient: StudentId,
        title: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> Self {
        Self {
            recipient,
            title: title.into(),
            body: body.into(),
            category,
        }
    }
}

/// A notification as persisted in a user's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub id: NotificationId,
    pub user_id: StudentId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub is_read: bool,
    pub created_at: DateTime<Local>,
}

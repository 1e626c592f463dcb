//! Workflow errors

use thiserror::Error;
use tutor_api::RegistrationStatus;
use tutor_store::StoreError;
use tutor_util::{CourseId, RegistrationId};

/// Failures that stop a workflow operation.
///
/// Business refusals (schedule conflicts, duplicate requests) are not
/// errors; they come back as decision values.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Course {0} has registrations and cannot be deleted")]
    CourseHasRegistrations(CourseId),

    #[error("Registration {id} was already {status:?}")]
    InvalidDecision {
        id: RegistrationId,
        status: RegistrationStatus,
    },
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

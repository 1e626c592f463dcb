//! Schedule validation for new course sections

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;
use tutor_api::{Cohort, Course, TimeSlot};
use tutor_util::{CourseId, DaysOfWeek, format_date, full_day_name};

use crate::ScheduleRules;

/// A course section that has not been created yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseCandidate {
    pub cohort: Cohort,
    pub time_slot: TimeSlot,
    pub start_date: NaiveDate,
}

/// Why a candidate cannot be scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Start date is today or earlier
    StartNotInFuture {
        start_date: NaiveDate,
        today: NaiveDate,
    },

    /// Start date falls on a weekday the cohort does not meet on
    WrongWeekday {
        cohort: Cohort,
        allowed: DaysOfWeek,
        chosen: Weekday,
    },

    /// Start date lies inside an existing active section's span
    Overlaps {
        course_id: CourseId,
        cohort: Cohort,
        time_slot: TimeSlot,
        start_date: NaiveDate,
        end_date: NaiveDate,
        days: DaysOfWeek,
    },

    /// The store already holds an active section with this exact start
    AlreadyScheduled {
        cohort: Cohort,
        time_slot: TimeSlot,
        start_date: NaiveDate,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::StartNotInFuture { start_date, today } => write!(
                f,
                "Start date {} must be after today ({})",
                format_date(*start_date),
                format_date(*today)
            ),
            ConflictReason::WrongWeekday {
                cohort,
                allowed,
                chosen,
            } => write!(
                f,
                "Start date does not match the schedule: {} meets on {}, but the chosen day is {}",
                cohort,
                allowed,
                full_day_name(*chosen)
            ),
            ConflictReason::Overlaps {
                cohort,
                time_slot,
                start_date,
                end_date,
                days,
                ..
            } => write!(
                f,
                "Schedule conflict: {} - {} already runs from {} to {} ({})",
                cohort,
                time_slot,
                format_date(*start_date),
                format_date(*end_date),
                days
            ),
            ConflictReason::AlreadyScheduled {
                cohort,
                time_slot,
                start_date,
            } => write!(
                f,
                "Schedule conflict: a {} - {} section already starts on {}",
                cohort,
                time_slot,
                format_date(*start_date)
            ),
        }
    }
}

/// Outcome of a conflict check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    Clear,
    Conflict(ConflictReason),
}

impl ConflictResult {
    pub fn has_conflict(&self) -> bool {
        matches!(self, ConflictResult::Conflict(_))
    }

    pub fn reason(&self) -> Option<&ConflictReason> {
        match self {
            ConflictResult::Clear => None,
            ConflictResult::Conflict(reason) => Some(reason),
        }
    }
}

/// Decides whether a candidate section is schedule-valid and free of
/// overlap with existing active sections.
#[derive(Debug, Clone, Default)]
pub struct ConflictChecker {
    rules: ScheduleRules,
}

impl ConflictChecker {
    pub fn new(rules: ScheduleRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ScheduleRules {
        &self.rules
    }

    /// Check a candidate against a snapshot of existing courses.
    ///
    /// Checks run in order and stop at the first failure: the start date
    /// must be after `today`, must fall on one of the cohort's weekdays, and
    /// must not lie inside the inclusive span of an active course with the
    /// same cohort and slot. Inactive courses and other cohorts or slots in
    /// `existing` are ignored.
    pub fn check(
        &self,
        candidate: &CourseCandidate,
        today: NaiveDate,
        existing: &[Course],
    ) -> ConflictResult {
        if candidate.start_date <= today {
            return ConflictResult::Conflict(ConflictReason::StartNotInFuture {
                start_date: candidate.start_date,
                today,
            });
        }

        let allowed = self.rules.schedule_days(candidate.cohort);
        let chosen = candidate.start_date.weekday();
        if !allowed.contains(chosen) {
            return ConflictResult::Conflict(ConflictReason::WrongWeekday {
                cohort: candidate.cohort,
                allowed,
                chosen,
            });
        }

        let overlapping = existing.iter().find(|course| {
            course.is_active
                && course.cohort == candidate.cohort
                && course.time_slot == candidate.time_slot
                && course.start_date <= candidate.start_date
                && candidate.start_date <= course.end_date
        });

        if let Some(course) = overlapping {
            return ConflictResult::Conflict(ConflictReason::Overlaps {
                course_id: course.id,
                cohort: course.cohort,
                time_slot: course.time_slot,
                start_date: course.start_date,
                end_date: course.end_date,
                days: self.rules.schedule_days(course.cohort),
            });
        }

        ConflictResult::Clear
    }
}

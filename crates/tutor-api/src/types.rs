//! Shared record and view types

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tutor_util::{
    AssignmentId, CourseId, RegistrationId, StudentId, SubmissionId, WallClock, start_of_day,
};

/// Returned when a stored or configured name does not match any variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Grade-level cohort; decides which weekdays a course meets on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    Grade10,
    Grade11,
    Grade12,
}

impl Cohort {
    pub const ALL: [Cohort; 3] = [Cohort::Grade10, Cohort::Grade11, Cohort::Grade12];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Grade10 => "grade10",
            Cohort::Grade11 => "grade11",
            Cohort::Grade12 => "grade12",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cohort::Grade10 => write!(f, "Grade 10"),
            Cohort::Grade11 => write!(f, "Grade 11"),
            Cohort::Grade12 => write!(f, "Grade 12"),
        }
    }
}

impl FromStr for Cohort {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "grade10" | "10" => Ok(Cohort::Grade10),
            "grade11" | "11" => Ok(Cohort::Grade11),
            "grade12" | "12" => Ok(Cohort::Grade12),
            _ => Err(UnknownVariant::new("cohort", s)),
        }
    }
}

/// Fixed daily class window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    /// 14:00 - 16:00
    Slot1,
    /// 17:00 - 19:00
    Slot2,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 2] = [TimeSlot::Slot1, TimeSlot::Slot2];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Slot1 => "slot1",
            TimeSlot::Slot2 => "slot2",
        }
    }

    pub fn start(&self) -> WallClock {
        match self {
            TimeSlot::Slot1 => WallClock { hour: 14, minute: 0 },
            TimeSlot::Slot2 => WallClock { hour: 17, minute: 0 },
        }
    }

    pub fn end(&self) -> WallClock {
        match self {
            TimeSlot::Slot1 => WallClock { hour: 16, minute: 0 },
            TimeSlot::Slot2 => WallClock { hour: 19, minute: 0 },
        }
    }

    /// Whether a time of day falls inside the slot (end exclusive)
    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = WallClock::from_naive_time(time);
        time >= self.start() && time < self.end()
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            TimeSlot::Slot1 => 1,
            TimeSlot::Slot2 => 2,
        };
        write!(f, "Slot {} ({}-{})", n, self.start(), self.end())
    }
}

impl FromStr for TimeSlot {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '_'], "").as_str() {
            "slot1" | "1" => Ok(TimeSlot::Slot1),
            "slot2" | "2" => Ok(TimeSlot::Slot2),
            _ => Err(UnknownVariant::new("time slot", s)),
        }
    }
}

/// Registration workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            other => Err(UnknownVariant::new("registration status", other)),
        }
    }
}

/// One offered course section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub cohort: Cohort,
    pub time_slot: TimeSlot,
    pub start_date: NaiveDate,
    /// Fixed at creation, never extended
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub is_data_exported: bool,
    pub created_at: DateTime<Local>,
}

impl Course {
    /// Instant the course is considered over (local midnight starting the end date)
    pub fn ends_at(&self) -> DateTime<Local> {
        start_of_day(self.end_date)
    }

    /// Short human label, e.g. `Grade 11 - Slot 2 (17:00-19:00)`
    pub fn label(&self) -> String {
        format!("{} - {}", self.cohort, self.time_slot)
    }
}

/// Course fields supplied on insert; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCourse {
    pub cohort: Cohort,
    pub time_slot: TimeSlot,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Local>,
}

/// Temporal flags derived from a course's end date and the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CourseState {
    pub is_ended: bool,
    pub is_ending_soon: bool,
}

/// Course with its derived state, for listings and exports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseView {
    pub course: Course,
    pub state: CourseState,
    /// Approved registrations only
    pub student_count: usize,
}

/// A student's relationship to one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub status: RegistrationStatus,
    /// Present only when rejected
    pub rejection_reason: Option<String>,
    pub requested_at: DateTime<Local>,
    /// None until a decision is made
    pub processed_at: Option<DateTime<Local>>,
}

impl Registration {
    pub fn is_approved(&self) -> bool {
        self.status == RegistrationStatus::Approved
    }
}

/// Student directory entry. Accounts are owned elsewhere; the engine only
/// needs a contact address and the student's cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub email: String,
    pub full_name: String,
    pub cohort: Option<Cohort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub course_id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub due_at: DateTime<Local>,
    pub created_at: DateTime<Local>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub course_id: CourseId,
    pub title: String,
    pub description: Option<String>,
    pub due_at: DateTime<Local>,
    pub created_at: DateTime<Local>,
}

/// Temporal flags derived from an assignment's due time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssignmentState {
    pub is_overdue: bool,
    pub is_due_soon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub answer: Option<String>,
    pub submitted_at: DateTime<Local>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Local>>,
}

impl Submission {
    pub fn is_late(&self, due_at: DateTime<Local>) -> bool {
        self.submitted_at > due_at
    }

    pub fn is_graded(&self) -> bool {
        self.grade.is_some()
    }
}

/// Row of the per-course absence report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceReportRow {
    pub student_id: StudentId,
    pub full_name: String,
    pub email: String,
    /// Always zero: attendance streaks are not tracked
    pub consecutive_absent_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohort_parsing() {
        assert_eq!("grade10".parse::<Cohort>().unwrap(), Cohort::Grade10);
        assert_eq!("Grade 11".parse::<Cohort>().unwrap(), Cohort::Grade11);
        assert_eq!("12".parse::<Cohort>().unwrap(), Cohort::Grade12);
        assert!("grade9".parse::<Cohort>().is_err());
    }

    #[test]
    fn cohort_round_trips_through_as_str() {
        for cohort in Cohort::ALL {
            assert_eq!(cohort.as_str().parse::<Cohort>().unwrap(), cohort);
        }
    }

    #[test]
    fn time_slot_windows() {
        let slot = TimeSlot::Slot1;
        assert!(slot.contains(NaiveTime::from_hms_opt(14, 0, 0).unwrap()));
        assert!(slot.contains(NaiveTime::from_hms_opt(15, 59, 0).unwrap()));
        assert!(!slot.contains(NaiveTime::from_hms_opt(16, 0, 0).unwrap()));
        assert!(!TimeSlot::Slot2.contains(NaiveTime::from_hms_opt(16, 30, 0).unwrap()));
        assert_eq!(TimeSlot::Slot2.to_string(), "Slot 2 (17:00-19:00)");
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!(
            "approved".parse::<RegistrationStatus>().unwrap(),
            RegistrationStatus::Approved
        );
        let err = "done".parse::<RegistrationStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown registration status: 'done'");
    }

    #[test]
    fn cohort_serializes_snake_case() {
        let json = serde_json::to_string(&Cohort::Grade12).unwrap();
        assert_eq!(json, "\"grade12\"");
    }
}

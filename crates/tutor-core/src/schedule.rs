//! Weekly schedule lookups and course date arithmetic

use chrono::{DateTime, Datelike, Local, Months, NaiveDate};
use tutor_api::{Cohort, Course};
use tutor_config::{Policy, ScheduleTable};
use tutor_util::DaysOfWeek;

/// How far ahead `next_class_day` looks
const NEXT_CLASS_LOOKAHEAD_DAYS: usize = 7;

/// Pure schedule rules: which weekdays a cohort meets on and how long a
/// section runs.
#[derive(Debug, Clone)]
pub struct ScheduleRules {
    table: ScheduleTable,
    course_length: Months,
}

impl ScheduleRules {
    pub fn new(table: ScheduleTable, course_length_months: u32) -> Self {
        Self {
            table,
            course_length: Months::new(course_length_months),
        }
    }

    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(
            policy.schedule.clone(),
            policy.thresholds.course_length_months,
        )
    }

    /// Weekly class days; a cohort missing from the table has none.
    pub fn schedule_days(&self, cohort: Cohort) -> DaysOfWeek {
        self.table.days_for(cohort)
    }

    /// Start date plus the course length in calendar months.
    ///
    /// Days past the end of the target month clamp to its last day, so a
    /// January 31 start ends on June 30.
    pub fn end_date(&self, start: NaiveDate) -> NaiveDate {
        start
            .checked_add_months(self.course_length)
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn is_class_day(&self, cohort: Cohort, date: NaiveDate) -> bool {
        self.schedule_days(cohort).contains(date.weekday())
    }

    /// Class day for this cohort and inside the course's [start, end] span
    pub fn is_class_day_for_course(&self, course: &Course, date: NaiveDate) -> bool {
        self.is_class_day(course.cohort, date)
            && date >= course.start_date
            && date <= course.end_date
    }

    /// Whether `now` falls inside one of the course's sessions
    pub fn is_class_time(&self, course: &Course, now: DateTime<Local>) -> bool {
        self.is_class_day_for_course(course, now.date_naive())
            && course.time_slot.contains(now.time())
    }

    /// First class day from `today` (inclusive) within the next week
    pub fn next_class_day(&self, course: &Course, today: NaiveDate) -> Option<NaiveDate> {
        today
            .iter_days()
            .take(NEXT_CLASS_LOOKAHEAD_DAYS)
            .find(|date| self.is_class_day_for_course(course, *date))
    }
}

impl Default for ScheduleRules {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use tutor_api::TimeSlot;
    use tutor_util::CourseId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn course(cohort: Cohort, slot: TimeSlot, start: NaiveDate) -> Course {
        let rules = ScheduleRules::default();
        Course {
            id: CourseId::new(1),
            cohort,
            time_slot: slot,
            start_date: start,
            end_date: rules.end_date(start),
            is_active: true,
            is_data_exported: false,
            created_at: Local.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_is_class_day_matches_schedule() {
        let rules = ScheduleRules::default();
        let monday = date(2025, 3, 3);

        for cohort in Cohort::ALL {
            for offset in 0..7 {
                let day = monday + chrono::Duration::days(offset);
                assert_eq!(
                    rules.is_class_day(cohort, day),
                    rules.schedule_days(cohort).contains(day.weekday())
                );
            }
        }

        assert!(rules.is_class_day(Cohort::Grade10, monday));
        assert!(!rules.is_class_day(Cohort::Grade10, date(2025, 3, 4)));
        assert!(rules.is_class_day(Cohort::Grade12, date(2025, 3, 8)));
    }

    #[test]
    fn test_unknown_cohort_has_no_days() {
        let rules = ScheduleRules::new(ScheduleTable::empty(), 5);
        assert!(rules.schedule_days(Cohort::Grade11).is_empty());
        assert!(!rules.is_class_day(Cohort::Grade11, date(2025, 3, 4)));
    }

    #[test]
    fn test_end_date_is_five_months_later() {
        let rules = ScheduleRules::default();
        assert_eq!(rules.end_date(date(2025, 3, 4)), date(2025, 8, 4));
        assert_eq!(rules.end_date(date(2025, 1, 31)), date(2025, 6, 30));
        assert_eq!(rules.end_date(date(2025, 9, 30)), date(2026, 2, 28));
        assert_eq!(rules.end_date(date(2023, 9, 30)), date(2024, 2, 29));
    }

    #[test]
    fn test_configured_length() {
        let rules = ScheduleRules::new(ScheduleTable::standard(), 3);
        assert_eq!(rules.end_date(date(2025, 3, 4)), date(2025, 6, 4));
    }

    #[test]
    fn test_class_day_for_course_respects_span() {
        let rules = ScheduleRules::default();
        let c = course(Cohort::Grade10, TimeSlot::Slot1, date(2025, 3, 3));

        assert!(rules.is_class_day_for_course(&c, date(2025, 3, 3)));
        // Monday before the start
        assert!(!rules.is_class_day_for_course(&c, date(2025, 2, 24)));
        // Monday after the end (2025-08-03 is a Sunday)
        assert!(!rules.is_class_day_for_course(&c, date(2025, 8, 4)));
    }

    #[test]
    fn test_class_time() {
        let rules = ScheduleRules::default();
        let c = course(Cohort::Grade11, TimeSlot::Slot2, date(2025, 3, 4));

        let during = Local.with_ymd_and_hms(2025, 3, 6, 17, 30, 0).unwrap();
        let before = Local.with_ymd_and_hms(2025, 3, 6, 15, 0, 0).unwrap();
        let wrong_day = Local.with_ymd_and_hms(2025, 3, 7, 17, 30, 0).unwrap();

        assert!(rules.is_class_time(&c, during));
        assert!(!rules.is_class_time(&c, before));
        assert!(!rules.is_class_time(&c, wrong_day));
    }

    #[test]
    fn test_next_class_day() {
        let rules = ScheduleRules::default();
        let c = course(Cohort::Grade12, TimeSlot::Slot1, date(2025, 3, 7));

        // From a Monday inside the span the next class is Friday
        let next = rules.next_class_day(&c, date(2025, 3, 10)).unwrap();
        assert_eq!(next, date(2025, 3, 14));
        assert_eq!(next.weekday(), Weekday::Fri);

        // Today counts when it is a class day
        assert_eq!(rules.next_class_day(&c, date(2025, 3, 8)), Some(date(2025, 3, 8)));

        // Past the end there is nothing
        assert_eq!(rules.next_class_day(&c, date(2025, 8, 8)), None);
    }
}

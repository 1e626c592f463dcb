//! Validated policy structures

use crate::schema::{RawConfig, RawEmailConfig, RawServiceConfig, RawThresholds};
use crate::validation::parse_days;
use chrono::Weekday;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tutor_api::Cohort;
use tutor_util::{DaysOfWeek, default_data_dir};

/// Default sweep cadence: once a day
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub service: ServiceConfig,
    pub thresholds: Thresholds,
    pub schedule: ScheduleTable,
    pub email: EmailConfig,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let mut schedule = ScheduleTable::standard();
        for row in raw.schedule {
            // Rows were validated; anything unparseable here is skipped
            if let (Ok(cohort), Ok(days)) = (row.cohort.parse::<Cohort>(), parse_days(&row.days)) {
                debug!(cohort = %cohort, days = %days, "Schedule override applied");
                schedule.set(cohort, days);
            }
        }

        Self {
            service: ServiceConfig::from_raw(raw.service),
            thresholds: Thresholds::from_raw(raw.thresholds),
            schedule,
            email: EmailConfig::from_raw(raw.email),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub sweep_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            sweep_interval: raw
                .sweep_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Windows used when deriving temporal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub ending_soon: chrono::Duration,
    pub due_soon: chrono::Duration,
    pub course_length_months: u32,
}

impl Thresholds {
    fn from_raw(raw: RawThresholds) -> Self {
        let defaults = Self::default();
        Self {
            ending_soon: raw
                .ending_soon_days
                .map(|d| chrono::Duration::days(d as i64))
                .unwrap_or(defaults.ending_soon),
            due_soon: raw
                .due_soon_days
                .map(|d| chrono::Duration::days(d as i64))
                .unwrap_or(defaults.due_soon),
            course_length_months: raw
                .course_length_months
                .unwrap_or(defaults.course_length_months),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ending_soon: chrono::Duration::days(3),
            due_soon: chrono::Duration::days(3),
            course_length_months: 5,
        }
    }
}

/// Cohort to weekly class days lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTable {
    days: BTreeMap<Cohort, DaysOfWeek>,
}

impl ScheduleTable {
    /// The center's fixed timetable
    pub fn standard() -> Self {
        let mut days = BTreeMap::new();
        days.insert(
            Cohort::Grade10,
            DaysOfWeek::from_weekdays(&[Weekday::Mon, Weekday::Wed]),
        );
        days.insert(
            Cohort::Grade11,
            DaysOfWeek::from_weekdays(&[Weekday::Tue, Weekday::Thu]),
        );
        days.insert(
            Cohort::Grade12,
            DaysOfWeek::from_weekdays(&[Weekday::Fri, Weekday::Sat]),
        );
        Self { days }
    }

    /// Table with no cohorts at all
    pub fn empty() -> Self {
        Self {
            days: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, cohort: Cohort, days: DaysOfWeek) {
        self.days.insert(cohort, days);
    }

    pub fn remove(&mut self, cohort: Cohort) {
        self.days.remove(&cohort);
    }

    /// Class days for a cohort; a cohort missing from the table has none
    pub fn days_for(&self, cohort: Cohort) -> DaysOfWeek {
        self.days.get(&cohort).copied().unwrap_or(DaysOfWeek::NONE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cohort, DaysOfWeek)> + '_ {
        self.days.iter().map(|(c, d)| (*c, *d))
    }
}

impl Default for ScheduleTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub enabled: bool,
    pub from_address: Option<String>,
}

impl EmailConfig {
    fn from_raw(raw: RawEmailConfig) -> Self {
        Self {
            enabled: raw.enabled.unwrap_or(true),
            from_address: raw.from_address,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawCohortSchedule, RawDays};

    #[test]
    fn test_standard_schedule() {
        let table = ScheduleTable::standard();
        assert_eq!(table.days_for(Cohort::Grade10).to_string(), "Mon, Wed");
        assert_eq!(table.days_for(Cohort::Grade11).to_string(), "Tue, Thu");
        assert_eq!(table.days_for(Cohort::Grade12).to_string(), "Fri, Sat");
    }

    #[test]
    fn test_missing_cohort_has_no_days() {
        let mut table = ScheduleTable::standard();
        table.remove(Cohort::Grade12);
        assert!(table.days_for(Cohort::Grade12).is_empty());
        assert!(ScheduleTable::empty().days_for(Cohort::Grade10).is_empty());
    }

    #[test]
    fn test_schedule_override() {
        let raw = RawConfig {
            config_version: 1,
            service: Default::default(),
            thresholds: Default::default(),
            schedule: vec![RawCohortSchedule {
                cohort: "grade11".into(),
                days: RawDays::List(vec!["sat".into(), "sun".into()]),
            }],
            email: Default::default(),
        };

        let policy = Policy::from_raw(raw);
        assert_eq!(policy.schedule.days_for(Cohort::Grade11).to_string(), "Sat, Sun");
        // Untouched cohorts keep the standard table
        assert_eq!(policy.schedule.days_for(Cohort::Grade10).to_string(), "Mon, Wed");
    }

    #[test]
    fn test_defaults() {
        let policy = Policy::default();
        assert_eq!(policy.thresholds.ending_soon, chrono::Duration::days(3));
        assert_eq!(policy.service.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert!(policy.email.enabled);
    }
}

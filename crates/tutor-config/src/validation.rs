//! Configuration validation

use crate::schema::{RawCohortSchedule, RawConfig, RawDays};
use std::collections::HashSet;
use thiserror::Error;
use tutor_api::Cohort;
use tutor_util::{DaysOfWeek, parse_weekday};

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Schedule for '{cohort}': {message}")]
    ScheduleError { cohort: String, message: String },

    #[error("Duplicate schedule for cohort: {0}")]
    DuplicateCohort(String),

    #[error("Threshold '{name}' must be greater than zero")]
    ZeroThreshold { name: &'static str },

    #[error("Invalid email sender address: '{0}'")]
    InvalidSender(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Check for duplicate cohort rows
    let mut seen = HashSet::new();
    for row in &config.schedule {
        if let Ok(cohort) = row.cohort.parse::<Cohort>()
            && !seen.insert(cohort)
        {
            errors.push(ValidationError::DuplicateCohort(row.cohort.clone()));
        }
    }

    for row in &config.schedule {
        errors.extend(validate_schedule_row(row));
    }

    let thresholds = &config.thresholds;
    let checks = [
        ("ending_soon_days", thresholds.ending_soon_days),
        ("due_soon_days", thresholds.due_soon_days),
        ("course_length_months", thresholds.course_length_months),
    ];
    for (name, value) in checks {
        if value == Some(0) {
            errors.push(ValidationError::ZeroThreshold { name });
        }
    }

    if config.service.sweep_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "sweep_interval_seconds must be greater than zero".into(),
        ));
    }

    if let Some(sender) = &config.email.from_address
        && !looks_like_address(sender)
    {
        errors.push(ValidationError::InvalidSender(sender.clone()));
    }

    errors
}

fn validate_schedule_row(row: &RawCohortSchedule) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = row.cohort.parse::<Cohort>() {
        errors.push(ValidationError::ScheduleError {
            cohort: row.cohort.clone(),
            message: e.to_string(),
        });
    }

    match parse_days(&row.days) {
        Ok(days) if days.is_empty() => errors.push(ValidationError::ScheduleError {
            cohort: row.cohort.clone(),
            message: "at least one class day is required".into(),
        }),
        Ok(_) => {}
        Err(message) => errors.push(ValidationError::ScheduleError {
            cohort: row.cohort.clone(),
            message,
        }),
    }

    errors
}

fn looks_like_address(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Parse days specification
pub fn parse_days(days: &RawDays) -> Result<DaysOfWeek, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(DaysOfWeek::new(0x7F)),
            "weekdays" => Ok(DaysOfWeek::new(0x1F)), // Mon-Fri
            "weekends" => Ok(DaysOfWeek::new(0x60)), // Sat-Sun
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::List(list) => {
            let mut weekdays = Vec::with_capacity(list.len());
            for day in list {
                match parse_weekday(day) {
                    Some(weekday) => weekdays.push(weekday),
                    None => return Err(format!("Unknown day: {}", day)),
                }
            }
            Ok(DaysOfWeek::from_weekdays(&weekdays))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawEmailConfig, RawServiceConfig, RawThresholds};
    use chrono::Weekday;

    fn empty_config() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            thresholds: RawThresholds::default(),
            schedule: vec![],
            email: RawEmailConfig::default(),
        }
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(&RawDays::Preset("weekdays".into())).unwrap().mask(), 0x1F);
        assert_eq!(parse_days(&RawDays::Preset("weekends".into())).unwrap().mask(), 0x60);
        assert_eq!(parse_days(&RawDays::Preset("all".into())).unwrap().mask(), 0x7F);

        let days = parse_days(&RawDays::List(vec!["mon".into(), "wed".into()])).unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(days.contains(Weekday::Wed));
        assert!(!days.contains(Weekday::Tue));

        assert!(parse_days(&RawDays::Preset("sometimes".into())).is_err());
    }

    #[test]
    fn test_duplicate_cohort_detection() {
        let mut config = empty_config();
        config.schedule = vec![
            RawCohortSchedule {
                cohort: "grade10".into(),
                days: RawDays::List(vec!["mon".into()]),
            },
            RawCohortSchedule {
                cohort: "Grade 10".into(),
                days: RawDays::List(vec!["tue".into()]),
            },
        ];

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateCohort(_))));
    }

    #[test]
    fn test_empty_days_and_unknown_cohort() {
        let mut config = empty_config();
        config.schedule = vec![
            RawCohortSchedule {
                cohort: "grade9".into(),
                days: RawDays::List(vec!["mon".into()]),
            },
            RawCohortSchedule {
                cohort: "grade11".into(),
                days: RawDays::List(vec![]),
            },
        ];

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_zero_thresholds_and_interval() {
        let mut config = empty_config();
        config.thresholds.ending_soon_days = Some(0);
        config.thresholds.course_length_months = Some(0);
        config.service.sweep_interval_seconds = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_sender_address() {
        let mut config = empty_config();
        config.email.from_address = Some("office@tutoring.example".into());
        assert!(validate_config(&config).is_empty());

        config.email.from_address = Some("not-an-address".into());
        let errors = validate_config(&config);
        assert!(matches!(errors[0], ValidationError::InvalidSender(_)));
    }
}

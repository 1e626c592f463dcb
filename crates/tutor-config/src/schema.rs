//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Temporal thresholds
    #[serde(default)]
    pub thresholds: RawThresholds,

    /// Per-cohort weekly schedule overrides
    #[serde(default)]
    pub schedule: Vec<RawCohortSchedule>,

    /// Email delivery settings
    #[serde(default)]
    pub email: RawEmailConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// How often the reminder sweep runs (default: daily)
    pub sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawThresholds {
    /// A course is "ending soon" this many days before its end date
    pub ending_soon_days: Option<u32>,

    /// An assignment is "due soon" this many days before its due time
    pub due_soon_days: Option<u32>,

    /// Calendar months between a course's start and end dates
    pub course_length_months: Option<u32>,
}

/// Weekly class days for one cohort
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawCohortSchedule {
    /// Cohort name, e.g. "grade10"
    pub cohort: String,

    /// Days of week: "weekdays", "weekends", "all", or list like ["mon", "wed"]
    pub days: RawDays,
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEmailConfig {
    /// Send emails alongside inbox notifications (default: true)
    pub enabled: Option<bool>,

    /// Sender address shown on outgoing mail
    pub from_address: Option<String>,
}

//! Shared utilities for tutord
//!
//! This crate provides:
//! - ID types (CourseId, RegistrationId, StudentId, ...)
//! - Time utilities (injectable clock, mock time, weekday masks, wall-clock times)
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;

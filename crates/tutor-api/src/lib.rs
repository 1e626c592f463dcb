//! Domain types for tutord
//!
//! This crate defines the vocabulary shared by the config, store and core
//! crates:
//! - Cohorts and time slots
//! - Course, registration, assignment and submission records
//! - Derived views (course state, assignment state)
//! - Notification events handed to the notification/email sinks

mod events;
mod types;

pub use events::*;
pub use types::*;

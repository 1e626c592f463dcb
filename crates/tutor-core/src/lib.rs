//! Course scheduling and enrollment workflows for tutord
//!
//! This crate is the heart of tutord, containing:
//! - Schedule rules and the course conflict checker
//! - Course, registration and assignment lifecycles
//! - Notification fan-out and delivery
//! - The periodic reminder sweep

mod assignment;
mod conflict;
mod course;
mod dispatch;
mod engine;
mod error;
mod registration;
mod schedule;
mod sweep;

pub use assignment::*;
pub use conflict::*;
pub use course::*;
pub use dispatch::*;
pub use engine::*;
pub use error::*;
pub use registration::*;
pub use schedule::*;
pub use sweep::*;

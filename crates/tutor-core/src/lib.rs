//! tutor-core — Adaptive tutoring engine, scheduling and grading.
//!
//! This crate defines the data model, the SM-2 scheduler, progress
//! tracking, the language-model grader adapter and the session state
//! machine that the rest of the tutor builds on.

pub mod clock;
pub mod content;
pub mod error;
pub mod fatigue;
pub mod grader;
pub mod hints;
pub mod model;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod traits;

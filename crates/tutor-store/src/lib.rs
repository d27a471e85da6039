//! tutor-store — SQLite persistence for the adaptive tutor.
//!
//! Provides [`SqliteBackend`], a [`tutor_core::store::ProgressBackend`]
//! that keeps one row per `(student, topic)` progress record and an
//! append-only table of finished session summaries.

pub mod sqlite;

pub use sqlite::SqliteBackend;

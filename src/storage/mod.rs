//! Persistent storage for scheduled jobs.
//!
//! This module provides:
//! - SQL schema definitions for the job tables
//! - A migration runner recording applied schema statements
//! - `JobStore`, the SQLite-backed job repository

pub mod job_store;
pub mod migrations;
pub mod schema;

pub use job_store::{JobStore, NewJob, StoreError};
pub use migrations::{MigrationError, MigrationRunner};

//! mdex-tracker - MangaDex update reconciliation service
//!
//! Tracks which titles each user follows and reconciles locally-stored
//! "last known update" watermarks against the MangaDex catalog through
//! scheduled background jobs, so reader-facing queries never have to hit
//! the catalog on every request.

// Module declarations
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod control;
pub mod utils;

#[cfg(test)]
pub mod test_utils;

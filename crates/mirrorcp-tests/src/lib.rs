//! mirrorcp integration testing support
//!
//! Shared helpers for the integration tests that exercise the pair model,
//! transfer engine and tree synchronizer together on real temporary
//! directories.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Tree builders, timestamp helpers and log setup used across the
/// integration tests.
pub mod test_utils;

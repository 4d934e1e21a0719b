//! Core type system and error handling for mirrorcp
//!
//! This crate provides the foundational types shared by every mirrorcp crate:
//!
//! - **Error handling**: the closed error taxonomy surfaced by transfers and runs
//! - **Core types**: attributes, pair classifications, per-item records and run statistics
//! - **Traits**: the progress observer and the cancellation contract
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use mirrorcp_types::{Classification, ProcessedInfo, Result, RunStatistics};
//!
//! fn example_operation() -> Result<RunStatistics> {
//!     let mut stats = RunStatistics::new();
//!     let info = ProcessedInfo::file(Classification::NewFile, "a.txt", 1024);
//!     stats.files.copied += 1;
//!     stats.bytes.copied += info.size_in_bytes;
//!     Ok(stats)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::*;
pub use types::*;

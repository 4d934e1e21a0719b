//! Selection evaluator and tree synchronizer for mirrorcp
//!
//! This crate turns the pair model and transfer engine of `mirrorcp-io` into a
//! directory mirroring run:
//!
//! - **Selection Evaluator**: [`CompiledRules`] and [`PairEvaluator`] classify
//!   every pair as new, newer, older, same, extra or excluded
//! - **Tree Synchronizer**: [`MirrorEngine`] walks the tree, transfers, purges
//!   and aggregates [`RunStatistics`](mirrorcp_types::RunStatistics)
//!
//! # Examples
//!
//! ```rust,no_run
//! use mirrorcp_config::{Config, MirrorOptions};
//! use mirrorcp_sync::MirrorEngine;
//!
//! # async fn example() -> mirrorcp_types::Result<()> {
//! let config = Config {
//!     mirror: MirrorOptions::mirror(),
//!     ..Config::default()
//! };
//! let engine = MirrorEngine::new(config)?;
//! let result = engine.run("source_dir", "backup_dir").await?;
//! println!(
//!     "Copied {} files, purged {}",
//!     result.statistics.files.copied, result.statistics.files.purged
//! );
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod selection;

pub use engine::{MirrorEngine, SyncResult};
pub use selection::{CompiledRules, DirectoryDecision, FileDecision, NameFilter, PairEvaluator};

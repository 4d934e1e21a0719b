//! Configuration management system for mirrorcp
//!
//! This crate supplies the immutable snapshot a mirroring run starts from:
//! selection rules, mirror/move modes, transfer tuning and logging settings.
//! Configuration can be layered from YAML, TOML or JSON files and environment
//! variables, and is validated before it is handed to the engine.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mirrorcp_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("mirrorcp.yaml")
//!     .add_env_prefix("MIRRORCP")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Mirror mode: {}", config.mirror.mirror);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use chrono::NaiveDate;
use mirrorcp_types::TransferStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for mirrorcp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which pairs are selected for copy or purge
    pub selection: SelectionRules,
    /// Mirror, purge and move modes
    pub mirror: MirrorOptions,
    /// Single-file transfer tuning
    pub transfer: TransferConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Selection rules applied to every pair of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRules {
    /// File name wildcards to include; empty means everything
    pub include_patterns: Vec<String>,
    /// File name wildcards to exclude
    pub exclude_file_patterns: Vec<String>,
    /// Directory name or path wildcards to exclude
    pub exclude_dir_patterns: Vec<String>,
    /// Only copy files carrying any of these attribute letters
    pub include_attributes: String,
    /// Skip files carrying any of these attribute letters
    pub exclude_attributes: String,
    /// Skip files larger than this many bytes
    pub max_file_size: Option<u64>,
    /// Skip files smaller than this many bytes
    pub min_file_size: Option<u64>,
    /// Skip files last written before this age (days if < 1900, else YYYYMMDD)
    pub max_file_age: Option<u64>,
    /// Skip files last written after this age (days if < 1900, else YYYYMMDD)
    pub min_file_age: Option<u64>,
    /// Skip files last accessed before this age (days if < 1900, else YYYYMMDD)
    pub max_last_access_date: Option<u64>,
    /// Skip files last accessed after this age (days if < 1900, else YYYYMMDD)
    pub min_last_access_date: Option<u64>,
    /// Skip files whose source is newer than the destination
    pub exclude_newer: bool,
    /// Skip files whose source is older than the destination
    pub exclude_older: bool,
    /// Treat destination-only entries as excluded from the destination
    pub exclude_extra: bool,
    /// Skip source-only entries
    pub exclude_lonely: bool,
    /// Copy files with identical timestamps
    pub include_same: bool,
    /// Skip directories that are junctions or symbolic links
    pub exclude_junction_dirs: bool,
    /// Never copy files whose source is a symbolic link
    pub exclude_symlink_files: bool,
    /// Maximum directory depth, the root being depth 1; 0 means unlimited
    pub max_depth: u32,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            include_patterns: vec!["*".to_string()],
            exclude_file_patterns: Vec::new(),
            exclude_dir_patterns: Vec::new(),
            include_attributes: String::new(),
            exclude_attributes: String::new(),
            max_file_size: None,
            min_file_size: None,
            max_file_age: None,
            min_file_age: None,
            max_last_access_date: None,
            min_last_access_date: None,
            exclude_newer: false,
            exclude_older: false,
            exclude_extra: false,
            exclude_lonely: false,
            include_same: false,
            exclude_junction_dirs: false,
            exclude_symlink_files: false,
            max_depth: 0,
        }
    }
}

/// Age limit as used by the age and last-access rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeLimit {
    /// A number of days before the run start
    Days(u32),
    /// A calendar date
    Date(NaiveDate),
}

impl AgeLimit {
    /// Interpret a raw value: below 1900 it counts days, otherwise it is a
    /// `YYYYMMDD` date. Returns `None` for an impossible date.
    pub fn parse(value: u64) -> Option<Self> {
        if value < 1900 {
            return Some(Self::Days(value as u32));
        }
        let year = i32::try_from(value / 10_000).ok()?;
        let month = ((value / 100) % 100) as u32;
        let day = (value % 100) as u32;
        NaiveDate::from_ymd_opt(year, month, day).map(Self::Date)
    }
}

/// Mirror, purge and move modes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorOptions {
    /// Make the destination match the source, deleting extras
    pub mirror: bool,
    /// Delete destination entries that no longer exist in the source
    pub purge: bool,
    /// Delete each source file after it was transferred
    pub move_files: bool,
    /// Move files and remove emptied source directories
    pub move_files_and_dirs: bool,
    /// Purge an extra directory with one recursive delete instead of per file
    pub quick_purge: bool,
    /// Move a whole new subtree with one rename when possible
    pub quick_move: bool,
    /// Evaluate and report only, never touch the filesystem
    pub list_only: bool,
    /// Create the directory tree but transfer no files
    pub create_tree_only: bool,
}

impl MirrorOptions {
    /// Options for a mirror run
    pub fn mirror() -> Self {
        Self {
            mirror: true,
            ..Self::default()
        }
    }

    /// Whether destination-only entries may be deleted
    pub fn purge_enabled(&self) -> bool {
        self.mirror || self.purge
    }

    /// Whether transferred source files are deleted afterwards
    pub fn moves_files(&self) -> bool {
        self.move_files || self.move_files_and_dirs
    }
}

/// Single-file transfer tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Transfer strategy
    pub strategy: TransferStrategy,
    /// Progress sampling interval in milliseconds (floor 25)
    pub progress_interval_ms: u64,
    /// Poll interval while paused in milliseconds
    pub pause_poll_interval_ms: u64,
    /// Chunk size for the buffered strategy and the native primitive
    pub buffer_size: usize,
    /// Copy last-write and last-access times onto the destination
    pub preserve_timestamps: bool,
}

impl TransferConfig {
    /// Lower bound for the progress sampling interval
    pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(25);

    /// Progress interval with the floor applied
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms).max(Self::MIN_PROGRESS_INTERVAL)
    }

    /// Poll interval while paused
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_interval_ms.max(1))
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            strategy: TransferStrategy::Native,
            progress_interval_ms: 100,
            pause_poll_interval_ms: 100,
            buffer_size: 1024 * 1024, // 1MB
            preserve_timestamps: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_selection_matches_everything() {
        let rules = SelectionRules::default();
        assert_eq!(rules.include_patterns, vec!["*".to_string()]);
        assert!(!rules.include_same);
        assert_eq!(rules.max_depth, 0);
    }

    #[rstest]
    #[case(0, Some(AgeLimit::Days(0)))]
    #[case(30, Some(AgeLimit::Days(30)))]
    #[case(1899, Some(AgeLimit::Days(1899)))]
    #[case(20240131, NaiveDate::from_ymd_opt(2024, 1, 31).map(AgeLimit::Date))]
    #[case(20240231, None)]
    fn test_age_limit_parse(#[case] value: u64, #[case] expected: Option<AgeLimit>) {
        assert_eq!(AgeLimit::parse(value), expected);
    }

    #[test]
    fn test_mirror_options() {
        let mirror = MirrorOptions::mirror();
        assert!(mirror.purge_enabled());
        assert!(!mirror.moves_files());

        let moving = MirrorOptions {
            move_files_and_dirs: true,
            ..MirrorOptions::default()
        };
        assert!(moving.moves_files());
        assert!(!moving.purge_enabled());
    }

    #[test]
    fn test_progress_interval_floor() {
        let config = TransferConfig {
            progress_interval_ms: 5,
            ..TransferConfig::default()
        };
        assert_eq!(config.progress_interval(), Duration::from_millis(25));
        assert_eq!(
            TransferConfig::default().progress_interval(),
            Duration::from_millis(100)
        );
    }
}

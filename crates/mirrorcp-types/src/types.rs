//! Core data types for mirrorcp
//!
//! This module provides the value types shared by the evaluator, the transfer
//! engine and the synchronizer: entry attributes, pair classifications, the
//! per-item [`ProcessedInfo`] record and the run-level [`RunStatistics`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::time::Duration;

/// Unique identifier for runs and transfer sessions
pub type OperationId = uuid::Uuid;

/// Attribute bitset reported by the metadata provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileAttributes(u32);

impl FileAttributes {
    /// No attributes
    pub const NONE: Self = Self(0);
    /// Read-only entry
    pub const READ_ONLY: Self = Self(0x0001);
    /// Hidden entry
    pub const HIDDEN: Self = Self(0x0002);
    /// System entry
    pub const SYSTEM: Self = Self(0x0004);
    /// Directory
    pub const DIRECTORY: Self = Self(0x0010);
    /// Archive bit set
    pub const ARCHIVE: Self = Self(0x0020);
    /// Temporary entry
    pub const TEMPORARY: Self = Self(0x0100);
    /// Reparse point (symbolic link or junction)
    pub const REPARSE_POINT: Self = Self(0x0400);
    /// Compressed entry
    pub const COMPRESSED: Self = Self(0x0800);
    /// Content is offline
    pub const OFFLINE: Self = Self(0x1000);
    /// Not content indexed
    pub const NOT_CONTENT_INDEXED: Self = Self(0x2000);
    /// Encrypted entry
    pub const ENCRYPTED: Self = Self(0x4000);

    /// Letter codes accepted by [`FileAttributes::from_letters`]
    pub const LETTERS: &'static str = "RASHCNETODJ";

    /// Build from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether at least one bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Parse attribute letters (`R`ead-only, `A`rchive, `S`ystem, `H`idden,
    /// `C`ompressed, `N`ot indexed, `E`ncrypted, `T`emporary, `O`ffline,
    /// `D`irectory, `J` reparse point). Returns `None` on an unknown letter.
    pub fn from_letters(letters: &str) -> Option<Self> {
        let mut attributes = Self::NONE;
        for letter in letters.chars().filter(|c| !c.is_whitespace()) {
            attributes |= match letter.to_ascii_uppercase() {
                'R' => Self::READ_ONLY,
                'A' => Self::ARCHIVE,
                'S' => Self::SYSTEM,
                'H' => Self::HIDDEN,
                'C' => Self::COMPRESSED,
                'N' => Self::NOT_CONTENT_INDEXED,
                'E' => Self::ENCRYPTED,
                'T' => Self::TEMPORARY,
                'O' => Self::OFFLINE,
                'D' => Self::DIRECTORY,
                'J' => Self::REPARSE_POINT,
                _ => return None,
            };
        }
        Some(attributes)
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FileAttributes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Kind of filesystem entry a pair refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Outcome of evaluating a pair against the selection rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Classification {
    /// Source only
    NewFile,
    /// Source is newer than the destination
    NewerFile,
    /// Destination is newer than the source
    OlderFile,
    /// Same timestamp on both sides
    SameFile,
    /// Destination only
    ExtraFile,
    /// Source-only file while lonely files are excluded
    LonelyExclusion,
    /// Newer source while newer files are excluded
    NewerExclusion,
    /// Older source while older files are excluded
    OlderExclusion,
    /// Larger than the maximum size
    MaxSizeExclusion,
    /// Smaller than the minimum size
    MinSizeExclusion,
    /// Rejected by the include or exclude attribute masks
    AttributeExclusion,
    /// Older than the maximum age
    MaxAgeExclusion,
    /// Younger than the minimum age
    MinAgeExclusion,
    /// Last accessed before the maximum last-access cutoff
    MaxLastAccessExclusion,
    /// Last accessed after the minimum last-access cutoff
    MinLastAccessExclusion,
    /// Rejected by a file name pattern
    FileExclusion,
    /// Source only directory
    NewDir,
    /// Directory present on both sides
    ExistingDir,
    /// Destination only directory
    ExtraDir,
    /// Directory rejected by name, junction or lonely/extra rules
    DirExclusion,
}

impl Classification {
    /// Short label in the style of mirroring tool logs
    pub fn label(self) -> &'static str {
        match self {
            Self::NewFile => "New File",
            Self::NewerFile => "Newer",
            Self::OlderFile => "Older",
            Self::SameFile => "Same",
            Self::ExtraFile => "*EXTRA File",
            Self::LonelyExclusion => "lonely",
            Self::NewerExclusion => "newer",
            Self::OlderExclusion => "older",
            Self::MaxSizeExclusion => "large",
            Self::MinSizeExclusion => "small",
            Self::AttributeExclusion => "attrib",
            Self::MaxAgeExclusion => "too old",
            Self::MinAgeExclusion => "too new",
            Self::MaxLastAccessExclusion => "not accessed",
            Self::MinLastAccessExclusion => "recently accessed",
            Self::FileExclusion => "named",
            Self::NewDir => "New Dir",
            Self::ExistingDir => "Dir",
            Self::ExtraDir => "*EXTRA Dir",
            Self::DirExclusion => "named dir",
        }
    }

    /// Whether the classification comes from an exclusion rule
    pub fn is_exclusion(self) -> bool {
        !matches!(
            self,
            Self::NewFile
                | Self::NewerFile
                | Self::OlderFile
                | Self::SameFile
                | Self::ExtraFile
                | Self::NewDir
                | Self::ExistingDir
                | Self::ExtraDir
        )
    }

    /// Whether the classification applies to directories
    pub fn is_directory(self) -> bool {
        matches!(
            self,
            Self::NewDir | Self::ExistingDir | Self::ExtraDir | Self::DirExclusion
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-item record raised for every evaluated pair
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessedInfo {
    /// Classification assigned by the evaluator
    pub classification: Classification,
    /// File or directory
    pub kind: EntryKind,
    /// Name shown to subscribers (file name, or full path for directories)
    pub display_name: String,
    /// Size in bytes (0 for directories)
    pub size_in_bytes: u64,
}

impl ProcessedInfo {
    /// Create a record for a file
    pub fn file(classification: Classification, display_name: impl Into<String>, size: u64) -> Self {
        Self {
            classification,
            kind: EntryKind::File,
            display_name: display_name.into(),
            size_in_bytes: size,
        }
    }

    /// Create a record for a directory
    pub fn directory(classification: Classification, display_name: impl Into<String>) -> Self {
        Self {
            classification,
            kind: EntryKind::Directory,
            display_name: display_name.into(),
            size_in_bytes: 0,
        }
    }
}

/// Counters for one statistic row (files, directories or bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistic {
    /// Entries considered
    pub total: u64,
    /// Entries copied or created
    pub copied: u64,
    /// Entries evaluated and left alone
    pub skipped: u64,
    /// Destination-only entries
    pub extras: u64,
    /// Entries whose transfer or purge failed
    pub failed: u64,
    /// Destination-only entries deleted
    pub purged: u64,
}

impl Statistic {
    /// Merge counters from another row
    pub fn merge(&mut self, other: &Statistic) {
        self.total += other.total;
        self.copied += other.copied;
        self.skipped += other.skipped;
        self.extras += other.extras;
        self.failed += other.failed;
        self.purged += other.purged;
    }
}

/// Statistics accumulated by a single synchronization run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStatistics {
    /// File counters
    pub files: Statistic,
    /// Directory counters
    pub directories: Statistic,
    /// Byte counters
    pub bytes: Statistic,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl RunStatistics {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the copy rate in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes.copied as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &RunStatistics) {
        self.files.merge(&other.files);
        self.directories.merge(&other.directories);
        self.bytes.merge(&other.bytes);
        self.duration += other.duration;
    }

    /// Whether any item failed
    pub fn has_failures(&self) -> bool {
        self.files.failed + self.directories.failed > 0
    }
}

/// Interchangeable single-file transfer strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransferStrategy {
    /// OS copy primitive with progress callbacks; supports pause and resume,
    /// keeps the partial destination on cancel for restart
    #[default]
    Native,
    /// Buffered read/write loop; deletes the partial destination on cancel
    Buffered,
}

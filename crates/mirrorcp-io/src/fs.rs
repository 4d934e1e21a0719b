//! Filesystem metadata provider
//!
//! The pair model and the synchronizer never call `std::fs` directly for
//! metadata; they go through a [`FileSystem`] so that evaluation and tree walks
//! can run against an in-memory tree in tests. Queries are synchronous and
//! reflect the filesystem at call time, so re-querying after a transfer is the
//! refresh.

use mirrorcp_types::{EntryKind, FileAttributes};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;
use tracing::debug;

/// Metadata snapshot for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    /// File or directory
    pub kind: EntryKind,
    /// Length in bytes (0 for directories)
    pub len: u64,
    /// Last write time
    pub modified: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
    /// Attribute bitset
    pub attributes: FileAttributes,
    /// Whether the entry itself is a symbolic link or junction
    pub is_symlink: bool,
}

impl EntryMetadata {
    /// Metadata for a regular file
    pub fn file(len: u64, modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::File,
            len,
            modified,
            accessed: modified,
            attributes: FileAttributes::ARCHIVE,
            is_symlink: false,
        }
    }

    /// Metadata for a directory
    pub fn directory(modified: SystemTime) -> Self {
        Self {
            kind: EntryKind::Directory,
            len: 0,
            modified,
            accessed: modified,
            attributes: FileAttributes::DIRECTORY,
            is_symlink: false,
        }
    }

    /// Whether this is a directory
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Whether this is a file
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One child returned by [`FileSystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the child
    pub path: PathBuf,
    /// File or directory (symbolic links are resolved)
    pub kind: EntryKind,
}

/// Synchronous metadata provider
pub trait FileSystem: Send + Sync {
    /// Metadata for `path`, or `None` when it does not exist
    fn metadata(&self, path: &Path) -> Option<EntryMetadata>;

    /// Children of a directory, sorted by path
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Whether `path` exists
    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_some()
    }
}

/// Metadata provider backed by the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a new provider
    pub fn new() -> Self {
        Self
    }

    fn attributes(path: &Path, metadata: &std::fs::Metadata, is_symlink: bool) -> FileAttributes {
        #[cfg(windows)]
        let mut attributes = {
            use std::os::windows::fs::MetadataExt;
            FileAttributes::from_bits(metadata.file_attributes())
        };
        #[cfg(not(windows))]
        let mut attributes = {
            let mut attributes = FileAttributes::NONE;
            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with('.'))
            {
                attributes |= FileAttributes::HIDDEN;
            }
            if metadata.is_file() {
                attributes |= FileAttributes::ARCHIVE;
            }
            attributes
        };

        if metadata.permissions().readonly() {
            attributes |= FileAttributes::READ_ONLY;
        }
        if metadata.is_dir() {
            attributes |= FileAttributes::DIRECTORY;
        }
        if is_symlink {
            attributes |= FileAttributes::REPARSE_POINT;
        }
        #[cfg(windows)]
        let _ = path;
        attributes
    }
}

impl FileSystem for LocalFileSystem {
    fn metadata(&self, path: &Path) -> Option<EntryMetadata> {
        let link = std::fs::symlink_metadata(path).ok()?;
        let is_symlink = link.file_type().is_symlink();
        let metadata = if is_symlink {
            // Dangling links count as missing
            std::fs::metadata(path).ok()?
        } else {
            link
        };

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Some(EntryMetadata {
            kind,
            len: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
            accessed: metadata.accessed().unwrap_or(modified),
            attributes: Self::attributes(path, &metadata, is_symlink),
            is_symlink,
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let is_dir = if file_type.is_symlink() {
                match std::fs::metadata(entry.path()) {
                    Ok(target) => target.is_dir(),
                    Err(e) => {
                        debug!("Skipping dangling link {}: {}", entry.path().display(), e);
                        continue;
                    }
                }
            } else {
                file_type.is_dir()
            };
            entries.push(DirEntry {
                path: entry.path(),
                kind: if is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// In-memory metadata provider for tests and embedders
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    entries: RwLock<BTreeMap<PathBuf, EntryMetadata>>,
}

impl MemoryFileSystem {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, creating missing parent directories
    pub fn add_file(&self, path: impl AsRef<Path>, len: u64, modified: SystemTime) {
        self.insert(path.as_ref(), EntryMetadata::file(len, modified));
    }

    /// Insert a directory, creating missing parent directories
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), EntryMetadata::directory(SystemTime::UNIX_EPOCH));
    }

    /// Insert an entry with explicit metadata, creating missing parents
    pub fn insert(&self, path: &Path, metadata: EntryMetadata) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            entries
                .entry(ancestor.to_path_buf())
                .or_insert_with(|| EntryMetadata::directory(SystemTime::UNIX_EPOCH));
        }
        entries.insert(path.to_path_buf(), metadata);
    }

    /// Remove an entry and everything below it
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|candidate, _| !candidate.starts_with(path));
    }
}

impl FileSystem for MemoryFileSystem {
    fn metadata(&self, path: &Path) -> Option<EntryMetadata> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(path) {
            Some(metadata) if metadata.is_dir() => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", path.display()),
                ))
            }
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                ))
            }
        }

        Ok(entries
            .iter()
            .filter(|(candidate, _)| candidate.parent() == Some(path))
            .map(|(candidate, metadata)| DirEntry {
                path: candidate.clone(),
                kind: metadata.kind,
            })
            .collect())
    }
}

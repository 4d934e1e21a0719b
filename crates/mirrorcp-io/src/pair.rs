//! Source/destination pair model
//!
//! A [`FilePair`] binds one source path to one destination path. A
//! [`DirectoryPair`] does the same for directories and additionally exposes its
//! children as memoized [`CachedSequence`]s, listing whichever sides exist and
//! deriving the missing side's path from the parent pair.

use crate::fs::{DirEntry, EntryMetadata, FileSystem};
use crate::sequence::CachedSequence;
use mirrorcp_types::{EntryKind, Error, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{trace, warn};

/// Immutable association of a source file and its destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePair {
    source: PathBuf,
    destination: PathBuf,
}

impl FilePair {
    /// Create a pair, rejecting empty paths
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Self> {
        let (source, destination) = validate_paths(source.into(), destination.into())?;
        Ok(Self {
            source,
            destination,
        })
    }

    /// Source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination path
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// File name used for display and name filters
    pub fn name(&self) -> String {
        display_name(&self.source, &self.destination)
    }

    /// Whether both paths share the same root
    pub fn is_on_same_volume(&self) -> bool {
        is_on_same_volume(&self.source, &self.destination)
    }

    /// Query both sides
    pub fn state(&self, fs: &dyn FileSystem) -> PairState {
        PairState::query(fs, &self.source, &self.destination)
    }
}

impl fmt::Display for FilePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.destination.display())
    }
}

/// Metadata of both sides of a pair at query time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairState {
    /// Source metadata, `None` when missing
    pub source: Option<EntryMetadata>,
    /// Destination metadata, `None` when missing
    pub destination: Option<EntryMetadata>,
}

impl PairState {
    /// Query both sides from a metadata provider
    pub fn query(fs: &dyn FileSystem, source: &Path, destination: &Path) -> Self {
        Self {
            source: fs.metadata(source),
            destination: fs.metadata(destination),
        }
    }

    /// Source exists
    pub fn source_exists(&self) -> bool {
        self.source.is_some()
    }

    /// Destination exists
    pub fn destination_exists(&self) -> bool {
        self.destination.is_some()
    }

    /// Both sides exist
    pub fn exists_both(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }

    /// Destination exists and source does not
    pub fn is_extra(&self) -> bool {
        self.source.is_none() && self.destination.is_some()
    }

    /// Source exists and destination does not
    pub fn is_lonely(&self) -> bool {
        self.source.is_some() && self.destination.is_none()
    }

    /// Source was written after the destination; false when either is missing
    pub fn is_source_newer(&self) -> bool {
        match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => source.modified > destination.modified,
            _ => false,
        }
    }

    /// Destination was written after the source; false when either is missing
    pub fn is_destination_newer(&self) -> bool {
        match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => destination.modified > source.modified,
            _ => false,
        }
    }

    /// Both exist with identical last-write times
    pub fn is_same_timestamp(&self) -> bool {
        match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => source.modified == destination.modified,
            _ => false,
        }
    }
}

/// Directory pair with lazily enumerated, memoized children
pub struct DirectoryPair {
    source: PathBuf,
    destination: PathBuf,
    fs: Arc<dyn FileSystem>,
    files: OnceLock<Arc<CachedSequence<FilePair>>>,
    directories: OnceLock<Arc<CachedSequence<DirectoryPair>>>,
}

impl DirectoryPair {
    /// Create a pair, rejecting empty paths
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let (source, destination) = validate_paths(source.into(), destination.into())?;
        Ok(Self::from_parts(source, destination, fs))
    }

    fn from_parts(source: PathBuf, destination: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            source,
            destination,
            fs,
            files: OnceLock::new(),
            directories: OnceLock::new(),
        }
    }

    /// Source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination path
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Directory name used for display and name filters
    pub fn name(&self) -> String {
        display_name(&self.source, &self.destination)
    }

    /// Whether both paths share the same root
    pub fn is_on_same_volume(&self) -> bool {
        is_on_same_volume(&self.source, &self.destination)
    }

    /// The metadata provider children are listed through
    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Query both sides
    pub fn state(&self) -> PairState {
        PairState::query(self.fs.as_ref(), &self.source, &self.destination)
    }

    /// Child file pairs, listed once per instance
    pub fn child_file_pairs(&self) -> Arc<CachedSequence<FilePair>> {
        Arc::clone(self.files.get_or_init(|| {
            if !self.any_side_exists() {
                return empty_file_pairs();
            }
            let fs = Arc::clone(&self.fs);
            let source = self.source.clone();
            let destination = self.destination.clone();
            Arc::new(CachedSequence::new(
                std::iter::once(()).flat_map(move |()| {
                    child_paths(fs.as_ref(), &source, &destination, EntryKind::File)
                        .into_iter()
                        .map(|(source, destination)| FilePair {
                            source,
                            destination,
                        })
                }),
            ))
        }))
    }

    /// Child directory pairs, listed once per instance
    pub fn child_directory_pairs(&self) -> Arc<CachedSequence<DirectoryPair>> {
        Arc::clone(self.directories.get_or_init(|| {
            if !self.any_side_exists() {
                return empty_directory_pairs();
            }
            let fs = Arc::clone(&self.fs);
            let source = self.source.clone();
            let destination = self.destination.clone();
            Arc::new(CachedSequence::new(
                std::iter::once(()).flat_map(move |()| {
                    let children =
                        child_paths(fs.as_ref(), &source, &destination, EntryKind::Directory);
                    let fs = Arc::clone(&fs);
                    children.into_iter().map(move |(source, destination)| {
                        DirectoryPair::from_parts(source, destination, Arc::clone(&fs))
                    })
                }),
            ))
        }))
    }

    /// Drop memoized children so the next access lists the filesystem again
    pub fn refresh(&mut self) {
        self.files.take();
        self.directories.take();
    }

    fn any_side_exists(&self) -> bool {
        self.fs.exists(&self.source) || self.fs.exists(&self.destination)
    }
}

impl Clone for DirectoryPair {
    /// Clones share the metadata provider but start with fresh children
    fn clone(&self) -> Self {
        Self::from_parts(
            self.source.clone(),
            self.destination.clone(),
            Arc::clone(&self.fs),
        )
    }
}

impl PartialEq for DirectoryPair {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.destination == other.destination
    }
}

impl Eq for DirectoryPair {}

impl fmt::Debug for DirectoryPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryPair")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("files_listed", &self.files.get().is_some())
            .field("directories_listed", &self.directories.get().is_some())
            .finish()
    }
}

fn empty_file_pairs() -> Arc<CachedSequence<FilePair>> {
    static EMPTY: OnceLock<Arc<CachedSequence<FilePair>>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(CachedSequence::empty())))
}

fn empty_directory_pairs() -> Arc<CachedSequence<DirectoryPair>> {
    static EMPTY: OnceLock<Arc<CachedSequence<DirectoryPair>>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(CachedSequence::empty())))
}

fn validate_paths(source: PathBuf, destination: PathBuf) -> Result<(PathBuf, PathBuf)> {
    if source.as_os_str().is_empty() {
        return Err(Error::invalid_argument("Source path must not be empty"));
    }
    if destination.as_os_str().is_empty() {
        return Err(Error::invalid_argument("Destination path must not be empty"));
    }
    Ok((source, destination))
}

fn display_name(source: &Path, destination: &Path) -> String {
    source
        .file_name()
        .or_else(|| destination.file_name())
        .map_or_else(
            || source.to_string_lossy().into_owned(),
            |name| name.to_string_lossy().into_owned(),
        )
}

/// Root component of a path: drive or share prefix, `/`, or `None` if relative
fn volume_root(path: &Path) -> Option<OsString> {
    match path.components().next()? {
        Component::Prefix(prefix) => Some(prefix.as_os_str().to_ascii_lowercase()),
        Component::RootDir => Some(OsString::from(std::path::MAIN_SEPARATOR_STR)),
        _ => None,
    }
}

/// Whether two paths share the same root prefix
pub fn is_on_same_volume(a: &Path, b: &Path) -> bool {
    volume_root(a) == volume_root(b)
}

fn list(fs: &dyn FileSystem, directory: &Path, kind: EntryKind) -> Vec<DirEntry> {
    if !fs.exists(directory) {
        return Vec::new();
    }
    match fs.read_dir(directory) {
        Ok(entries) => entries.into_iter().filter(|e| e.kind == kind).collect(),
        Err(e) => {
            warn!("Failed to list {}: {}", directory.display(), e);
            Vec::new()
        }
    }
}

/// Source-side children first, then destination-only children not already
/// paired by destination path
fn child_paths(
    fs: &dyn FileSystem,
    source: &Path,
    destination: &Path,
    kind: EntryKind,
) -> Vec<(PathBuf, PathBuf)> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    for entry in list(fs, source, kind) {
        let relative = entry
            .path
            .strip_prefix(source)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path.file_name().map(PathBuf::from).unwrap_or_default());
        let target = destination.join(relative);
        seen.insert(target.clone());
        pairs.push((entry.path, target));
    }

    for entry in list(fs, destination, kind) {
        if seen.contains(&entry.path) {
            continue;
        }
        let relative = entry
            .path
            .strip_prefix(destination)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path.file_name().map(PathBuf::from).unwrap_or_default());
        pairs.push((source.join(relative), entry.path));
    }

    trace!(
        "Listed {} {:?} pairs under {}",
        pairs.len(),
        kind,
        source.display()
    );
    pairs
}

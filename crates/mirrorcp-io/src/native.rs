//! Native copy primitive
//!
//! The transfer engine reaches the platform copy facility through the
//! [`NativeCopy`] capability: a blocking call that reports `(total,
//! transferred)` to an optional callback and obeys the callback's answer.
//! [`StdNativeCopy`] is the bundled implementation on top of `std::io::copy`,
//! which uses kernel copy offload where the platform has it.
//!
//! Failures come back as raw OS codes tagged with the [`Side`] they happened
//! on; [`map_native_code`] folds them into the closed error taxonomy.

use mirrorcp_types::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// End of a transfer an operation failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reading or removing the source
    Source,
    /// Creating or writing the destination
    Destination,
}

impl Side {
    /// The path on this side of a transfer
    pub fn path<'a>(self, source: &'a Path, destination: &'a Path) -> &'a Path {
        match self {
            Self::Source => source,
            Self::Destination => destination,
        }
    }
}

/// Callback answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// Keep copying
    Continue,
    /// Abort; the partial destination is left for a restart
    Cancel,
    /// Stop now and expect to be re-issued with `restartable`
    Stop,
}

/// Result of one primitive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    /// All bytes were written
    Completed,
    /// The callback answered [`ProgressAction::Stop`]
    Stopped,
    /// The callback answered [`ProgressAction::Cancel`]
    Cancelled,
    /// The platform reported an error code
    Failed {
        /// Raw OS code
        code: i32,
        /// Side the code was raised on
        side: Side,
    },
}

/// Options for one primitive call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCopyOptions {
    /// Resume from the bytes already present in the destination
    pub restartable: bool,
    /// Fail instead of truncating an existing destination
    pub fail_if_exists: bool,
    /// Bytes copied between callbacks
    pub chunk_size: usize,
}

impl Default for NativeCopyOptions {
    fn default() -> Self {
        Self {
            restartable: false,
            fail_if_exists: false,
            chunk_size: 1024 * 1024,
        }
    }
}

/// Progress callback receiving `(total, transferred)`
pub type ProgressCallback<'a> = dyn FnMut(u64, u64) -> ProgressAction + Send + 'a;

/// Platform copy facility with progress reporting
pub trait NativeCopy: Send + Sync {
    /// Copy `source` onto `destination`, calling `progress` between chunks
    fn copy_with_progress(
        &self,
        source: &Path,
        destination: &Path,
        options: &NativeCopyOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> NativeStatus;

    /// Move across volumes; the source is only removed after a complete copy
    fn move_with_progress(
        &self,
        source: &Path,
        destination: &Path,
        options: &NativeCopyOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> NativeStatus {
        match self.copy_with_progress(source, destination, options, progress) {
            NativeStatus::Completed => match std::fs::remove_file(source) {
                Ok(()) => NativeStatus::Completed,
                Err(e) => NativeStatus::Failed {
                    code: raw_code(&e),
                    side: Side::Source,
                },
            },
            other => other,
        }
    }
}

type Failure = (Side, io::Error);

fn at(side: Side) -> impl FnOnce(io::Error) -> Failure {
    move |e| (side, e)
}

/// [`NativeCopy`] implemented with the standard library
#[derive(Debug, Default, Clone, Copy)]
pub struct StdNativeCopy;

impl StdNativeCopy {
    /// Create the primitive
    pub fn new() -> Self {
        Self
    }

    fn run(
        source: &Path,
        destination: &Path,
        options: &NativeCopyOptions,
        mut progress: Option<&mut ProgressCallback<'_>>,
    ) -> std::result::Result<NativeStatus, Failure> {
        let mut input = File::open(source).map_err(at(Side::Source))?;
        let total = input.metadata().map_err(at(Side::Source))?.len();

        let opened = if options.restartable {
            OpenOptions::new().write(true).create(true).open(destination)
        } else if options.fail_if_exists {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(destination)
        } else {
            File::create(destination)
        };
        let mut output = opened.map_err(at(Side::Destination))?;

        let mut transferred = 0;
        if options.restartable {
            transferred = output
                .metadata()
                .map_err(at(Side::Destination))?
                .len()
                .min(total);
            output.set_len(transferred).map_err(at(Side::Destination))?;
            output
                .seek(SeekFrom::Start(transferred))
                .map_err(at(Side::Destination))?;
            input
                .seek(SeekFrom::Start(transferred))
                .map_err(at(Side::Source))?;
        }

        if let Some(callback) = progress.as_deref_mut() {
            match callback(total, transferred) {
                ProgressAction::Continue => {}
                ProgressAction::Cancel if transferred < total => return Ok(NativeStatus::Cancelled),
                ProgressAction::Stop if transferred < total => return Ok(NativeStatus::Stopped),
                _ => {}
            }
        }

        let chunk = options.chunk_size.max(1) as u64;
        while transferred < total {
            // Mid-copy failures are charged to the write side
            let copied = io::copy(&mut Read::by_ref(&mut input).take(chunk), &mut output)
                .map_err(at(Side::Destination))?;
            if copied == 0 {
                // Source shrank underneath us
                break;
            }
            transferred += copied;

            if let Some(callback) = progress.as_deref_mut() {
                // Answers after the last chunk are ignored; the copy is done
                match callback(total, transferred) {
                    ProgressAction::Cancel if transferred < total => {
                        output.flush().map_err(at(Side::Destination))?;
                        return Ok(NativeStatus::Cancelled);
                    }
                    ProgressAction::Stop if transferred < total => {
                        output.flush().map_err(at(Side::Destination))?;
                        return Ok(NativeStatus::Stopped);
                    }
                    _ => {}
                }
            }
        }

        output.flush().map_err(at(Side::Destination))?;
        Ok(NativeStatus::Completed)
    }
}

impl NativeCopy for StdNativeCopy {
    fn copy_with_progress(
        &self,
        source: &Path,
        destination: &Path,
        options: &NativeCopyOptions,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> NativeStatus {
        Self::run(source, destination, options, progress).unwrap_or_else(|(side, e)| {
            NativeStatus::Failed {
                code: raw_code(&e),
                side,
            }
        })
    }
}

/// Raw OS code of an I/O error, `-1` when there is none
pub fn raw_code(error: &io::Error) -> i32 {
    error.raw_os_error().unwrap_or(-1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeKind {
    SourceNotFound,
    DestinationExists,
    InsufficientSpace,
    AccessDenied,
    DeviceNotReady,
    Cancelled,
}

#[cfg(unix)]
fn classify(code: i32) -> Option<NativeKind> {
    match code {
        libc::ENOENT => Some(NativeKind::SourceNotFound),
        libc::EEXIST => Some(NativeKind::DestinationExists),
        libc::ENOSPC | libc::EDQUOT => Some(NativeKind::InsufficientSpace),
        libc::EACCES | libc::EPERM | libc::EROFS => Some(NativeKind::AccessDenied),
        libc::ENXIO | libc::ENODEV => Some(NativeKind::DeviceNotReady),
        libc::ECANCELED => Some(NativeKind::Cancelled),
        _ => None,
    }
}

#[cfg(windows)]
fn classify(code: i32) -> Option<NativeKind> {
    // ERROR_* values from winerror.h
    match code {
        2 | 3 => Some(NativeKind::SourceNotFound),
        80 | 183 => Some(NativeKind::DestinationExists),
        39 | 112 => Some(NativeKind::InsufficientSpace),
        5 | 32 | 33 => Some(NativeKind::AccessDenied),
        21 => Some(NativeKind::DeviceNotReady),
        1235 => Some(NativeKind::Cancelled),
        _ => None,
    }
}

#[cfg(not(any(unix, windows)))]
fn classify(_code: i32) -> Option<NativeKind> {
    None
}

/// Fold a raw native code raised on `side` into the error taxonomy, keeping
/// unknown codes
///
/// A missing entry on the destination side (usually its parent directory)
/// has no taxonomy entry and keeps its raw code.
pub fn map_native_code(code: i32, side: Side, source: &Path, destination: &Path) -> Error {
    let path = side.path(source, destination).to_path_buf();
    match classify(code) {
        Some(NativeKind::SourceNotFound) if side == Side::Source => Error::SourceNotFound { path },
        Some(NativeKind::DestinationExists) => Error::DestinationExists {
            path: destination.to_path_buf(),
        },
        Some(NativeKind::InsufficientSpace) => Error::InsufficientSpace {
            path: destination.to_path_buf(),
        },
        Some(NativeKind::AccessDenied) => Error::AccessDenied { path },
        Some(NativeKind::DeviceNotReady) => Error::DeviceNotReady { path },
        Some(NativeKind::Cancelled) => Error::Cancelled,
        Some(NativeKind::SourceNotFound) | None => Error::native(code, source, destination),
    }
}

/// Map an I/O error raised on `side` while transferring `source` to
/// `destination`
pub fn map_io_error(error: &io::Error, side: Side, source: &Path, destination: &Path) -> Error {
    if let Some(code) = error.raw_os_error() {
        return map_native_code(code, side, source, destination);
    }
    let path = side.path(source, destination).to_path_buf();
    match error.kind() {
        io::ErrorKind::NotFound if side == Side::Source => Error::SourceNotFound { path },
        io::ErrorKind::AlreadyExists => Error::DestinationExists {
            path: destination.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => Error::AccessDenied { path },
        _ => Error::native(-1, source, destination),
    }
}

/// Whether a rename failed because the paths are on different devices
pub fn is_cross_device(error: &io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(windows)]
    {
        // ERROR_NOT_SAME_DEVICE
        error.raw_os_error() == Some(17)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = error;
        false
    }
}

//! Pair model, caching tree walker and single-file transfer engine for mirrorcp
//!
//! This crate holds everything below the mirroring decision logic:
//!
//! - **Metadata provider**: [`FileSystem`] with a real and an in-memory backend
//! - **Pair model**: [`FilePair`] and [`DirectoryPair`] binding source to destination
//! - **Cached sequence**: [`CachedSequence`], the memoizing child enumerator
//! - **Native primitive**: [`NativeCopy`] and the bundled [`StdNativeCopy`]
//! - **Transfer engine**: [`TransferEngine`] with buffered and native strategies
//!
//! # Examples
//!
//! ```rust,no_run
//! use mirrorcp_io::{FilePair, TransferEngine, TransferOptions};
//!
//! # async fn example() -> mirrorcp_types::Result<()> {
//! let engine = TransferEngine::new(TransferOptions::default());
//! let pair = FilePair::new("source.txt", "backup/source.txt")?;
//! let outcome = engine.copy(&pair, true).await?;
//! println!("Copied {} bytes", outcome.bytes());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod fs;
pub mod native;
pub mod pair;
pub mod sequence;
pub mod session;
pub mod stream;
pub mod transfer;

pub use fs::{DirEntry, EntryMetadata, FileSystem, LocalFileSystem, MemoryFileSystem};
pub use native::{
    map_io_error, map_native_code, NativeCopy, NativeCopyOptions, NativeStatus, ProgressAction,
    ProgressCallback, Side, StdNativeCopy,
};
pub use pair::{is_on_same_volume, DirectoryPair, FilePair, PairState};
pub use sequence::CachedSequence;
pub use session::{TransferSession, TransferState};
pub use stream::StreamOutcome;
pub use transfer::{TransferEngine, TransferEvent, TransferOptions, TransferOutcome};

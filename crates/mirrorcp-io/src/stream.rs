//! Buffered stream strategy
//!
//! Reads and writes through a fixed buffer on the async runtime. Cancellation
//! is observed between chunks while bytes remain; a transfer whose last chunk
//! has been written completes even if cancellation arrives afterwards. A
//! transfer cancelled or failed after the destination was created removes the
//! partial destination; failures before that leave it untouched.

use crate::native::{map_io_error, Side};
use mirrorcp_types::Result;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Smallest buffer the stream copy will use
pub const MIN_BUFFER_SIZE: usize = 4096;

/// How a stream copy ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every byte was written
    Completed(u64),
    /// Cancelled before the last chunk; the destination was removed
    Cancelled,
}

/// Copy `source` to `destination`, reporting the running byte count after
/// every chunk
pub async fn stream_copy(
    source: &Path,
    destination: &Path,
    buffer_size: usize,
    cancel: &CancellationToken,
    on_progress: &mut (dyn FnMut(u64) + Send),
) -> Result<StreamOutcome> {
    let fail = move |side: Side| move |e: io::Error| map_io_error(&e, side, source, destination);

    let mut reader = File::open(source).await.map_err(fail(Side::Source))?;
    let total = reader.metadata().await.map_err(fail(Side::Source))?.len();
    let mut writer = File::create(destination)
        .await
        .map_err(fail(Side::Destination))?;

    let result = copy_chunks(&mut reader, &mut writer, total, buffer_size, cancel, on_progress).await;
    drop(writer);

    match result {
        Ok(StreamOutcome::Completed(bytes)) => Ok(StreamOutcome::Completed(bytes)),
        Ok(StreamOutcome::Cancelled) => {
            debug!("Stream copy cancelled, removing {}", destination.display());
            remove_partial(destination).await;
            Ok(StreamOutcome::Cancelled)
        }
        Err((side, e)) => {
            remove_partial(destination).await;
            Err(map_io_error(&e, side, source, destination))
        }
    }
}

async fn copy_chunks(
    reader: &mut File,
    writer: &mut File,
    total: u64,
    buffer_size: usize,
    cancel: &CancellationToken,
    on_progress: &mut (dyn FnMut(u64) + Send),
) -> std::result::Result<StreamOutcome, (Side, io::Error)> {
    let mut buffer = vec![0u8; buffer_size.max(MIN_BUFFER_SIZE)];
    let mut copied = 0u64;

    loop {
        if copied < total && cancel.is_cancelled() {
            return Ok(StreamOutcome::Cancelled);
        }

        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| (Side::Source, e))?;
        if bytes_read == 0 {
            break; // EOF
        }

        writer
            .write_all(&buffer[..bytes_read])
            .await
            .map_err(|e| (Side::Destination, e))?;
        copied += bytes_read as u64;
        on_progress(copied);
    }

    // Ensure all data is written
    writer.flush().await.map_err(|e| (Side::Destination, e))?;
    Ok(StreamOutcome::Completed(copied))
}

async fn remove_partial(destination: &Path) {
    match tokio::fs::remove_file(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove partial destination {}: {}",
            destination.display(),
            e
        ),
    }
}

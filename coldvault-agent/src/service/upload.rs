//! Upload sink adapter
//!
//! Drains the archive stream into an object-storage sink. The sink is always
//! closed exactly once, committing only when every byte was copied.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::BackupError;
use crate::pipe::PipeReader;

/// How a sink should finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Every byte arrived; make the object visible
    Commit,
    /// The stream is incomplete; drop whatever was written
    Discard,
}

/// Write handle for one remote object
#[async_trait]
pub trait ArchiveSink: Send {
    /// Appends bytes to the object
    async fn write(&mut self, chunk: &[u8]) -> Result<(), BackupError>;

    /// Finishes the object; called exactly once per sink
    async fn close(&mut self, disposition: Disposition) -> Result<(), BackupError>;
}

/// Hands out write handles keyed by object name
pub trait SinkProvider: Send + Sync {
    fn writer(&self, key: &str) -> Result<Box<dyn ArchiveSink>, BackupError>;
}

/// Copies the whole archive stream into `sink`
///
/// The source is closed after the copy whatever its outcome, so a producer
/// still writing fails instead of blocking. The sink is then closed with
/// [`Disposition::Commit`] after a clean copy and [`Disposition::Discard`]
/// otherwise.
///
/// # Returns
/// Number of bytes uploaded
pub async fn upload_archive(
    mut sink: Box<dyn ArchiveSink>,
    mut source: PipeReader,
) -> Result<u64, BackupError> {
    let copied = copy(sink.as_mut(), &mut source).await;
    source.close();

    let disposition = match copied {
        Ok(_) => Disposition::Commit,
        Err(_) => Disposition::Discard,
    };
    let closed = sink.close(disposition).await;

    let bytes = copied?;
    closed?;

    info!(bytes, "Archive uploaded");
    Ok(bytes)
}

async fn copy(sink: &mut dyn ArchiveSink, source: &mut PipeReader) -> Result<u64, BackupError> {
    let mut total = 0u64;

    while let Some(chunk) = source.next_chunk().await {
        let chunk = chunk.map_err(|e| {
            warn!(error = %e, bytes = total, "Archive stream failed mid-upload");
            BackupError::Archive(e)
        })?;

        sink.write(&chunk).await.inspect_err(|e| {
            warn!(error = %e, bytes = total, "Cannot upload archive");
        })?;
        total += chunk.len() as u64;
    }

    Ok(total)
}

//! Bounded in-process byte pipe
//!
//! Connects the blocking archive producer to the async uploader. At most
//! `capacity` chunks of up to [`MAX_CHUNK_SIZE`] bytes are in flight, so the
//! archive is never materialized in full. The producer blocks when the pipe
//! is full; the consumer waits when it is empty.

use bytes::Bytes;
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Largest chunk a single `write` call hands to the reader
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Creates a pipe holding at most `capacity` chunks
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PipeWriter { tx }, PipeReader { rx })
}

/// Blocking write end of the pipe
///
/// Must only be used from a blocking context (a `spawn_blocking` task or a
/// plain thread). The stream ends once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PipeWriter {
    /// Ends the stream with an error the reader will observe
    pub fn close_with_error(self, err: io::Error) {
        // Nobody left to tell if the reader is already gone.
        let _ = self.tx.blocking_send(Err(err));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(MAX_CHUNK_SIZE);
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(&buf[..len])))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader closed"))?;

        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async read end of the pipe
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl PipeReader {
    /// Waits for the next chunk
    ///
    /// Returns `None` at end of stream and `Some(Err(_))` if the producer
    /// failed.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.rx.recv().await
    }

    /// Closes the read end; pending and future writes fail with `BrokenPipe`
    pub fn close(mut self) {
        self.rx.close();
    }
}

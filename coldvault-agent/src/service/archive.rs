//! Archive streamer
//!
//! Serializes a directory tree into a gzip'd tar written straight into a
//! bounded pipe. The caller gets the read end back immediately and consumes
//! the archive while it is still being built.

use flate2::{Compression, write::GzEncoder};
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::BackupError;
use crate::pipe::{PipeReader, PipeWriter, pipe};

/// Counts reported once an archive has been fully written
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: u64,
    pub directories: u64,
    pub skipped: u64,
}

/// Starts archiving `directory` and returns the stream of archive bytes
///
/// Fails synchronously only if `directory` is not a readable directory.
/// Anything going wrong later is delivered through the returned reader.
///
/// # Arguments
/// * `directory` - Root of the tree to archive; entries are stored relative to it
/// * `archive_name` - Used for logging
/// * `pipe_capacity` - Number of chunks that may be buffered between producer and consumer
pub fn create_backup(
    directory: &Path,
    archive_name: &str,
    pipe_capacity: usize,
) -> Result<PipeReader, BackupError> {
    let metadata = fs::metadata(directory).map_err(BackupError::Archive)?;
    if !metadata.is_dir() {
        return Err(BackupError::Archive(io::Error::other(format!(
            "{} is not a directory",
            directory.display()
        ))));
    }

    let (writer, reader) = pipe(pipe_capacity);
    let directory = directory.to_path_buf();
    let archive_name = archive_name.to_string();

    tokio::task::spawn_blocking(move || produce(directory, archive_name, writer));

    Ok(reader)
}

fn produce(directory: PathBuf, archive_name: String, writer: PipeWriter) {
    let failure = writer.clone();

    match write_archive(&directory, writer) {
        Ok(stats) => {
            info!(
                archive = %archive_name,
                files = stats.files,
                directories = stats.directories,
                skipped = stats.skipped,
                "Archive fully written"
            );
        }
        Err(e) => {
            error!(archive = %archive_name, error = %e, "Archive creation failed");
            failure.close_with_error(e);
        }
    }
}

/// Writes the whole tree under `directory` as a tar.gz into `out`
///
/// Entries are visited in file-name order so the same tree always yields
/// the same entry order.
pub fn write_archive<W: Write>(directory: &Path, out: W) -> io::Result<ArchiveStats> {
    let mut builder = Builder::new(GzEncoder::new(out, Compression::default()));
    let mut stats = ArchiveStats::default();

    for entry in WalkDir::new(directory).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();

        // relative path used in tar file
        let relative = path.strip_prefix(directory).map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let metadata = entry.metadata().map_err(io::Error::from)?;
        if metadata.is_file() {
            append_file(&mut builder, path, relative, &metadata)?;
            stats.files += 1;
        } else if metadata.is_dir() {
            append_dir(&mut builder, relative, &metadata)?;
            stats.directories += 1;
        } else {
            warn!("Skipping {} (not a regular file or directory)", path.display());
            stats.skipped += 1;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(stats)
}

/// Add regular file
fn append_file<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &Path,
    metadata: &Metadata,
) -> io::Result<()> {
    let file = File::open(path)?;
    let mut header = Header::new_gnu();
    header.set_metadata(metadata);
    header.set_size(metadata.len());

    debug!("Adding {} ({} bytes)", name.display(), metadata.len());
    builder.append_data(&mut header, name, BufReader::new(file))
}

/// Add directory
fn append_dir<W: Write>(builder: &mut Builder<W>, name: &Path, metadata: &Metadata) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata(metadata);
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);

    builder.append_data(&mut header, name, io::empty())
}

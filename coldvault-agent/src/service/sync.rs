//! Directory sync step
//!
//! Wraps the external sync primitive. One call is one attempt; retry policy
//! belongs to the orchestrator.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{MAIN_SEPARATOR_STR, Path};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SyncError;

/// Service trait for mirroring one directory into another
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Makes `destination` a copy of the contents of `source`
    ///
    /// # Arguments
    /// * `source` - Directory whose contents are copied
    /// * `destination` - Directory receiving the copy
    async fn sync_once(&self, source: &Path, destination: &Path) -> Result<(), SyncError>;
}

/// rsync-backed implementation of Syncer
pub struct RsyncSyncer {
    program: String,
    args: Vec<String>,
}

impl RsyncSyncer {
    /// Creates a syncer running `program` in archive mode, deleting files
    /// that vanished from the source
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec!["-a".to_string(), "--delete".to_string()],
        }
    }

    /// Full argument list for one invocation
    ///
    /// rsync copies the directory itself instead of its contents when the
    /// source lacks a trailing separator, so one is always appended.
    fn command_args(&self, source: &Path, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(with_trailing_separator(source));
        args.push(destination.as_os_str().to_os_string());
        args
    }
}

#[async_trait]
impl Syncer for RsyncSyncer {
    async fn sync_once(&self, source: &Path, destination: &Path) -> Result<(), SyncError> {
        let args = self.command_args(source, destination);
        info!(
            program = %self.program,
            source = %source.display(),
            destination = %destination.display(),
            "Running sync"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", self.program, stdout.trim());
        }

        if !output.status.success() {
            return Err(SyncError::Exit {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!("{} completed successfully", self.program);
        Ok(())
    }
}

/// Returns `path` as an OS string ending in the platform separator
pub fn with_trailing_separator(path: &Path) -> OsString {
    let mut raw = path.as_os_str().to_os_string();
    if !raw.to_string_lossy().ends_with(MAIN_SEPARATOR_STR) {
        raw.push(MAIN_SEPARATOR_STR);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_separator_is_added_once() {
        assert_eq!(
            with_trailing_separator(Path::new("/data/graph.db")),
            OsString::from("/data/graph.db/")
        );
        assert_eq!(
            with_trailing_separator(Path::new("/data/graph.db/")),
            OsString::from("/data/graph.db/")
        );
    }

    #[test]
    fn test_command_args() {
        let syncer = RsyncSyncer::new("rsync");
        let args = syncer.command_args(
            Path::new("/data/graph.db"),
            Path::new("/data/graph.db.backup"),
        );
        assert_eq!(
            args,
            vec![
                OsString::from("-a"),
                OsString::from("--delete"),
                OsString::from("/data/graph.db/"),
                OsString::from("/data/graph.db.backup"),
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let syncer = RsyncSyncer::new("false");
        let err = syncer
            .sync_once(Path::new("/tmp"), Path::new("/tmp"))
            .await
            .unwrap_err();

        match err {
            SyncError::Exit { program, code, .. } => {
                assert_eq!(program, "false");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let syncer = RsyncSyncer::new("coldvault-definitely-not-installed");
        let err = syncer
            .sync_once(Path::new("/tmp"), Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_successful_exit() {
        let syncer = RsyncSyncer::new("true");
        syncer
            .sync_once(Path::new("/tmp"), Path::new("/tmp"))
            .await
            .unwrap();
    }
}

//! In-memory fakes for the scheduler, sync and storage seams

use async_trait::async_trait;
use coldvault_client::{ClientError, UnitApi};
use coldvault_core::domain::unit::{TargetState, UnitState};
use flate2::read::GzDecoder;
use std::collections::{BTreeMap, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{BackupError, SyncError};
use crate::service::{ArchiveSink, Disposition, Syncer};

/// Scheduler fake serving a fixed roster and recording state requests
pub struct FakeUnitApi {
    units: Option<Vec<UnitState>>,
    rejected: Vec<TargetState>,
    requests: Mutex<Vec<(String, TargetState)>>,
}

impl FakeUnitApi {
    pub fn with_units(units: Vec<UnitState>) -> Self {
        Self {
            units: Some(units),
            rejected: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A scheduler whose roster query always fails
    pub fn failing_roster() -> Self {
        Self {
            units: None,
            ..Self::with_units(Vec::new())
        }
    }

    /// Rejects every request for `target`
    pub fn rejecting(mut self, target: TargetState) -> Self {
        self.rejected.push(target);
        self
    }

    /// Every state request received, including rejected ones
    pub fn requests(&self) -> Vec<(String, TargetState)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnitApi for FakeUnitApi {
    async fn unit_states(&self) -> coldvault_client::Result<Vec<UnitState>> {
        self.units
            .clone()
            .ok_or_else(|| ClientError::api_error(503, "fleet registry unavailable"))
    }

    async fn set_unit_target_state(
        &self,
        name: &str,
        target: TargetState,
    ) -> coldvault_client::Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push((name.to_string(), target));

        if self.rejected.contains(&target) {
            return Err(ClientError::api_error(409, "unit is being rescheduled"));
        }
        Ok(())
    }
}

/// Syncer that answers from a script, then succeeds
///
/// Successful calls copy `source` into `destination` when `copy` is set, so
/// later stages see real files.
pub struct ScriptedSyncer {
    script: Mutex<VecDeque<bool>>,
    copy: bool,
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl ScriptedSyncer {
    /// `outcomes[i]` is whether call `i` succeeds
    pub fn new(outcomes: &[bool]) -> Self {
        Self {
            script: Mutex::new(outcomes.iter().copied().collect()),
            copy: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn copying(mut self) -> Self {
        self.copy = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Syncer for ScriptedSyncer {
    async fn sync_once(&self, source: &Path, destination: &Path) -> Result<(), SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), destination.to_path_buf()));

        let succeed = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !succeed {
            return Err(SyncError::Exit {
                program: "rsync".to_string(),
                code: Some(23),
                stderr: "partial transfer".to_string(),
            });
        }

        if self.copy {
            copy_tree(source, destination).map_err(|source| SyncError::Spawn {
                program: "copy".to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

fn copy_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(source) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).map_err(std::io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// What a [`RecordingSink`] saw, shared with the test after the sink is consumed
#[derive(Debug, Default)]
pub struct SinkRecord {
    pub bytes: Vec<u8>,
    pub closes: Vec<Disposition>,
}

/// Sink keeping every byte in memory
pub struct RecordingSink {
    record: Arc<Mutex<SinkRecord>>,
    fail_after: Option<usize>,
    fail_close: bool,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<SinkRecord>>) {
        let record = Arc::new(Mutex::new(SinkRecord::default()));
        let sink = Self {
            record: record.clone(),
            fail_after: None,
            fail_close: false,
        };
        (sink, record)
    }

    /// Fails the write that would push the total past `limit` bytes
    pub fn failing_after(mut self, limit: usize) -> Self {
        self.fail_after = Some(limit);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[async_trait]
impl ArchiveSink for RecordingSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), BackupError> {
        let mut record = self.record.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if record.bytes.len() + chunk.len() > limit {
                return Err(BackupError::upload("connection reset by peer"));
            }
        }
        record.bytes.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self, disposition: Disposition) -> Result<(), BackupError> {
        self.record.lock().unwrap().closes.push(disposition);
        if self.fail_close {
            return Err(BackupError::upload("complete multipart upload failed"));
        }
        Ok(())
    }
}

/// Decodes a tar.gz into relative path -> contents, regular files only
pub fn unpack(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut files = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let path = entry.path().unwrap().to_string_lossy().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        files.insert(path, data);
    }
    files
}

//! Backup orchestrator
//!
//! Sequences one backup run:
//! hot sync, safety check, stop, cold sync, start, archive, upload.
//!
//! Only the hot sync is retried. Any other failure ends the run at the
//! stage it happened in. After a failed cold sync the database is left
//! stopped for an operator to inspect.

use coldvault_core::domain::archive::ArchiveDescriptor;
use coldvault_core::domain::stage::Stage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::StageFailure;
use crate::pipe::PipeReader;
use crate::service::{
    ArchiveSink, Disposition, ServiceController, Syncer, create_backup, upload_archive,
};

/// Paths and unit names a run works with
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Live database directory
    pub data_path: PathBuf,
    /// Sync destination, archived after the cold sync
    pub staging_path: PathBuf,
    pub database_unit: String,
    /// Unit that must be inactive before the database is stopped
    pub dependent_unit: String,
    pub pipe_capacity: usize,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub archive_name: String,
    pub bytes_uploaded: u64,
    pub elapsed: Duration,
}

/// Drives a backup run through every stage
pub struct Orchestrator {
    controller: ServiceController,
    syncer: Arc<dyn Syncer>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        controller: ServiceController,
        syncer: Arc<dyn Syncer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            controller,
            syncer,
            settings,
        }
    }

    /// Runs the whole backup, uploading into `sink` under `archive`'s name
    ///
    /// `sink` is closed exactly once: committed after a complete upload,
    /// discarded on every failure.
    pub async fn run(
        &self,
        archive: &ArchiveDescriptor,
        mut sink: Box<dyn ArchiveSink>,
    ) -> Result<RunReport, StageFailure> {
        let started = Instant::now();
        enter(Stage::Init);
        info!(
            archive = %archive.name,
            database = %self.settings.database_unit,
            dependent = %self.settings.dependent_unit,
            "Starting backup run"
        );

        let reader = match self.prepare(archive).await {
            Ok(reader) => reader,
            Err(failure) => {
                if let Err(e) = sink.close(Disposition::Discard).await {
                    warn!(archive = %archive.name, error = %e, "Could not discard archive object");
                }
                return Err(failure);
            }
        };

        enter(Stage::Uploading);
        let bytes_uploaded = upload_archive(sink, reader)
            .await
            .map_err(|e| StageFailure::new(Stage::Uploading, e))?;

        let elapsed = started.elapsed();
        enter(Stage::Done);
        info!(
            archive = %archive.name,
            bytes = bytes_uploaded,
            elapsed = ?elapsed,
            "Backup run finished"
        );

        Ok(RunReport {
            archive_name: archive.name.clone(),
            bytes_uploaded,
            elapsed,
        })
    }

    /// Every stage before the upload; returns the archive stream
    async fn prepare(&self, archive: &ArchiveDescriptor) -> Result<PipeReader, StageFailure> {
        let settings = &self.settings;

        enter(Stage::HotSync);
        self.hot_sync().await;

        // The stop request follows the check directly to keep the window
        // in which the dependent could come up as small as possible.
        enter(Stage::SafetyCheck);
        self.controller
            .ensure_inactive(&settings.dependent_unit)
            .await
            .map_err(|e| StageFailure::new(Stage::SafetyCheck, e))?;

        enter(Stage::ServiceStop);
        self.controller
            .stop(&settings.database_unit)
            .await
            .map_err(|e| StageFailure::new(Stage::ServiceStop, e))?;

        enter(Stage::ColdSync);
        if let Err(e) = self
            .syncer
            .sync_once(&settings.data_path, &settings.staging_path)
            .await
        {
            error!(
                stage = %Stage::ColdSync,
                unit = %settings.database_unit,
                error = %e,
                "Cold sync failed, leaving the database stopped"
            );
            return Err(StageFailure::new(Stage::ColdSync, e));
        }

        enter(Stage::ServiceStart);
        self.controller
            .start(&settings.database_unit)
            .await
            .map_err(|e| StageFailure::new(Stage::ServiceStart, e))?;

        enter(Stage::Archiving);
        create_backup(&settings.staging_path, &archive.name, settings.pipe_capacity)
            .map_err(|e| StageFailure::new(Stage::Archiving, e))
    }

    /// Syncs the live directory, retrying once; never fails the run
    async fn hot_sync(&self) {
        let source = &self.settings.data_path;
        let destination = &self.settings.staging_path;

        let Err(first) = self.syncer.sync_once(source, destination).await else {
            return;
        };
        warn!(stage = %Stage::HotSync, error = %first, "Hot sync failed, retrying once");

        if let Err(second) = self.syncer.sync_once(source, destination).await {
            warn!(
                stage = %Stage::HotSync,
                error = %second,
                "Hot sync failed again, relying on the cold sync"
            );
        }
    }
}

fn enter(stage: Stage) {
    info!(stage = %stage, "Entering stage");
}

//! Backup error taxonomy
//!
//! Every stage reports a [`BackupError`] to the orchestrator, which attaches
//! the stage it was running and surfaces a [`StageFailure`].

use coldvault_client::ClientError;
use coldvault_core::domain::stage::Stage;
use thiserror::Error;

/// Cause of a failed stage
#[derive(Debug, Error)]
pub enum BackupError {
    /// The scheduler could not be reached
    #[error("cannot reach fleet: {0}")]
    Connectivity(#[source] ClientError),

    /// The scheduler answered but rejected or garbled the operation
    #[error("fleet rejected the operation: {0}")]
    Scheduler(#[source] ClientError),

    /// The sync primitive failed
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Walking or serializing the staging directory failed
    #[error("archive creation failed: {0}")]
    Archive(#[source] std::io::Error),

    /// Writing to object storage failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// The dependent unit is active, so the database must not be stopped
    #[error("dependent unit {unit} is {state}; refusing to stop the database")]
    SafetyViolation {
        /// Dependent unit name
        unit: String,
        /// Active state observed
        state: String,
    },
}

impl BackupError {
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload(message.into())
    }
}

impl From<ClientError> for BackupError {
    fn from(err: ClientError) -> Self {
        if err.is_connectivity() {
            BackupError::Connectivity(err)
        } else {
            BackupError::Scheduler(err)
        }
    }
}

/// Failure of one invocation of the sync primitive
#[derive(Debug, Error)]
pub enum SyncError {
    /// The program could not be started at all
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("{program} exited with {}: {stderr}", describe_exit(.code))]
    Exit {
        program: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

/// Terminal failure of a backup run
#[derive(Debug, Error)]
#[error("backup failed at stage {stage}: {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub cause: BackupError,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<BackupError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

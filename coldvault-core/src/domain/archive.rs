//! Archive descriptor
//!
//! The archive name is the only identifier the agent generates. Downstream
//! retention tooling parses it, so the layout is fixed:
//! `<prefix>_backup_<YYYY-MM-DDTHH-MM-SS>_<env>.tar.gz`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// strftime layout of the timestamp embedded in archive names
pub const ARCHIVE_DATE_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Name and creation time of one backup archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ArchiveDescriptor {
    /// Builds the descriptor for an archive created at `created_at`
    ///
    /// Two runs started within the same second with the same prefix and
    /// environment produce the same name.
    pub fn new(prefix: &str, environment: &str, created_at: DateTime<Utc>) -> Self {
        let name = format!(
            "{}_backup_{}_{}.tar.gz",
            prefix,
            created_at.format(ARCHIVE_DATE_FORMAT),
            environment
        );
        Self { name, created_at }
    }
}

//! Service layer
//!
//! Services implement the individual backup stages: talking to the
//! scheduler, mirroring directories, streaming the archive and draining it
//! into object storage. The orchestrator sequences them.
//!
//! The scheduler, sync and storage seams are trait-based so stages can be
//! exercised without fleet, rsync or S3.

mod archive;
mod controller;
mod sync;
mod upload;

// Re-export traits
pub use sync::Syncer;
pub use upload::{ArchiveSink, SinkProvider};

// Re-export implementations
pub use archive::create_backup;
pub use controller::ServiceController;
pub use sync::RsyncSyncer;
pub use upload::{Disposition, upload_archive};

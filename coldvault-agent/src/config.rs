//! Agent configuration
//!
//! Defines every parameter of a backup run: where fleet and the bucket
//! live, which units to stop and watch, and which directories to sync.

use std::path::PathBuf;

use crate::pipeline::PipelineSettings;
use crate::repository::{MIN_PART_SIZE, S3Settings};

pub const DEFAULT_FLEET_ENDPOINT: &str = "http://localhost:49153";
pub const DEFAULT_DATA_FOLDER: &str = "/data/graph.db/";
pub const DEFAULT_TARGET_FOLDER: &str = "/data/graph.db.backup";
pub const DEFAULT_S3_DOMAIN: &str = "s3-eu-west-1.amazonaws.com";
pub const DEFAULT_S3_REGION: &str = "eu-west-1";
pub const DEFAULT_BUCKET_NAME: &str = "com.ft.universalpublishing.backup-data";
pub const DEFAULT_DATABASE_UNIT: &str = "neo4j-red@1.service";
pub const DEFAULT_DEPENDENT_UNIT: &str = "deployer.service";
pub const DEFAULT_ARCHIVE_PREFIX: &str = "neo4j";
pub const DEFAULT_RSYNC_BINARY: &str = "rsync";
pub const DEFAULT_PIPE_CAPACITY: usize = 16;
pub const DEFAULT_PART_SIZE_MIB: usize = 8;

const MIB: usize = 1024 * 1024;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// fleet API base URL (e.g., "http://localhost:49153")
    pub fleet_endpoint: String,

    /// SOCKS5 proxy address fleet requests go through, if any
    pub socks_proxy: Option<String>,

    pub aws_access_key: String,
    pub aws_secret_key: String,

    /// Live database directory; must end with '/'
    pub data_folder: String,

    /// Staging directory the database is synced into and archived from
    pub target_folder: String,

    pub s3_domain: String,
    pub s3_region: String,
    pub bucket_name: String,

    /// Environment tag appended to archive names
    pub environment: String,

    pub database_unit: String,
    pub dependent_unit: String,
    pub archive_prefix: String,
    pub rsync_binary: String,

    /// Archive chunks buffered between the archiver and the uploader
    pub pipe_capacity: usize,

    /// Multipart part size in MiB
    pub part_size_mib: usize,
}

impl Config {
    /// Creates a configuration with defaults for everything except credentials
    pub fn new(aws_access_key: String, aws_secret_key: String) -> Self {
        Self {
            fleet_endpoint: DEFAULT_FLEET_ENDPOINT.to_string(),
            socks_proxy: None,
            aws_access_key,
            aws_secret_key,
            data_folder: DEFAULT_DATA_FOLDER.to_string(),
            target_folder: DEFAULT_TARGET_FOLDER.to_string(),
            s3_domain: DEFAULT_S3_DOMAIN.to_string(),
            s3_region: DEFAULT_S3_REGION.to_string(),
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            environment: String::new(),
            database_unit: DEFAULT_DATABASE_UNIT.to_string(),
            dependent_unit: DEFAULT_DEPENDENT_UNIT.to_string(),
            archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
            rsync_binary: DEFAULT_RSYNC_BINARY.to_string(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            part_size_mib: DEFAULT_PART_SIZE_MIB,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.fleet_endpoint.starts_with("http://")
            && !self.fleet_endpoint.starts_with("https://")
        {
            anyhow::bail!("fleet_endpoint must start with http:// or https://");
        }

        if !self.data_folder.ends_with('/') {
            anyhow::bail!("data_folder must end with '/' so its contents are synced, not the folder itself");
        }

        if self.target_folder.is_empty() {
            anyhow::bail!("target_folder cannot be empty");
        }

        if self.aws_access_key.is_empty() || self.aws_secret_key.is_empty() {
            anyhow::bail!("AWS credentials cannot be empty");
        }

        if self.s3_domain.is_empty() {
            anyhow::bail!("s3_domain cannot be empty");
        }

        if self.bucket_name.is_empty() {
            anyhow::bail!("bucket_name cannot be empty");
        }

        if self.database_unit.is_empty() || self.dependent_unit.is_empty() {
            anyhow::bail!("database_unit and dependent_unit cannot be empty");
        }

        if self.pipe_capacity == 0 {
            anyhow::bail!("pipe_capacity must be greater than 0");
        }

        if self.part_size() < MIN_PART_SIZE {
            anyhow::bail!("part_size_mib must be at least {}", MIN_PART_SIZE / MIB);
        }

        Ok(())
    }

    pub fn part_size(&self) -> usize {
        self.part_size_mib.saturating_mul(MIB)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            data_path: PathBuf::from(&self.data_folder),
            staging_path: PathBuf::from(&self.target_folder),
            database_unit: self.database_unit.clone(),
            dependent_unit: self.dependent_unit.clone(),
            pipe_capacity: self.pipe_capacity,
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            access_key: self.aws_access_key.clone(),
            secret_key: self.aws_secret_key.clone(),
            domain: self.s3_domain.clone(),
            region: self.s3_region.clone(),
            bucket: self.bucket_name.clone(),
            part_size: self.part_size(),
        }
    }
}

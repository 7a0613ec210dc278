//! Coldvault Agent
//!
//! Takes a consistent backup of a fleet-scheduled database and streams it
//! to S3 as a gzip'd tar.
//!
//! Architecture:
//! - Configuration: CLI flags with environment overrides
//! - Repositories: S3 storage behind the archive sink traits
//! - Services: unit control, directory sync, archive streaming, upload
//! - Pipeline: runs the stages in order and reports where a run stopped
//!
//! One invocation performs one run and exits 0 on success, 1 otherwise.

mod config;
mod error;
mod pipe;
mod pipeline;
mod repository;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use coldvault_client::FleetClient;
use coldvault_core::domain::archive::ArchiveDescriptor;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{
    Config, DEFAULT_ARCHIVE_PREFIX, DEFAULT_BUCKET_NAME, DEFAULT_DATA_FOLDER,
    DEFAULT_DATABASE_UNIT, DEFAULT_DEPENDENT_UNIT, DEFAULT_FLEET_ENDPOINT, DEFAULT_PART_SIZE_MIB,
    DEFAULT_PIPE_CAPACITY, DEFAULT_RSYNC_BINARY, DEFAULT_S3_DOMAIN, DEFAULT_S3_REGION,
    DEFAULT_TARGET_FOLDER,
};
use crate::error::StageFailure;
use crate::pipeline::{Orchestrator, RunReport};
use crate::repository::S3SinkProvider;
use crate::service::{RsyncSyncer, ServiceController, SinkProvider};

#[derive(Parser, Debug)]
#[command(name = "coldvault-agent")]
#[command(about = "Cold backup of a fleet-scheduled database to S3", long_about = None)]
struct Cli {
    /// fleet API endpoint
    #[arg(long, env = "FLEETCTL_ENDPOINT", default_value = DEFAULT_FLEET_ENDPOINT)]
    fleet_endpoint: String,

    /// SOCKS5 proxy (host:port) for reaching fleet
    #[arg(long, env = "SOCKS_PROXY")]
    socks_proxy: Option<String>,

    /// AWS access key
    #[arg(long, env = "AWS_ACCESS_KEY")]
    aws_access_key: String,

    /// AWS secret key
    #[arg(long, env = "AWS_SECRET_KEY", hide_env_values = true)]
    aws_secret_key: String,

    /// Database data folder, with a trailing slash
    #[arg(long, env = "DATA_FOLDER", default_value = DEFAULT_DATA_FOLDER)]
    data_folder: String,

    /// Folder the database is synced into before archiving
    #[arg(long, env = "TARGET_FOLDER", default_value = DEFAULT_TARGET_FOLDER)]
    target_folder: String,

    /// S3 domain
    #[arg(long, env = "S3_DOMAIN", default_value = DEFAULT_S3_DOMAIN)]
    s3_domain: String,

    /// S3 region
    #[arg(long, env = "S3_REGION", default_value = DEFAULT_S3_REGION)]
    s3_region: String,

    /// Bucket receiving the archives
    #[arg(long, env = "BUCKET_NAME", default_value = DEFAULT_BUCKET_NAME)]
    bucket_name: String,

    /// Environment tag appended to archive names
    #[arg(long = "env", env = "ENVIRONMENT_TAG", default_value = "")]
    environment: String,

    /// Database unit to stop during the cold sync
    #[arg(long, env = "DATABASE_UNIT", default_value = DEFAULT_DATABASE_UNIT)]
    database_unit: String,

    /// Unit that must be inactive before the database is stopped
    #[arg(long, env = "DEPENDENT_UNIT", default_value = DEFAULT_DEPENDENT_UNIT)]
    dependent_unit: String,

    /// Archive name prefix
    #[arg(long, env = "ARCHIVE_PREFIX", default_value = DEFAULT_ARCHIVE_PREFIX)]
    archive_prefix: String,

    /// rsync executable
    #[arg(long, env = "RSYNC_BINARY", default_value = DEFAULT_RSYNC_BINARY)]
    rsync_binary: String,

    /// Archive chunks buffered between archiving and uploading
    #[arg(long, env = "PIPE_CAPACITY", default_value_t = DEFAULT_PIPE_CAPACITY)]
    pipe_capacity: usize,

    /// Multipart upload part size in MiB
    #[arg(long, env = "PART_SIZE_MIB", default_value_t = DEFAULT_PART_SIZE_MIB)]
    part_size_mib: usize,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            fleet_endpoint: cli.fleet_endpoint,
            socks_proxy: cli.socks_proxy.filter(|proxy| !proxy.trim().is_empty()),
            aws_access_key: cli.aws_access_key,
            aws_secret_key: cli.aws_secret_key,
            data_folder: cli.data_folder,
            target_folder: cli.target_folder,
            s3_domain: cli.s3_domain,
            s3_region: cli.s3_region,
            bucket_name: cli.bucket_name,
            environment: cli.environment,
            database_unit: cli.database_unit,
            dependent_unit: cli.dependent_unit,
            archive_prefix: cli.archive_prefix,
            rsync_binary: cli.rsync_binary,
            pipe_capacity: cli.pipe_capacity,
            part_size_mib: cli.part_size_mib,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coldvault_agent=info,coldvault_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let started_at = Utc::now();
    info!(started_at = %started_at.to_rfc3339(), "Starting Coldvault Agent");

    let config = load_config(Cli::parse())?;
    info!(
        fleet_endpoint = %config.fleet_endpoint,
        socks_proxy = ?config.socks_proxy,
        bucket = %config.bucket_name,
        database = %config.database_unit,
        dependent = %config.dependent_unit,
        "Loaded configuration"
    );

    let fleet = connect_fleet(&config)?;
    let archive = ArchiveDescriptor::new(&config.archive_prefix, &config.environment, started_at);

    // Storage problems must surface before the database is touched.
    let storage = S3SinkProvider::new(config.s3_settings()).await;
    let sink = storage
        .writer(&archive.name)
        .inspect_err(|e| {
            error!(
                archive = %archive.name,
                bucket = %config.bucket_name,
                error = %e,
                "Could not create archive writer"
            )
        })
        .context("Failed to create archive writer")?;

    let orchestrator = Orchestrator::new(
        ServiceController::new(Arc::new(fleet)),
        Arc::new(RsyncSyncer::new(config.rsync_binary.clone())),
        config.pipeline_settings(),
    );

    let outcome = orchestrator.run(&archive, sink).await;
    match &outcome {
        Ok(report) => info!(
            archive = %report.archive_name,
            bytes = report.bytes_uploaded,
            elapsed = ?report.elapsed,
            "Backup completed"
        ),
        Err(failure) => error!(
            stage = %failure.stage,
            archive = %archive.name,
            error = %failure.cause,
            "Backup failed"
        ),
    }

    Ok(ExitCode::from(exit_status(&outcome)))
}

/// Converts the parsed flags into a validated configuration
fn load_config(cli: Cli) -> Result<Config> {
    let config = Config::from(cli);
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.context("Invalid configuration"));
    }
    Ok(config)
}

/// Builds the fleet client, through the SOCKS proxy when one is configured
fn connect_fleet(config: &Config) -> Result<FleetClient> {
    let client = match &config.socks_proxy {
        Some(proxy) => FleetClient::with_socks_proxy(&config.fleet_endpoint, proxy),
        None => FleetClient::new(&config.fleet_endpoint),
    };

    client
        .inspect_err(|e| {
            error!(
                fleet_endpoint = %config.fleet_endpoint,
                socks_proxy = ?config.socks_proxy,
                error = %e,
                "Could not create fleet client"
            )
        })
        .context("Failed to create fleet client")
}

/// Process exit status for a run outcome
fn exit_status(outcome: &Result<RunReport, StageFailure>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use coldvault_core::domain::stage::Stage;
    use std::time::Duration;
    use tracing_test::traced_test;

    const REQUIRED: [&str; 5] = [
        "coldvault-agent",
        "--aws-access-key",
        "access",
        "--aws-secret-key",
        "secret",
    ];

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(REQUIRED.iter().chain(["--env", "prod-uk"].iter())).unwrap();
        let config = Config::from(cli);

        assert_eq!(config.environment, "prod-uk");
        assert_eq!(config.s3_region, "eu-west-1");
        assert_eq!(config.pipe_capacity, DEFAULT_PIPE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_socks_proxy_means_direct() {
        let cli =
            Cli::try_parse_from(REQUIRED.iter().chain(["--socks-proxy", " "].iter())).unwrap();
        assert!(Config::from(cli).socks_proxy.is_none());

        let cli = Cli::try_parse_from(REQUIRED.iter().chain(["--socks-proxy", "localhost:1080"].iter()))
            .unwrap();
        assert_eq!(Config::from(cli).socks_proxy.as_deref(), Some("localhost:1080"));
    }

    #[test]
    #[traced_test]
    fn test_invalid_configuration_is_logged() {
        let cli = Cli::try_parse_from(REQUIRED.iter().chain(["--pipe-capacity", "0"].iter())).unwrap();

        assert!(load_config(cli).is_err());
        assert!(logs_contain("Invalid configuration"));
        assert!(logs_contain("pipe_capacity must be greater than 0"));
    }

    #[test]
    #[traced_test]
    fn test_invalid_fleet_endpoint_fails_startup() {
        let mut config = Config::new("access".to_string(), "secret".to_string());
        config.fleet_endpoint = "http://".to_string();
        assert!(connect_fleet(&config).is_err());
        assert!(logs_contain("Could not create fleet client"));
        assert!(logs_contain("fleet_endpoint=http://"));

        config.fleet_endpoint = "http://localhost:49153".to_string();
        config.socks_proxy = Some("localhost:1080".to_string());
        assert!(connect_fleet(&config).is_ok());
    }

    #[test]
    fn test_exit_status() {
        let ok = Ok(RunReport {
            archive_name: "neo4j_backup_2016-07-04T09-05-03_.tar.gz".to_string(),
            bytes_uploaded: 42,
            elapsed: Duration::from_secs(1),
        });
        assert_eq!(exit_status(&ok), 0);

        let failed = Err(StageFailure::new(
            Stage::SafetyCheck,
            BackupError::SafetyViolation {
                unit: "deployer.service".to_string(),
                state: "active".to_string(),
            },
        ));
        assert_eq!(exit_status(&failed), 1);
    }
}

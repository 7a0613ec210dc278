//! Repository layer
//!
//! Repositories wrap remote storage behind the sink traits of the service
//! layer, without any business logic of their own.

mod s3;

pub use s3::{MIN_PART_SIZE, S3Settings, S3SinkProvider};

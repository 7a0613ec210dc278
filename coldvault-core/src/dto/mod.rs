//! Data Transfer Objects for the fleet HTTP API
//!
//! DTOs mirror fleet's JSON schema field for field. They are converted into
//! domain types at the client boundary so nothing else depends on wire names.

pub mod unit;

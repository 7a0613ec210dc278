//! Coldvault Core
//!
//! Core types shared by the coldvault backup agent and its fleet client.
//!
//! This crate contains:
//! - Domain types: units, target states, archive descriptors and pipeline stages
//! - DTOs: fleet API wire representations

pub mod domain;
pub mod dto;

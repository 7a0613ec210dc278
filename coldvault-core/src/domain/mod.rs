//! Core domain types
//!
//! These types describe what the backup agent observes about the cluster
//! (unit states), what it asks the cluster to do (target states), and what it
//! produces (archives). They are process-lifetime values and never persisted.

pub mod archive;
pub mod stage;
pub mod unit;

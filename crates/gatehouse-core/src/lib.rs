//! Ambient plumbing shared by Gatehouse crates: tracing setup, environment
//! configuration and serde helpers.

pub mod config;
pub mod serde;
pub mod tracing;

//! Domain types shared across Gatehouse crates.
//!
//! This crate contains only pure types with no framework dependencies.
//! Import in `usecase/` and `domain/` layers; never in `infra/`.

pub mod account;
pub mod id;
pub mod pagination;
pub mod permission;

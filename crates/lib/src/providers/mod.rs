//! # Provider Boundaries
//!
//! Capability traits for the two external services the pipeline calls out to,
//! plus the concrete implementations shipped with the crate.

pub mod ai;
pub mod store;

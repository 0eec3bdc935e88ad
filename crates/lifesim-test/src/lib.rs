//! Lifesim Test Harness - Scripted scenarios and determinism checks
//!
//! This crate provides:
//! - A shared lifecycle journal elements write into
//! - Scripted elements driven by action lists
//! - Seeded random workloads and a runner that replays them

pub mod journal;
pub mod script;
pub mod workload;

pub use journal::*;
pub use script::*;
pub use workload::*;

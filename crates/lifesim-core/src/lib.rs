//! Lifesim Core - Fundamental types shared by the scheduler crates
//!
//! This crate defines:
//! - Simulated time (Tick, TickSpan)
//! - Identifiers (TimelineId, HandleId)
//! - The scheduler error taxonomy (TimelineError, ElementFault)

pub mod error;
pub mod id;
pub mod time;

pub use error::*;
pub use id::*;
pub use time::*;

//! Lifesim Timeline - Cooperative tree scheduler
//!
//! This crate implements the Timeline:
//! - Time-ordered event queue with cheap tombstone cancellation
//! - Parent/child element trees with inline delegation
//! - Soft (cooperative) and hard (forced) stop protocols
//! - Per-call work budgets by element count and wall-clock time
//! - Sub-timelines for isolated, immediate execution
//!
//! The scheduler is single-threaded and deterministic: the same schedule
//! always produces the same execution order.

pub mod callbacks;
pub mod config;
pub mod element;
mod handle;
pub mod queue;
pub mod report;
pub mod stop;
mod sub;
pub mod timeline;

pub use callbacks::*;
pub use config::*;
pub use element::*;
pub use queue::*;
pub use report::*;
pub use stop::*;
pub use timeline::*;

pub use lifesim_core::{
    ElementFault, HandleId, Tick, TickSpan, TimelineError, TimelineId, TimelineResult,
};

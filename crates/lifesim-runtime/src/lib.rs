//! Lifesim Runtime - Host loop driving the timeline
//!
//! Each host tick:
//! 1. Moves the target horizon forward by the configured span, unless the
//!    previous tick fell behind
//! 2. Simulates the timeline up to that horizon within the tick budget
//! 3. Records whether the tick caught up
//!
//! Also provides `tracing-subscriber` initialisation for binaries.

pub mod host;
pub mod logging;

pub use host::*;
pub use logging::*;

//! Fault reporting policy
//!
//! Each timeline carries its own policy. Sub-timelines receive a copy at
//! creation, so an isolated execution can fail strictly while the main
//! loop keeps running.

use std::fmt;
use std::rc::Rc;

use lifesim_core::{TimelineError, TimelineId};

/// Caller-supplied fault sink
pub type FaultHook = Rc<dyn Fn(TimelineId, &TimelineError)>;

/// How faults raised by element hooks are handled
#[derive(Clone, Default)]
pub enum FaultPolicy {
    /// Log through `tracing` and keep simulating
    #[default]
    LogAndContinue,
    /// Log, then return the fault to the caller of `simulate` / `hard_stop`
    Propagate,
    /// Hand every fault to a callback and keep simulating
    Custom(FaultHook),
}

impl FaultPolicy {
    pub fn custom(hook: impl Fn(TimelineId, &TimelineError) + 'static) -> Self {
        FaultPolicy::Custom(Rc::new(hook))
    }

    /// Report a fault. Returns true if the caller should propagate it.
    pub(crate) fn report(&self, timeline: TimelineId, fault: &TimelineError) -> bool {
        match self {
            FaultPolicy::LogAndContinue => {
                tracing::error!(timeline = %timeline, error = %fault, "element fault");
                false
            }
            FaultPolicy::Propagate => {
                tracing::error!(timeline = %timeline, error = %fault, "element fault, propagating");
                true
            }
            FaultPolicy::Custom(hook) => {
                hook(timeline, fault);
                false
            }
        }
    }

    /// Report without ever propagating (teardown path)
    pub(crate) fn report_only(&self, timeline: TimelineId, fault: &TimelineError) {
        match self {
            FaultPolicy::Custom(hook) => hook(timeline, fault),
            _ => tracing::error!(timeline = %timeline, error = %fault, "fault during teardown"),
        }
    }
}

impl fmt::Debug for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::LogAndContinue => write!(f, "LogAndContinue"),
            FaultPolicy::Propagate => write!(f, "Propagate"),
            FaultPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

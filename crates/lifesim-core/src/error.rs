//! Error types for the timeline scheduler

use thiserror::Error;

use crate::{HandleId, Tick, TimelineId};

/// Scheduler errors
#[derive(Error, Debug)]
pub enum TimelineError {
    // Misuse
    #[error("simulate requested up to {until} which is before horizon {horizon}")]
    TimeInPast { until: Tick, horizon: Tick },

    #[error("handle {handle} belongs to {owner}, not {timeline}")]
    ForeignHandle {
        handle: HandleId,
        owner: TimelineId,
        timeline: TimelineId,
    },

    #[error("handle {0} is no longer alive")]
    StaleHandle(HandleId),

    #[error("a hard stop is already pending for the active element")]
    HardStopPending,

    #[error("no element is currently running")]
    NoActiveElement,

    #[error("the active element already has an inline child pending")]
    ChildAlreadyPending,

    #[error("timeline {0} is already simulating")]
    Reentrant(TimelineId),

    // Element faults
    #[error("element {element} failed at {at}: {source}")]
    ElementFailed {
        element: String,
        at: Tick,
        #[source]
        source: ElementFault,
    },

    #[error("element {element} failed while stopping: {source}")]
    StopFailed {
        element: String,
        #[source]
        source: ElementFault,
    },

    #[error("element {element} failed during teardown: {source}")]
    TeardownFailed {
        element: String,
        #[source]
        source: ElementFault,
    },

    #[error("{} elements failed while stopping", .0.len())]
    Aggregate(Vec<TimelineError>),
}

impl TimelineError {
    /// Is this a fault raised by element code (vs scheduler misuse)?
    pub fn is_element_fault(&self) -> bool {
        matches!(
            self,
            TimelineError::ElementFailed { .. }
                | TimelineError::StopFailed { .. }
                | TimelineError::TeardownFailed { .. }
                | TimelineError::Aggregate(_)
        )
    }
}

/// Result type for scheduler operations
pub type TimelineResult<T> = Result<T, TimelineError>;

/// Error raised by domain code inside an element hook
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ElementFault {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ElementFault {
    pub fn new(message: impl Into<String>) -> Self {
        ElementFault {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ElementFault {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TimelineError> for ElementFault {
    fn from(err: TimelineError) -> Self {
        ElementFault::new(err.to_string())
    }
}

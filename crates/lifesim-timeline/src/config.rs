//! Timeline configuration and per-call work budgets

use std::time::Duration;

use crate::FaultPolicy;

/// Default number of elements processed by one `simulate` call
pub const DEFAULT_MAX_ELEMENTS: usize = 10_000;

/// Tombstones tolerated before the queue is considered for compaction
pub const DEFAULT_COMPACTION_FLOOR: usize = 100;

/// Timeline configuration
#[derive(Clone, Debug)]
pub struct TimelineConfig {
    /// Elements processed per `simulate` call before pausing
    pub max_elements: usize,
    /// Wall-clock budget per `simulate` call
    pub max_time: Option<Duration>,
    /// Absolute tombstone count that must be exceeded before compacting
    pub compaction_floor: usize,
    /// What happens to faults raised by element hooks
    pub fault_policy: FaultPolicy,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            max_elements: DEFAULT_MAX_ELEMENTS,
            max_time: None,
            compaction_floor: DEFAULT_COMPACTION_FLOOR,
            fault_policy: FaultPolicy::LogAndContinue,
        }
    }
}

impl TimelineConfig {
    /// Faults are returned to the caller instead of being logged away.
    /// Meant for isolated sub-execution that must fail loudly.
    pub fn strict() -> Self {
        TimelineConfig {
            fault_policy: FaultPolicy::Propagate,
            ..Self::default()
        }
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_compaction_floor(mut self, floor: usize) -> Self {
        self.compaction_floor = floor;
        self
    }

    /// Budget used by `simulate` when none is given
    pub fn budget(&self) -> Budget {
        Budget {
            max_elements: self.max_elements,
            max_time: self.max_time,
        }
    }
}

/// Work bound for a single `simulate` call
///
/// Budgets never cancel elements; they only pause draining.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    pub max_elements: usize,
    pub max_time: Option<Duration>,
}

impl Budget {
    pub fn elements(max_elements: usize) -> Self {
        Budget {
            max_elements,
            max_time: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::elements(usize::MAX)
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::elements(DEFAULT_MAX_ELEMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_matches_config() {
        let config = TimelineConfig::default();
        assert_eq!(config.budget(), Budget::default());
        assert_eq!(config.budget().max_elements, 10_000);
    }

    #[test]
    fn test_strict_propagates() {
        assert!(matches!(
            TimelineConfig::strict().fault_policy,
            FaultPolicy::Propagate
        ));
    }

    #[test]
    fn test_builder_overrides() {
        let config = TimelineConfig::default()
            .with_max_elements(5)
            .with_max_time(Duration::from_millis(2))
            .with_compaction_floor(1);
        let budget = config.budget();
        assert_eq!(budget.max_elements, 5);
        assert_eq!(budget.max_time, Some(Duration::from_millis(2)));
        assert_eq!(config.compaction_floor, 1);
    }
}

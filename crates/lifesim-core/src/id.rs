//! Identity types for the scheduler
//!
//! Handles are generational arena indices: a slot can be reused after its
//! handle is tombstoned, but the bumped generation keeps old ids inert.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_TIMELINE: AtomicU32 = AtomicU32::new(1);

/// Timeline identity - unique within the process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimelineId(pub u32);

impl TimelineId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        TimelineId(NEXT_TIMELINE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timeline({})", self.0)
    }
}

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tl{}", self.0)
    }
}

/// Scheduling ticket identity
///
/// Stays the same across reschedules. Carries its owning timeline so a
/// handle passed to the wrong timeline is rejected instead of aliasing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId {
    pub timeline: TimelineId,
    pub index: u32,
    pub generation: u32,
}

impl HandleId {
    #[inline]
    pub fn new(timeline: TimelineId, index: u32, generation: u32) -> Self {
        HandleId {
            timeline,
            index,
            generation,
        }
    }

    #[inline]
    pub fn timeline(self) -> TimelineId {
        self.timeline
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle({}:{}#{})",
            self.timeline, self.index, self.generation
        )
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.timeline, self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_ids_are_unique() {
        let a = TimelineId::next();
        let b = TimelineId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_generation_distinguishes_reuse() {
        let tl = TimelineId(7);
        let old = HandleId::new(tl, 3, 0);
        let reused = HandleId::new(tl, 3, 1);
        assert_ne!(old, reused);
        assert_eq!(old.timeline(), reused.timeline());
        assert_eq!(format!("{:?}", reused), "Handle(tl7:3#1)");
    }
}

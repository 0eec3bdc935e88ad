//! Time primitives for the simulation scheduler
//!
//! A [`Tick`] is a point on the simulated time line. It has no wall-clock
//! meaning: the host decides how many ticks pass per real second. Ticks are
//! only moved forward through an explicit [`TickSpan`].

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Simulated time - monotonic integer, totally ordered
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);
    pub const MAX: Tick = Tick(u64::MAX);

    #[inline]
    pub fn new(value: u64) -> Self {
        Tick(value)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn saturating_add(self, span: TickSpan) -> Self {
        Tick(self.0.saturating_add(span.0))
    }

    /// Span elapsed since `earlier`, or `None` if `earlier` is in the future
    #[inline]
    pub fn checked_since(self, earlier: Tick) -> Option<TickSpan> {
        self.0.checked_sub(earlier.0).map(TickSpan)
    }
}

impl Add<TickSpan> for Tick {
    type Output = Tick;

    #[inline]
    fn add(self, rhs: TickSpan) -> Self::Output {
        Tick(self.0 + rhs.0)
    }
}

impl AddAssign<TickSpan> for Tick {
    #[inline]
    fn add_assign(&mut self, rhs: TickSpan) {
        self.0 += rhs.0;
    }
}

impl Sub<Tick> for Tick {
    type Output = TickSpan;

    /// Saturates at zero when `rhs` is later than `self`
    #[inline]
    fn sub(self, rhs: Tick) -> Self::Output {
        TickSpan(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t({})", self.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interval between two ticks
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickSpan(pub u64);

impl TickSpan {
    pub const ZERO: TickSpan = TickSpan(0);

    #[inline]
    pub fn new(ticks: u64) -> Self {
        TickSpan(ticks)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for TickSpan {
    type Output = TickSpan;

    #[inline]
    fn add(self, rhs: TickSpan) -> Self::Output {
        TickSpan(self.0 + rhs.0)
    }
}

impl fmt::Debug for TickSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Δ{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tick_advances_by_span() {
        let t = Tick::new(10);
        assert_eq!(t + TickSpan::new(5), Tick::new(15));

        let mut u = t;
        u += TickSpan::new(2);
        assert_eq!(u, Tick::new(12));
    }

    #[test]
    fn test_tick_difference_saturates() {
        assert_eq!(Tick::new(3) - Tick::new(10), TickSpan::ZERO);
        assert_eq!(Tick::new(10) - Tick::new(3), TickSpan::new(7));
        assert_eq!(Tick::new(3).checked_since(Tick::new(10)), None);
    }

    #[test]
    fn test_saturating_add_at_max() {
        assert_eq!(Tick::MAX.saturating_add(TickSpan::new(1)), Tick::MAX);
    }

    proptest! {
        #[test]
        fn prop_span_addition_is_monotonic(start in 0u64..1 << 40, span in 0u64..1 << 20) {
            let t = Tick::new(start);
            let later = t + TickSpan::new(span);
            prop_assert!(later >= t);
            prop_assert_eq!(later - t, TickSpan::new(span));
        }
    }
}

//! Simulation host - fixed-step driver around one timeline

use std::time::{Duration, Instant};

use lifesim_core::{Tick, TickSpan, TimelineResult};
use lifesim_timeline::{Budget, TeardownReport, Timeline, TimelineConfig};
use tracing::{debug, info, warn};

/// Host configuration
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Simulated time at startup
    pub start: Tick,
    /// Simulated ticks per host tick
    pub tick_span: TickSpan,
    /// Work allowed per host tick
    pub budget: Budget,
    pub timeline: TimelineConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            start: Tick::ZERO,
            tick_span: TickSpan::new(1),
            budget: Budget::default(),
            timeline: TimelineConfig::default(),
        }
    }
}

impl HostConfig {
    /// Fixed step of `span` ticks, wall-clock bounded per host tick
    pub fn fixed_step(span: TickSpan, frame: Duration) -> Self {
        HostConfig {
            tick_span: span,
            budget: Budget::default().with_max_time(frame),
            ..Self::default()
        }
    }

    pub fn with_start(mut self, start: Tick) -> Self {
        self.start = start;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_timeline(mut self, timeline: TimelineConfig) -> Self {
        self.timeline = timeline;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct HostStats {
    pub ticks: u64,
    pub caught_up: u64,
    pub behind: u64,
    pub last_tick_duration: Duration,
}

/// Owns a timeline and advances it once per host tick
pub struct SimHost {
    timeline: Timeline,
    config: HostConfig,
    target: Tick,
    behind: bool,
    stats: HostStats,
}

impl SimHost {
    pub fn new(config: HostConfig) -> Self {
        let timeline = Timeline::with_config(config.start, config.timeline.clone());
        info!(timeline = %timeline.id(), start = %config.start, "simulation host started");
        SimHost {
            target: config.start,
            timeline,
            config,
            behind: false,
            stats: HostStats::default(),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Schedule and inspect through the timeline between host ticks
    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    /// Horizon the host is currently trying to reach
    pub fn target(&self) -> Tick {
        self.target
    }

    /// Did the last host tick stop short of its target?
    pub fn is_behind(&self) -> bool {
        self.behind
    }

    /// One host tick. A host that fell behind retries the same horizon
    /// instead of moving further ahead. Returns whether it caught up.
    pub fn advance(&mut self) -> TimelineResult<bool> {
        if !self.behind {
            self.target = self.target.saturating_add(self.config.tick_span);
        }
        self.run()
    }

    /// One host tick towards an explicit horizon
    pub fn advance_to(&mut self, until: Tick) -> TimelineResult<bool> {
        if until < self.target {
            debug!(until = %until, current = %self.target, "horizon already passed, retrying current target");
        } else {
            self.target = until;
        }
        self.run()
    }

    fn run(&mut self) -> TimelineResult<bool> {
        let start = Instant::now();
        self.stats.ticks += 1;

        let result = self.timeline.simulate_with(self.target, self.config.budget);
        self.stats.last_tick_duration = start.elapsed();

        let caught_up = result?;
        self.behind = !caught_up;
        if caught_up {
            self.stats.caught_up += 1;
        } else {
            self.stats.behind += 1;
            warn!(
                horizon = %self.target,
                now = %self.timeline.now(),
                queued = self.timeline.queue_len(),
                "host tick ran out of budget"
            );
        }
        Ok(caught_up)
    }

    /// Tear the timeline down and stop
    pub fn shutdown(mut self) -> TeardownReport {
        let report = self.timeline.teardown();
        info!(
            ticks = self.stats.ticks,
            behind = self.stats.behind,
            torn_down = report.elements,
            "simulation host stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifesim_test::{Journal, Lifecycle, Script};
    use proptest::prelude::*;

    fn host(budget: Budget) -> SimHost {
        SimHost::new(HostConfig::default().with_budget(budget))
    }

    #[test]
    fn test_advance_moves_by_tick_span() {
        let journal = Journal::new();
        let mut host = SimHost::new(HostConfig {
            tick_span: TickSpan::new(10),
            ..HostConfig::default()
        });
        host.timeline_mut()
            .schedule(Script::new("chore").wait(15).into_element(&journal), None);

        assert!(host.advance().unwrap());
        assert_eq!(host.timeline().now(), Tick::new(10));
        assert_eq!(journal.events_for("chore"), vec![Lifecycle::Started]);

        assert!(host.advance().unwrap());
        assert_eq!(host.target(), Tick::new(20));
        assert_eq!(journal.count(&Lifecycle::Resumed(None)), 1);
        assert_eq!(host.stats().ticks, 2);
        assert_eq!(host.stats().caught_up, 2);
    }

    #[test]
    fn test_behind_host_retries_same_horizon() {
        let journal = Journal::new();
        let mut host = host(Budget::elements(10));
        for i in 0..25 {
            host.timeline_mut().schedule(
                Script::new(format!("e{i}")).into_element(&journal),
                Some(Tick::new(1)),
            );
        }

        assert!(!host.advance().unwrap());
        assert!(host.is_behind());
        assert!(!host.advance().unwrap());
        assert_eq!(host.target(), Tick::new(1));
        assert!(host.advance().unwrap());
        assert!(!host.is_behind());
        assert_eq!(journal.count(&Lifecycle::Started), 25);

        assert!(host.advance().unwrap());
        assert_eq!(host.target(), Tick::new(2));
        assert_eq!(host.stats().behind, 2);
    }

    #[test]
    fn test_advance_to_never_goes_back() {
        let mut host = host(Budget::default());
        assert!(host.advance_to(Tick::new(30)).unwrap());
        assert!(host.advance_to(Tick::new(5)).unwrap());
        assert_eq!(host.target(), Tick::new(30));
        assert_eq!(host.timeline().now(), Tick::new(30));
    }

    #[test]
    fn test_shutdown_tears_down() {
        let journal = Journal::new();
        let mut host = host(Budget::default());
        host.timeline_mut()
            .schedule(Script::new("nap").wait(100).into_element(&journal), None);
        host.advance().unwrap();

        let report = host.shutdown();
        assert_eq!(report.elements, 1);
        assert!(report.faults.is_empty());
        assert_eq!(journal.events_for("nap").last(), Some(&Lifecycle::Teardown));
    }

    #[test]
    fn test_fixed_step_preset() {
        let config = HostConfig::fixed_step(TickSpan::new(60), Duration::from_millis(5));
        assert_eq!(config.tick_span, TickSpan::new(60));
        assert_eq!(config.budget.max_time, Some(Duration::from_millis(5)));
        assert_eq!(config.start, Tick::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_behind_host_holds_its_target(
            count in 0usize..60,
            batch in 1usize..20,
            span in 1u64..4,
            steps in 1usize..30
        ) {
            let journal = Journal::new();
            let mut host = SimHost::new(HostConfig {
                tick_span: TickSpan::new(span),
                budget: Budget::elements(batch),
                ..HostConfig::default()
            });
            for i in 0..count {
                host.timeline_mut().schedule(
                    Script::new(format!("e{i}")).into_element(&journal),
                    Some(Tick::new(1)),
                );
            }

            let mut previous = host.target();
            for _ in 0..steps {
                let was_behind = host.is_behind();
                let caught_up = host.advance().unwrap();
                if was_behind {
                    prop_assert_eq!(host.target(), previous);
                } else {
                    prop_assert_eq!(host.target(), previous + TickSpan::new(span));
                }
                prop_assert_eq!(caught_up, !host.is_behind());
                prop_assert!(host.timeline().now() <= host.target());
                previous = host.target();
            }
            prop_assert_eq!(
                host.stats().caught_up + host.stats().behind,
                host.stats().ticks
            );
        }
    }
}

//! Seeded workloads
//!
//! Generates random element trees (waits, yields, inline and queued
//! children, joins, failures, self stops) plus a list of external soft and
//! hard stops, then replays them against a fresh timeline in fixed host
//! steps. Everything is derived from one `StdRng` seed.

use lifesim_core::{HandleId, Tick, TickSpan, TimelineResult};
use lifesim_timeline::{Budget, Outcome, Timeline, TimelineStats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Action, Journal, JournalEntry, Lifecycle, Script};

/// Workload shape
#[derive(Clone, Debug)]
pub struct WorkloadConfig {
    pub seed: u64,
    /// Root elements scheduled up front
    pub roots: usize,
    /// Deepest nesting of child scripts
    pub max_depth: u32,
    /// Actions per script
    pub max_actions: usize,
    /// Longest single wait, in ticks
    pub max_wait: u64,
    /// External stops applied between host steps
    pub interventions: usize,
    /// Last tick simulated
    pub horizon: u64,
    /// Ticks per host step
    pub step: u64,
    /// Elements per `simulate` call
    pub batch: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            seed: 0,
            roots: 32,
            max_depth: 3,
            max_actions: 6,
            max_wait: 8,
            interventions: 8,
            horizon: 120,
            step: 5,
            batch: 10_000,
        }
    }
}

impl WorkloadConfig {
    pub fn seeded(seed: u64) -> Self {
        WorkloadConfig {
            seed,
            ..Self::default()
        }
    }

    /// Many small roots, tiny batches
    pub fn stress(seed: u64) -> Self {
        WorkloadConfig {
            seed,
            roots: 500,
            max_depth: 4,
            interventions: 100,
            horizon: 400,
            batch: 8,
            ..Self::default()
        }
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }
}

/// External stop request against one of the roots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intervention {
    SoftStop(usize),
    HardStop(usize),
}

/// Generated roots and interventions
#[derive(Clone, Debug)]
pub struct Workload {
    pub roots: Vec<(Tick, Script)>,
    /// Sorted by tick
    pub interventions: Vec<(Tick, Intervention)>,
}

impl Workload {
    pub fn generate(config: &WorkloadConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);

        let roots = (0..config.roots)
            .map(|i| {
                let when = Tick::new(rng.gen_range(0..=config.horizon / 2));
                (when, random_script(&mut rng, format!("r{i}"), 0, config))
            })
            .collect();

        let mut interventions: Vec<(Tick, Intervention)> = (0..config.interventions)
            .map(|_| {
                let at = Tick::new(rng.gen_range(0..=config.horizon));
                let root = rng.gen_range(0..config.roots.max(1));
                let stop = if rng.gen_bool(0.5) {
                    Intervention::SoftStop(root)
                } else {
                    Intervention::HardStop(root)
                };
                (at, stop)
            })
            .collect();
        interventions.sort_by_key(|(at, _)| *at);

        Workload {
            roots,
            interventions,
        }
    }
}

fn random_script(rng: &mut StdRng, name: String, depth: u32, config: &WorkloadConfig) -> Script {
    let count = rng.gen_range(1..=config.max_actions.max(1));
    let nest = depth < config.max_depth;
    let mut script = Script::new(name.clone());

    for i in 0..count {
        let child_name = format!("{name}.{i}");
        let action = match rng.gen_range(0..100) {
            0..=34 => Action::Wait(rng.gen_range(0..=config.max_wait)),
            35..=44 => Action::Yield,
            45..=59 if nest => Action::RunChild(random_script(rng, child_name, depth + 1, config)),
            60..=74 if nest => {
                let delay = rng.gen_range(0..=config.max_wait);
                Action::SpawnChild(delay, random_script(rng, child_name, depth + 1, config))
            }
            75..=84 => Action::Join,
            85..=89 => Action::Complete(Outcome::Failure),
            90..=92 => Action::Fail(format!("{name} gave up")),
            93..=94 => Action::HardStopTree,
            _ => Action::Wait(1),
        };
        script = script.then(action);
    }
    script
}

/// Everything a replay produced
#[derive(Clone, Debug)]
pub struct WorkloadRun {
    pub journal: Vec<JournalEntry>,
    pub stats: TimelineStats,
    /// Host steps that needed more than one `simulate` call
    pub resumed_steps: u64,
    /// Elements still alive at the horizon, torn down afterwards
    pub torn_down: usize,
}

impl WorkloadRun {
    /// Elements whose journal does not end in exactly one terminal event
    pub fn unterminated(&self) -> Vec<String> {
        let mut names: Vec<&str> = self.journal.iter().map(|e| e.element.as_str()).collect();
        names.sort_unstable();
        names.dedup();

        names
            .into_iter()
            .filter(|name| {
                let terminal = self
                    .journal
                    .iter()
                    .filter(|entry| entry.element == *name)
                    .filter(|entry| is_terminal(&entry.event))
                    .count();
                terminal != 1
            })
            .map(str::to_string)
            .collect()
    }
}

fn is_terminal(event: &Lifecycle) -> bool {
    matches!(
        event,
        Lifecycle::Completed(_) | Lifecycle::HardStop | Lifecycle::Teardown
    )
}

/// Replay a generated workload on a fresh timeline
pub fn run_workload(config: &WorkloadConfig) -> TimelineResult<WorkloadRun> {
    let workload = Workload::generate(config);
    let journal = Journal::new();
    let mut timeline = Timeline::new(Tick::ZERO);

    let roots: Vec<HandleId> = workload
        .roots
        .into_iter()
        .map(|(when, script)| timeline.schedule(script.into_element(&journal), Some(when)))
        .collect();

    let budget = Budget::elements(config.batch.max(1));
    let step = TickSpan::new(config.step.max(1));
    let end = Tick::new(config.horizon);
    let mut interventions = workload.interventions.into_iter().peekable();
    let mut horizon = Tick::ZERO;
    let mut resumed_steps = 0;

    loop {
        while let Some((_, stop)) = interventions.next_if(|(at, _)| *at <= horizon) {
            apply(&mut timeline, &roots, stop)?;
        }

        let mut caught_up = timeline.simulate_with(horizon, budget)?;
        if !caught_up {
            resumed_steps += 1;
        }
        while !caught_up {
            caught_up = timeline.simulate_with(horizon, budget)?;
        }

        if horizon >= end {
            break;
        }
        horizon = horizon.saturating_add(step).min(end);
    }

    let stats = timeline.stats().clone();
    let torn_down = timeline.teardown().elements;
    tracing::debug!(seed = config.seed, torn_down, "workload replayed");

    Ok(WorkloadRun {
        journal: journal.entries(),
        stats,
        resumed_steps,
        torn_down,
    })
}

fn apply(timeline: &mut Timeline, roots: &[HandleId], stop: Intervention) -> TimelineResult<()> {
    match stop {
        Intervention::SoftStop(root) => {
            if let Some(handle) = roots.get(root) {
                timeline.soft_stop(*handle)?;
            }
        }
        Intervention::HardStop(root) => {
            if let Some(handle) = roots.get(root) {
                timeline.hard_stop(*handle)?;
            }
        }
    }
    Ok(())
}

/// Replay the workload twice and compare journals
pub fn is_deterministic(config: &WorkloadConfig) -> TimelineResult<bool> {
    let first = run_workload(config)?;
    let second = run_workload(config)?;
    Ok(first.journal == second.journal)
}

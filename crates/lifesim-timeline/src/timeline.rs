//! Timeline - drains a time-ordered queue of elements up to a horizon
//!
//! One `simulate` call:
//! 1. Rejects horizons in the past (logged, treated as caught up)
//! 2. Pops due handles in `(when, sequence)` order, skipping tombstones
//! 3. Runs each element, following inline child delegation and resuming
//!    parents as children complete, all within the same pop
//! 4. Stops early when the element count or wall-clock budget runs out
//! 5. Compacts the queue when tombstones dominate it
//! 6. Advances `now` to the horizon if everything due was drained

use std::time::{Duration, Instant};

use lifesim_core::{ElementFault, HandleId, Tick, TimelineError, TimelineId, TimelineResult};
use tracing::{debug, trace, warn};

use crate::handle::{HandleArena, HandleRecord};
use crate::{
    Budget, CallbackId, CallbackList, Context, Element, EventQueue, Outcome, QueueEntry,
    SequenceCounter, Step, TimelineConfig,
};

/// Counters for one timeline
#[derive(Clone, Debug, Default)]
pub struct TimelineStats {
    pub simulate_calls: u64,
    pub elements_run: u64,
    pub early_exits: u64,
    pub compactions: u64,
    pub hard_stops: u64,
    pub faults: u64,
    pub last_simulate: Duration,
}

/// Deterministic, single-threaded cooperative scheduler
pub struct Timeline {
    pub(crate) id: TimelineId,
    pub(crate) now: Tick,
    horizon: Tick,
    pub(crate) queue: EventQueue,
    sequence: SequenceCounter,
    /// Dead entries currently sitting in `queue`
    pub(crate) tombstones: usize,
    pub(crate) handles: HandleArena,
    pub(crate) active: Option<HandleId>,
    pub(crate) pending_child: Option<HandleId>,
    pub(crate) pending_hard_stop: bool,
    pub(crate) simulating: bool,
    pub(crate) config: TimelineConfig,
    on_time_advanced: CallbackList<Tick>,
    on_simulate: CallbackList<Tick>,
    pub(crate) stats: TimelineStats,
}

impl Timeline {
    /// Create a timeline starting at `start` with default configuration
    pub fn new(start: Tick) -> Self {
        Self::with_config(start, TimelineConfig::default())
    }

    pub fn with_config(start: Tick, config: TimelineConfig) -> Self {
        let id = TimelineId::next();
        Timeline {
            id,
            now: start,
            horizon: start,
            queue: EventQueue::new(),
            sequence: SequenceCounter::new(),
            tombstones: 0,
            handles: HandleArena::new(id),
            active: None,
            pending_child: None,
            pending_hard_stop: false,
            simulating: false,
            config,
            on_time_advanced: CallbackList::new(),
            on_simulate: CallbackList::new(),
            stats: TimelineStats::default(),
        }
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    /// Time up to which the last `simulate` call was asked to drain
    pub fn horizon(&self) -> Tick {
        self.horizon
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &TimelineStats {
        &self.stats
    }

    /// Queue entries, tombstones included
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// Elements currently owned by this timeline
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Handle of the element inside a start/resume call, if any
    pub fn active(&self) -> Option<HandleId> {
        self.active
    }

    pub fn is_alive(&self, handle: HandleId) -> bool {
        self.handles.contains(handle)
    }

    pub fn is_scheduled(&self, handle: HandleId) -> bool {
        self.handles.get(handle).is_some_and(|record| record.pending)
    }

    pub fn scheduled_at(&self, handle: HandleId) -> Option<Tick> {
        self.handles
            .get(handle)
            .filter(|record| record.pending)
            .map(|record| record.when)
    }

    pub fn parent_of(&self, handle: HandleId) -> Option<HandleId> {
        self.handles.get(handle).and_then(|record| record.parent)
    }

    pub fn children_of(&self, handle: HandleId) -> Vec<HandleId> {
        self.handles
            .get(handle)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    pub fn element_name(&self, handle: HandleId) -> Option<&str> {
        self.handles.get(handle).map(|record| record.name.as_str())
    }

    /// Fired with the new `now` whenever simulated time moves to a due
    /// entry, and once more with the horizon when a `simulate` call catches
    /// up, even if `now` already equals it
    pub fn on_time_advanced(&mut self, callback: impl FnMut(Tick) + 'static) -> CallbackId {
        self.on_time_advanced.register(callback)
    }

    pub fn remove_time_advanced(&mut self, id: CallbackId) -> bool {
        self.on_time_advanced.remove(id)
    }

    /// Fired with the requested horizon once per accepted `simulate` call
    pub fn on_simulate(&mut self, callback: impl FnMut(Tick) + 'static) -> CallbackId {
        self.on_simulate.register(callback)
    }

    pub fn remove_on_simulate(&mut self, id: CallbackId) -> bool {
        self.on_simulate.remove(id)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Queue a new root element at `when` (defaults to `now`)
    pub fn schedule<E: Element + 'static>(&mut self, element: E, when: Option<Tick>) -> HandleId {
        self.schedule_boxed(Box::new(element), when)
    }

    pub fn schedule_boxed(&mut self, element: Box<dyn Element>, when: Option<Tick>) -> HandleId {
        let handle = self.insert(element, None);
        let when = when.unwrap_or(self.now);
        self.enqueue(handle, when, false);
        handle
    }

    /// Queue a new root element for the current tick, ahead of every
    /// normally scheduled element due at that tick
    pub fn schedule_asap<E: Element + 'static>(&mut self, element: E) -> HandleId {
        let handle = self.insert(Box::new(element), None);
        let now = self.now;
        self.enqueue(handle, now, true);
        handle
    }

    /// Delegate to a child that runs inline, right after the running
    /// element returns, without going through the queue. A pending inline
    /// child takes precedence over the returned step: a `Completed` outcome
    /// is dropped and the element resumes with the child's outcome instead.
    pub fn run_child<E: Element + 'static>(&mut self, element: E) -> TimelineResult<HandleId> {
        self.run_child_boxed(Box::new(element))
    }

    pub fn run_child_boxed(&mut self, element: Box<dyn Element>) -> TimelineResult<HandleId> {
        let parent = self.active.ok_or(TimelineError::NoActiveElement)?;
        if self.pending_child.is_some() {
            return Err(TimelineError::ChildAlreadyPending);
        }
        let child = self.insert(element, Some(parent));
        self.pending_child = Some(child);
        Ok(child)
    }

    /// Queue a child of the running element at `when` (defaults to `now`)
    pub fn schedule_child<E: Element + 'static>(
        &mut self,
        element: E,
        when: Option<Tick>,
    ) -> TimelineResult<HandleId> {
        let parent = self.active.ok_or(TimelineError::NoActiveElement)?;
        let child = self.insert(Box::new(element), Some(parent));
        let when = when.unwrap_or(self.now);
        self.enqueue(child, when, false);
        Ok(child)
    }

    /// Move a handle to `when`. The handle keeps its identity; its old
    /// queue slot becomes a tombstone.
    pub fn reschedule(&mut self, handle: HandleId, when: Tick) -> TimelineResult<()> {
        self.check_requeue(handle)?;
        if self
            .handles
            .get(handle)
            .is_some_and(|record| record.pending && record.when == when)
        {
            return Ok(());
        }
        self.enqueue(handle, when, false);
        Ok(())
    }

    /// Move a handle to the current tick with ASAP priority
    pub fn reschedule_asap(&mut self, handle: HandleId) -> TimelineResult<()> {
        self.check_requeue(handle)?;
        let now = self.now;
        self.enqueue(handle, now, true);
        Ok(())
    }

    fn check_requeue(&self, handle: HandleId) -> TimelineResult<()> {
        self.check_owner(handle)?;
        if self.pending_hard_stop && self.active == Some(handle) {
            return Err(TimelineError::HardStopPending);
        }
        if !self.handles.contains(handle) {
            return Err(TimelineError::StaleHandle(handle));
        }
        Ok(())
    }

    pub(crate) fn check_owner(&self, handle: HandleId) -> TimelineResult<()> {
        if handle.timeline != self.id {
            return Err(TimelineError::ForeignHandle {
                handle,
                owner: handle.timeline,
                timeline: self.id,
            });
        }
        Ok(())
    }

    fn insert(&mut self, element: Box<dyn Element>, parent: Option<HandleId>) -> HandleId {
        let handle = self
            .handles
            .insert(HandleRecord::new(element, parent, self.now));
        if let Some(parent) = parent {
            if let Some(record) = self.handles.get_mut(parent) {
                record.children.push(handle);
            }
        }
        handle
    }

    fn enqueue(&mut self, handle: HandleId, when: Tick, asap: bool) {
        let when = if when < self.now {
            trace!(timeline = %self.id, handle = %handle, when = %when, "scheduled in the past, running now");
            self.now
        } else {
            when
        };
        let sequence = if asap {
            self.sequence.next_asap()
        } else {
            self.sequence.next_normal()
        };
        let Some(record) = self.handles.get_mut(handle) else {
            return;
        };
        if record.pending {
            // the previous entry stays in the heap as a placeholder
            self.tombstones += 1;
        }
        record.when = when;
        record.sequence = sequence;
        record.pending = true;
        self.queue.push(QueueEntry {
            when,
            sequence,
            handle,
        });
    }

    // ------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------

    /// Drain everything due up to `until` with the configured budget.
    /// Returns whether `until` was fully reached.
    pub fn simulate(&mut self, until: Tick) -> TimelineResult<bool> {
        let budget = self.config.budget();
        self.simulate_with(until, budget)
    }

    pub fn simulate_with(&mut self, until: Tick, budget: Budget) -> TimelineResult<bool> {
        if self.simulating {
            return Err(TimelineError::Reentrant(self.id));
        }
        if until < self.horizon {
            let misuse = TimelineError::TimeInPast {
                until,
                horizon: self.horizon,
            };
            warn!(timeline = %self.id, error = %misuse, "ignoring simulate request");
            return Ok(true);
        }

        self.horizon = until;
        self.on_simulate.fire(until);

        let started = Instant::now();
        self.simulating = true;
        let result = self.drain(until, budget, started);
        self.simulating = false;

        self.stats.simulate_calls += 1;
        self.stats.last_simulate = started.elapsed();
        result
    }

    fn drain(&mut self, until: Tick, budget: Budget, started: Instant) -> TimelineResult<bool> {
        let mut processed = 0usize;
        let mut early_exit = false;
        let mut failure = None;

        while let Some(entry) = self.next_due(until) {
            let out_of_time = budget
                .max_time
                .is_some_and(|limit| started.elapsed() > limit);
            if processed >= budget.max_elements || out_of_time {
                early_exit = true;
                break;
            }

            self.queue.pop_min();
            if self.now != entry.when {
                self.now = entry.when;
                self.on_time_advanced.fire(entry.when);
            }
            if let Some(record) = self.handles.get_mut(entry.handle) {
                record.pending = false;
            }

            processed += 1;
            self.stats.elements_run += 1;
            if let Err(err) = self.run_handle(entry.handle) {
                failure = Some(err);
                break;
            }
        }

        self.maybe_compact();

        if let Some(err) = failure {
            return Err(err);
        }
        if early_exit {
            self.stats.early_exits += 1;
            debug!(timeline = %self.id, processed, until = %until, "simulate paused before horizon");
            return Ok(false);
        }
        self.now = until;
        self.on_time_advanced.fire(until);
        Ok(true)
    }

    /// Peek the next live entry due by `until`, discarding tombstones on the way
    fn next_due(&mut self, until: Tick) -> Option<QueueEntry> {
        loop {
            let entry = *self.queue.peek_min()?;
            if entry.when > until {
                return None;
            }
            if is_live(&self.handles, &entry) {
                return Some(entry);
            }
            self.queue.pop_min();
            self.tombstones = self.tombstones.saturating_sub(1);
        }
    }

    /// Run one popped handle and everything it hands control to in the same step
    fn run_handle(&mut self, handle: HandleId) -> TimelineResult<()> {
        let mut current = handle;
        let mut input = None;

        loop {
            let Some(step) = self.invoke(current, input.take()) else {
                return Ok(());
            };

            if self.pending_hard_stop || matches!(step, Step::PendingStop) {
                if !self.pending_hard_stop {
                    debug!(timeline = %self.id, handle = %current, "element unwound without a pending stop, stopping its tree");
                }
                self.pending_hard_stop = false;
                self.pending_child = None;
                return self.hard_stop(current).map(|_| ());
            }

            if !matches!(step, Step::Completed(_)) {
                self.deliver_deferred_soft_stop(current);
            }

            let step = match step {
                Step::Failed(fault) => {
                    self.pending_child = None;
                    return self.fail_element(current, fault);
                }
                other => other,
            };

            if let Some(child) = self.pending_child.take() {
                match &step {
                    Step::SuspendedOnChild(named) if *named != child => {
                        warn!(timeline = %self.id, handle = %current, named = %named, child = %child, "step names a different inline child");
                    }
                    Step::Completed(outcome) => {
                        debug!(timeline = %self.id, handle = %current, ?outcome, "outcome ignored, inline child runs first");
                    }
                    _ => {}
                }
                trace!(timeline = %self.id, parent = %current, child = %child, "delegating inline");
                current = child;
                continue;
            }

            let Some(record) = self.handles.get(current) else {
                return Ok(());
            };
            if record.pending {
                return Ok(());
            }
            // Suspended elements wait for queued children or an external wake
            let Step::Completed(outcome) = step else {
                return Ok(());
            };

            match self.complete(current, outcome)? {
                Some(parent) => {
                    current = parent;
                    input = Some(outcome);
                }
                None => return Ok(()),
            }
        }
    }

    /// Check the element out of its slot and call start or resume
    fn invoke(&mut self, handle: HandleId, input: Option<Outcome>) -> Option<Step> {
        let record = self.handles.get_mut(handle)?;
        let mut element = record.element.take()?;
        let first = !record.started;
        record.started = true;
        trace!(timeline = %self.id, handle = %handle, element = %record.name, first, "running element");

        self.active = Some(handle);
        let step = {
            let mut ctx = Context::new(self, handle);
            if first {
                element.start(&mut ctx)
            } else {
                element.resume(&mut ctx, input)
            }
        };
        self.active = None;

        if let Some(record) = self.handles.get_mut(handle) {
            record.element = Some(element);
        }
        Some(step)
    }

    /// Retire a completed element and hand its outcome to the parent.
    /// Returns the parent if it should resume now.
    fn complete(&mut self, handle: HandleId, outcome: Outcome) -> TimelineResult<Option<HandleId>> {
        let leftovers = self.children_of(handle);
        let mut faults = Vec::new();
        for child in leftovers {
            let tree = self.collect_tree(child);
            let (_, child_faults) = self.destroy(tree, crate::stop::Destroy::HardStop);
            faults.extend(child_faults);
        }

        let parent = self.tombstone(handle).and_then(|record| record.parent);
        trace!(timeline = %self.id, handle = %handle, ?outcome, "element completed");
        self.report_stop_faults(faults)?;

        let Some(parent) = parent else {
            return Ok(None);
        };
        let Some(record) = self.handles.get_mut(parent) else {
            return Ok(None);
        };
        let Some(element) = record.element.as_mut() else {
            return Ok(None);
        };
        element.child_returned(handle, outcome);
        let resume = !record.pending && record.children.is_empty();
        Ok(resume.then_some(parent))
    }

    fn fail_element(&mut self, handle: HandleId, fault: ElementFault) -> TimelineResult<()> {
        let element = self
            .element_name(handle)
            .map(str::to_string)
            .unwrap_or_default();
        let err = TimelineError::ElementFailed {
            element,
            at: self.now,
            source: fault,
        };
        self.stats.faults += 1;
        let propagate = self.config.fault_policy.report(self.id, &err);

        // never leave a half-built tree behind the failing element
        let stopped = self.hard_stop(handle);
        if propagate {
            return Err(err);
        }
        stopped.map(|_| ())
    }

    fn maybe_compact(&mut self) {
        if self.tombstones <= self.config.compaction_floor || self.tombstones <= self.queue.len() / 2 {
            return;
        }
        let handles = &self.handles;
        let removed = self.queue.retain(|entry| is_live(handles, entry));
        self.tombstones = 0;
        self.handles.rebuild_free_list();
        self.stats.compactions += 1;
        debug!(timeline = %self.id, removed, remaining = self.queue.len(), "compacted event queue");
    }
}

/// An entry is live while its handle exists, is queued, and still points at it
fn is_live(handles: &HandleArena, entry: &QueueEntry) -> bool {
    handles
        .get(entry.handle)
        .is_some_and(|record| record.pending && record.sequence == entry.sequence)
}

impl Drop for Timeline {
    fn drop(&mut self) {
        if !self.handles.is_empty() && !self.simulating {
            debug!(timeline = %self.id, live = self.handles.len(), "tearing down timeline on drop");
            self.teardown();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small recording elements shared by the unit tests of this crate

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::StopRequest;

    pub type Log = Rc<RefCell<Vec<String>>>;

    pub fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    pub fn entries(log: &Log) -> Vec<String> {
        log.borrow().clone()
    }

    /// Records `start:<name>` and completes
    pub struct Once {
        pub name: &'static str,
        pub log: Log,
    }

    impl Element for Once {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&mut self, _ctx: &mut Context<'_>) -> Step {
            self.log.borrow_mut().push(format!("start:{}", self.name));
            Step::done()
        }

        fn hard_stop(&mut self) -> Result<(), ElementFault> {
            self.log.borrow_mut().push(format!("hard:{}", self.name));
            Ok(())
        }

        fn teardown(&mut self) -> Result<(), ElementFault> {
            self.log.borrow_mut().push(format!("teardown:{}", self.name));
            Ok(())
        }
    }

    /// Wakes itself every `period` ticks, forever
    pub struct Ticker {
        pub name: &'static str,
        pub period: u64,
        pub log: Log,
    }

    impl Element for Ticker {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&mut self, ctx: &mut Context<'_>) -> Step {
            self.resume(ctx, None)
        }

        fn resume(&mut self, ctx: &mut Context<'_>, _child: Option<Outcome>) -> Step {
            self.log
                .borrow_mut()
                .push(format!("tick:{}@{}", self.name, ctx.now()));
            let next = ctx.now() + lifesim_core::TickSpan::new(self.period);
            match ctx.reschedule_self(next) {
                Ok(()) => Step::Suspended,
                Err(err) => Step::Failed(err.into()),
            }
        }

        fn soft_stop(&mut self, _stop: &mut StopRequest<'_>) -> bool {
            self.log.borrow_mut().push(format!("soft:{}", self.name));
            false
        }

        fn hard_stop(&mut self) -> Result<(), ElementFault> {
            self.log.borrow_mut().push(format!("hard:{}", self.name));
            Ok(())
        }

        fn teardown(&mut self) -> Result<(), ElementFault> {
            self.log.borrow_mut().push(format!("teardown:{}", self.name));
            Ok(())
        }
    }

    /// Runs `child` inline, then completes with the child's outcome
    pub struct Delegate {
        pub name: &'static str,
        pub child: Option<Box<dyn Element>>,
        pub log: Log,
    }

    impl Element for Delegate {
        fn name(&self) -> &str {
            self.name
        }

        fn start(&mut self, ctx: &mut Context<'_>) -> Step {
            self.log.borrow_mut().push(format!("start:{}", self.name));
            match self.child.take() {
                Some(child) => match ctx.run_child_boxed(child) {
                    Ok(handle) => Step::SuspendedOnChild(handle),
                    Err(err) => Step::Failed(err.into()),
                },
                None => Step::done(),
            }
        }

        fn resume(&mut self, _ctx: &mut Context<'_>, child: Option<Outcome>) -> Step {
            self.log
                .borrow_mut()
                .push(format!("resume:{}:{:?}", self.name, child));
            Step::Completed(child.unwrap_or(Outcome::Success))
        }

        fn soft_stop(&mut self, _stop: &mut StopRequest<'_>) -> bool {
            self.log.borrow_mut().push(format!("soft:{}", self.name));
            false
        }

        fn hard_stop(&mut self) -> Result<(), ElementFault> {
            self.log.borrow_mut().push(format!("hard:{}", self.name));
            Ok(())
        }
    }
}

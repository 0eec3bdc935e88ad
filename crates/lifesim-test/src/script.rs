//! Scripted elements
//!
//! A [`Script`] is a named list of [`Action`]s. Turned into a
//! [`ScriptedElement`] it plays the actions back one by one, suspending
//! where an action waits and journaling every hook call.
//!
//! A soft stop makes the element wake at once and finish with
//! `Outcome::Failure` on its next activation.

use std::collections::VecDeque;

use lifesim_core::{ElementFault, HandleId, Tick, TickSpan};
use lifesim_timeline::{Context, Element, HardStop, Outcome, Step, StopRequest};

use crate::{Journal, Lifecycle};

/// One scripted step
#[derive(Clone, Debug)]
pub enum Action {
    /// Suspend and wake `n` ticks later
    Wait(u64),
    /// Suspend and wake again at the current tick, ASAP
    Yield,
    /// Run a child inline and wait for its outcome
    RunChild(Script),
    /// Queue a child `n` ticks from now and carry on
    SpawnChild(u64, Script),
    /// Wait until every queued child has returned
    Join,
    /// Run a script to completion on an isolated sub-timeline
    Isolated(Script),
    /// Hard-stop the tree this element belongs to
    HardStopTree,
    Complete(Outcome),
    Fail(String),
}

/// Named action list
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Script {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn wait(self, ticks: u64) -> Self {
        self.then(Action::Wait(ticks))
    }

    pub fn run_child(self, child: Script) -> Self {
        self.then(Action::RunChild(child))
    }

    pub fn spawn(self, delay: u64, child: Script) -> Self {
        self.then(Action::SpawnChild(delay, child))
    }

    pub fn join(self) -> Self {
        self.then(Action::Join)
    }

    pub fn complete(self, outcome: Outcome) -> Self {
        self.then(Action::Complete(outcome))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.then(Action::Fail(message.into()))
    }

    pub fn into_element(self, journal: &Journal) -> ScriptedElement {
        ScriptedElement::new(self, journal.clone())
    }
}

/// Element that plays back a [`Script`]
pub struct ScriptedElement {
    name: String,
    actions: VecDeque<Action>,
    journal: Journal,
    seen: Tick,
    linked: Vec<HandleId>,
}

impl ScriptedElement {
    pub fn new(script: Script, journal: Journal) -> Self {
        ScriptedElement {
            name: script.name,
            actions: script.actions.into(),
            journal,
            seen: Tick::ZERO,
            linked: Vec::new(),
        }
    }

    /// Report `handle` as part of this element's tree for stop purposes
    pub fn link(mut self, handle: HandleId) -> Self {
        self.linked.push(handle);
        self
    }

    fn record(&self, event: Lifecycle) {
        self.journal.record(self.seen, &self.name, event);
    }

    fn finish(&self, outcome: Outcome) -> Step {
        self.record(Lifecycle::Completed(outcome));
        Step::Completed(outcome)
    }

    fn play(&mut self, ctx: &mut Context<'_>) -> Step {
        if ctx.is_stop_requested() {
            return self.finish(Outcome::Failure);
        }

        while let Some(action) = self.actions.pop_front() {
            match action {
                Action::Wait(ticks) => {
                    let when = ctx.now() + TickSpan::new(ticks);
                    return self.suspend(ctx.reschedule_self(when));
                }
                Action::Yield => return self.suspend(ctx.reschedule_self_asap()),
                Action::RunChild(script) => {
                    return match ctx.run_child(script.into_element(&self.journal)) {
                        Ok(child) => Step::SuspendedOnChild(child),
                        Err(err) => self.fault(err.into()),
                    };
                }
                Action::SpawnChild(delay, script) => {
                    let when = ctx.now() + TickSpan::new(delay);
                    if let Err(err) = ctx.schedule_child(script.into_element(&self.journal), Some(when)) {
                        return self.fault(err.into());
                    }
                }
                Action::Join => {
                    let me = ctx.handle();
                    if !ctx.children_of(me).is_empty() {
                        return Step::Suspended;
                    }
                }
                Action::Isolated(script) => {
                    if let Err(err) = ctx.run_isolated(script.into_element(&self.journal)) {
                        return self.fault(err.into());
                    }
                }
                Action::HardStopTree => {
                    let me = ctx.handle();
                    match ctx.hard_stop(me) {
                        Ok(HardStop::Deferred) => return Step::PendingStop,
                        Ok(_) => {}
                        Err(err) => return self.fault(err.into()),
                    }
                }
                Action::Complete(outcome) => return self.finish(outcome),
                Action::Fail(message) => return self.fault(ElementFault::new(message)),
            }
        }
        self.finish(Outcome::Success)
    }

    fn suspend(&self, requeued: lifesim_core::TimelineResult<()>) -> Step {
        match requeued {
            Ok(()) => Step::Suspended,
            Err(err) => self.fault(err.into()),
        }
    }

    fn fault(&self, fault: ElementFault) -> Step {
        self.record(Lifecycle::Failed);
        Step::Failed(fault)
    }
}

impl Element for ScriptedElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ctx: &mut Context<'_>) -> Step {
        self.seen = ctx.now();
        self.record(Lifecycle::Started);
        self.play(ctx)
    }

    fn resume(&mut self, ctx: &mut Context<'_>, child: Option<Outcome>) -> Step {
        self.seen = ctx.now();
        self.record(Lifecycle::Resumed(child));
        self.play(ctx)
    }

    fn child_returned(&mut self, _child: HandleId, outcome: Outcome) {
        self.record(Lifecycle::ChildReturned(outcome));
    }

    fn soft_stop(&mut self, stop: &mut StopRequest<'_>) -> bool {
        self.seen = stop.now();
        self.record(Lifecycle::SoftStop);
        if let Err(err) = stop.wake_now() {
            tracing::debug!(element = %self.name, error = %err, "could not wake for soft stop");
        }
        false
    }

    fn hard_stop(&mut self) -> Result<(), ElementFault> {
        self.record(Lifecycle::HardStop);
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), ElementFault> {
        self.record(Lifecycle::Teardown);
        Ok(())
    }

    fn child_handles(&self) -> Vec<HandleId> {
        self.linked.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifesim_timeline::Timeline;

    fn run(script: Script, until: u64) -> (Timeline, Journal) {
        let journal = Journal::new();
        let mut tl = Timeline::new(Tick::ZERO);
        tl.schedule(script.into_element(&journal), None);
        tl.simulate(Tick::new(until)).unwrap();
        (tl, journal)
    }

    #[test]
    fn test_waits_then_completes() {
        let (tl, journal) = run(Script::new("nap").wait(3).wait(2), 10);
        assert_eq!(
            journal.events_for("nap"),
            vec![
                Lifecycle::Started,
                Lifecycle::Resumed(None),
                Lifecycle::Resumed(None),
                Lifecycle::Completed(Outcome::Success),
            ]
        );
        let last = journal.entries().last().map(|entry| entry.at);
        assert_eq!(last, Some(Tick::new(5)));
        assert_eq!(tl.live_handles(), 0);
    }

    #[test]
    fn test_inline_child_outcome_flows_up() {
        let child = Script::new("eat").wait(1).complete(Outcome::Failure);
        let (_, journal) = run(Script::new("hungry").run_child(child), 5);

        assert_eq!(
            journal.events_for("hungry"),
            vec![
                Lifecycle::Started,
                Lifecycle::ChildReturned(Outcome::Failure),
                Lifecycle::Resumed(Some(Outcome::Failure)),
                Lifecycle::Completed(Outcome::Success),
            ]
        );
    }

    #[test]
    fn test_join_waits_for_all_spawned_children() {
        let script = Script::new("party")
            .spawn(2, Script::new("guest-a"))
            .spawn(4, Script::new("guest-b"))
            .join()
            .complete(Outcome::Success);
        let (_, journal) = run(script, 10);

        let party = journal.events_for("party");
        assert_eq!(party.first(), Some(&Lifecycle::Started));
        assert_eq!(party.last(), Some(&Lifecycle::Completed(Outcome::Success)));
        assert_eq!(journal.count(&Lifecycle::ChildReturned(Outcome::Success)), 2);
        let done = journal
            .entries()
            .into_iter()
            .find(|entry| entry.element == "party" && matches!(entry.event, Lifecycle::Completed(_)))
            .map(|entry| entry.at);
        assert_eq!(done, Some(Tick::new(4)));
    }

    #[test]
    fn test_soft_stop_finishes_with_failure() {
        let journal = Journal::new();
        let mut tl = Timeline::new(Tick::ZERO);
        let handle = tl.schedule(Script::new("sleep").wait(100).into_element(&journal), None);
        tl.simulate(Tick::new(1)).unwrap();

        tl.soft_stop(handle).unwrap();
        tl.simulate(Tick::new(2)).unwrap();
        assert_eq!(
            journal.events_for("sleep"),
            vec![
                Lifecycle::Started,
                Lifecycle::SoftStop,
                Lifecycle::Resumed(None),
                Lifecycle::Completed(Outcome::Failure),
            ]
        );
        assert!(!tl.is_alive(handle));
    }

    #[test]
    fn test_hard_stop_tree_from_inside() {
        let child = Script::new("child").then(Action::HardStopTree).wait(5);
        let (tl, journal) = run(Script::new("parent").run_child(child), 10);

        assert_eq!(journal.elements_with(&Lifecycle::HardStop), vec!["child", "parent"]);
        assert_eq!(journal.count(&Lifecycle::Completed(Outcome::Success)), 0);
        assert_eq!(tl.live_handles(), 0);
    }

    #[test]
    fn test_failure_is_journaled() {
        let (tl, journal) = run(Script::new("bad").wait(1).fail("no path"), 3);
        assert_eq!(journal.events_for("bad").last(), Some(&Lifecycle::HardStop));
        assert_eq!(journal.count(&Lifecycle::Failed), 1);
        assert_eq!(tl.stats().faults, 1);
    }

    #[test]
    fn test_linked_handle_joins_the_stop_tree() {
        let journal = Journal::new();
        let mut tl = Timeline::new(Tick::ZERO);
        let helper = tl.schedule(Script::new("helper").wait(50).into_element(&journal), None);
        let owner = tl.schedule(
            Script::new("owner").wait(50).into_element(&journal).link(helper),
            None,
        );
        tl.simulate(Tick::ZERO).unwrap();

        tl.hard_stop(owner).unwrap();
        assert_eq!(journal.elements_with(&Lifecycle::HardStop), vec!["helper", "owner"]);
        assert!(!tl.is_alive(helper));
    }

    #[test]
    fn test_isolated_script_runs_on_the_spot() {
        let script = Script::new("plan")
            .then(Action::Isolated(Script::new("probe")))
            .wait(1);
        let (_tl, journal) = run(script, 0);
        assert_eq!(
            journal.events_for("probe"),
            vec![Lifecycle::Started, Lifecycle::Completed(Outcome::Success)]
        );
        assert_eq!(journal.events_for("plan"), vec![Lifecycle::Started]);
    }
}

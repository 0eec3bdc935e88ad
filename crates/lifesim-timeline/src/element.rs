//! Element contract
//!
//! An element is a suspendable unit of domain work. The timeline drives it
//! through hooks and reads back an explicit [`Step`] telling the scheduler
//! what happened: finished, waiting, delegating to an inline child, failed,
//! or unwinding for a deferred hard stop.

use std::ops::{Deref, DerefMut};

use lifesim_core::{ElementFault, HandleId, Tick, TimelineResult};

use crate::Timeline;

/// Result value an element hands back to its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    #[inline]
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// What a start/resume call left behind
#[derive(Debug)]
pub enum Step {
    /// The element is finished; its parent resumes with this outcome
    Completed(Outcome),
    /// Waiting: rescheduled itself, queued children, or expects an external wake
    Suspended,
    /// Delegated to an inline child created with `run_child`. The scheduler
    /// runs whichever child `run_child` registered last; the handle here is
    /// only checked against it.
    SuspendedOnChild(HandleId),
    /// Real fault; the element's tree is hard-stopped after reporting
    Failed(ElementFault),
    /// A hard stop hit the running element; unwind and let the scheduler stop it
    PendingStop,
}

impl Step {
    /// Completed successfully
    pub fn done() -> Self {
        Step::Completed(Outcome::Success)
    }

    pub fn from_result(result: Result<Outcome, ElementFault>) -> Self {
        match result {
            Ok(outcome) => Step::Completed(outcome),
            Err(fault) => Step::Failed(fault),
        }
    }
}

/// Suspendable unit of work driven by a [`Timeline`]
///
/// Elements are owned by the timeline once scheduled. Domain code keeps
/// only [`HandleId`]s, which go inert when the element is destroyed.
pub trait Element {
    /// Label used in logs and fault reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// First activation
    fn start(&mut self, ctx: &mut Context<'_>) -> Step;

    /// Later activations. `child` carries the outcome of the child that
    /// just returned, or `None` when the element was woken from the queue.
    fn resume(&mut self, ctx: &mut Context<'_>, child: Option<Outcome>) -> Step {
        let _ = ctx;
        Step::Completed(child.unwrap_or(Outcome::Success))
    }

    /// A child finished and was detached from this element
    fn child_returned(&mut self, child: HandleId, outcome: Outcome) {
        let _ = (child, outcome);
    }

    /// Cooperative stop. Return true if this element already forwarded the
    /// stop to its own children; otherwise the scheduler descends into them.
    fn soft_stop(&mut self, stop: &mut StopRequest<'_>) -> bool {
        let _ = stop;
        false
    }

    /// Forced stop; the element is dropped right after
    fn hard_stop(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    /// Timeline teardown; the element is dropped right after
    fn teardown(&mut self) -> Result<(), ElementFault> {
        Ok(())
    }

    /// Handles this element considers part of its tree besides the
    /// children the scheduler recorded for it
    fn child_handles(&self) -> Vec<HandleId> {
        Vec::new()
    }
}

/// Access to the timeline from inside start/resume
///
/// Dereferences to the [`Timeline`], so every scheduling operation is
/// available; adds the operations that act on the running element itself.
pub struct Context<'t> {
    timeline: &'t mut Timeline,
    handle: HandleId,
}

impl<'t> Context<'t> {
    pub(crate) fn new(timeline: &'t mut Timeline, handle: HandleId) -> Self {
        Context { timeline, handle }
    }

    /// Handle of the running element
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Queue the running element again, reusing its handle
    pub fn reschedule_self(&mut self, when: Tick) -> TimelineResult<()> {
        self.timeline.reschedule(self.handle, when)
    }

    /// Queue the running element again for the current tick, ahead of
    /// normally scheduled work
    pub fn reschedule_self_asap(&mut self) -> TimelineResult<()> {
        self.timeline.reschedule_asap(self.handle)
    }

    /// Has a soft stop reached this element?
    pub fn is_stop_requested(&self) -> bool {
        self.timeline.stop_requested(self.handle)
    }
}

impl Deref for Context<'_> {
    type Target = Timeline;

    fn deref(&self) -> &Timeline {
        self.timeline
    }
}

impl DerefMut for Context<'_> {
    fn deref_mut(&mut self) -> &mut Timeline {
        self.timeline
    }
}

/// Access to the timeline from inside the cooperative-stop hook
pub struct StopRequest<'t> {
    timeline: &'t mut Timeline,
    handle: HandleId,
}

impl<'t> StopRequest<'t> {
    pub(crate) fn new(timeline: &'t mut Timeline, handle: HandleId) -> Self {
        StopRequest { timeline, handle }
    }

    /// Handle of the element being stopped
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn now(&self) -> Tick {
        self.timeline.now()
    }

    /// Wake the element at `when` so it can wind down
    pub fn wake_at(&mut self, when: Tick) -> TimelineResult<()> {
        self.timeline.reschedule(self.handle, when)
    }

    /// Wake the element as soon as possible
    pub fn wake_now(&mut self) -> TimelineResult<()> {
        self.timeline.reschedule_asap(self.handle)
    }
}

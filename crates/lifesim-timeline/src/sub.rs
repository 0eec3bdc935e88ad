//! Sub-timelines
//!
//! A sub-timeline starts at its parent's `now` with a copy of the parent's
//! configuration (fault policy included). It never touches the parent's
//! queue, so it can run a piece of work to completion on the spot.

use std::cell::Cell;
use std::rc::Rc;

use lifesim_core::TimelineResult;
use tracing::debug;

use crate::{Context, Element, Outcome, Step, Timeline};

impl Timeline {
    /// Fresh, independent timeline aligned with this one
    pub fn sub_timeline(&self) -> Timeline {
        let sub = Timeline::with_config(self.now, self.config.clone());
        debug!(parent = %self.id, sub = %sub.id(), now = %self.now, "created sub-timeline");
        sub
    }

    /// Run `element` on a throwaway sub-timeline up to the current tick.
    ///
    /// Returns the element's outcome, or `None` if it was still waiting on
    /// future ticks (anything left over is torn down).
    pub fn run_isolated<E: Element + 'static>(&self, element: E) -> TimelineResult<Option<Outcome>> {
        let mut sub = self.sub_timeline();
        let slot = Rc::new(Cell::new(None));
        sub.schedule(
            Capture {
                inner: Some(Box::new(element)),
                slot: Rc::clone(&slot),
            },
            None,
        );

        let now = sub.now();
        let result = sub.simulate(now);
        let leftover = sub.teardown();
        if !leftover.is_empty() {
            debug!(sub = %sub.id(), elements = leftover.elements, "isolated run left unfinished work");
        }
        result?;
        Ok(slot.get())
    }
}

/// Runs the wrapped element inline and records how it finished
struct Capture {
    inner: Option<Box<dyn Element>>,
    slot: Rc<Cell<Option<Outcome>>>,
}

impl Element for Capture {
    fn name(&self) -> &str {
        "isolated"
    }

    fn start(&mut self, ctx: &mut Context<'_>) -> Step {
        let Some(inner) = self.inner.take() else {
            return Step::done();
        };
        match ctx.run_child_boxed(inner) {
            Ok(child) => Step::SuspendedOnChild(child),
            Err(err) => Step::Failed(err.into()),
        }
    }

    fn resume(&mut self, _ctx: &mut Context<'_>, child: Option<Outcome>) -> Step {
        let outcome = child.unwrap_or(Outcome::Success);
        self.slot.set(Some(outcome));
        Step::Completed(outcome)
    }
}

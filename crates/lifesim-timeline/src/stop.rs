//! Stop protocols
//!
//! - Soft stop: each element in a tree is asked once to wind down and may
//!   keep running until it next yields.
//! - Hard stop: the whole tree containing a handle is destroyed immediately,
//!   leaf-first. If the running element is part of that tree the stop is
//!   deferred until its call returns.
//! - Teardown: every remaining element is destroyed in queue order, then
//!   anything still suspended. Faults are reported but never propagated.

use std::collections::HashSet;

use lifesim_core::{HandleId, TimelineError, TimelineResult};
use tracing::{debug, trace, warn};

use crate::handle::HandleRecord;
use crate::{StopRequest, Timeline};

/// Result of a hard stop request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardStop {
    /// Tree destroyed; number of elements stopped
    Stopped(usize),
    /// The running element belongs to the tree; it is stopped once its call returns
    Deferred,
    /// Handle was already tombstoned
    AlreadyStopped,
}

/// What a teardown destroyed
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub elements: usize,
    pub faults: Vec<TimelineError>,
}

impl TeardownReport {
    pub fn is_empty(&self) -> bool {
        self.elements == 0 && self.faults.is_empty()
    }
}

/// Which hook a destroyed element receives
#[derive(Clone, Copy, Debug)]
pub(crate) enum Destroy {
    HardStop,
    Teardown,
}

impl Timeline {
    /// Ask `handle` and its descendants to wind down. Each element's hook
    /// runs at most once. Returns how many elements were notified now.
    pub fn soft_stop(&mut self, handle: HandleId) -> TimelineResult<usize> {
        self.check_owner(handle)?;
        let mut seen = HashSet::new();
        let mut stack = vec![handle];
        let mut notified = 0;

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(record) = self.handles.get_mut(current) else {
                continue;
            };
            if record.stop_requested {
                continue;
            }
            record.stop_requested = true;

            // a checked-out element hears about it once its call returns
            let cascaded = match self.notify_soft_stop(current) {
                Some(cascaded) => {
                    notified += 1;
                    cascaded
                }
                None => false,
            };
            if !cascaded {
                let mut links = self.child_links(current);
                links.reverse();
                stack.extend(links);
            }
        }

        trace!(timeline = %self.id, handle = %handle, notified, "soft stop");
        Ok(notified)
    }

    /// Destroy the whole tree containing `handle`
    pub fn hard_stop(&mut self, handle: HandleId) -> TimelineResult<HardStop> {
        self.check_owner(handle)?;
        if !self.handles.contains(handle) {
            return Ok(HardStop::AlreadyStopped);
        }

        let root = self.root_of(handle);
        let tree = self.collect_tree(root);
        if let Some(active) = self.active {
            if tree.contains(&active) {
                self.pending_hard_stop = true;
                debug!(timeline = %self.id, handle = %handle, "hard stop deferred until the running element returns");
                return Ok(HardStop::Deferred);
            }
        }

        let (stopped, faults) = self.destroy(tree, Destroy::HardStop);
        self.stats.hard_stops += 1;
        debug!(timeline = %self.id, handle = %handle, root = %root, stopped, "hard stopped element tree");
        self.report_stop_faults(faults)?;
        Ok(HardStop::Stopped(stopped))
    }

    /// Destroy every remaining element, calling its teardown hook.
    /// Faults go to the fault policy and into the report, never up.
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.simulating || self.active.is_some() {
            warn!(timeline = %self.id, "teardown requested while simulating, ignored");
            return report;
        }

        let queued = self.queue.drain_ordered().into_iter().map(|entry| entry.handle);
        let roots: Vec<HandleId> = queued.chain(self.handles.ids()).collect();
        for handle in roots {
            if !self.handles.contains(handle) {
                continue;
            }
            let tree = self.collect_tree(self.root_of(handle));
            let (count, faults) = self.destroy(tree, Destroy::Teardown);
            report.elements += count;
            report.faults.extend(faults);
        }

        self.tombstones = 0;
        self.pending_child = None;
        self.pending_hard_stop = false;
        self.handles.rebuild_free_list();

        self.stats.faults += report.faults.len() as u64;
        for fault in &report.faults {
            self.config.fault_policy.report_only(self.id, fault);
        }
        debug!(timeline = %self.id, elements = report.elements, faults = report.faults.len(), "timeline torn down");
        report
    }

    pub(crate) fn stop_requested(&self, handle: HandleId) -> bool {
        self.handles
            .get(handle)
            .is_some_and(|record| record.stop_requested)
    }

    /// Deliver a soft stop that arrived while `handle` was running
    pub(crate) fn deliver_deferred_soft_stop(&mut self, handle: HandleId) {
        if self
            .handles
            .get(handle)
            .is_some_and(|record| record.stop_requested && !record.stop_delivered)
        {
            self.notify_soft_stop(handle);
        }
    }

    /// Call the soft-stop hook if the element is in its slot and has not
    /// heard it yet. Returns whether the element cascaded the stop itself.
    fn notify_soft_stop(&mut self, handle: HandleId) -> Option<bool> {
        let record = self.handles.get_mut(handle)?;
        if record.stop_delivered {
            return None;
        }
        let mut element = record.element.take()?;
        record.stop_delivered = true;

        let cascaded = {
            let mut stop = StopRequest::new(self, handle);
            element.soft_stop(&mut stop)
        };
        if let Some(record) = self.handles.get_mut(handle) {
            record.element = Some(element);
        }
        Some(cascaded)
    }

    pub(crate) fn root_of(&self, handle: HandleId) -> HandleId {
        let mut current = handle;
        while let Some(parent) = self.handles.get(current).and_then(|record| record.parent) {
            if !self.handles.contains(parent) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Recorded children plus whatever the element reports as its own
    fn child_links(&self, handle: HandleId) -> Vec<HandleId> {
        let Some(record) = self.handles.get(handle) else {
            return Vec::new();
        };
        let mut links = record.children.clone();
        if let Some(element) = record.element.as_ref() {
            for linked in element.child_handles() {
                if linked.timeline == self.id && linked != handle && !links.contains(&linked) {
                    links.push(linked);
                }
            }
        }
        links
    }

    /// Live handles of the tree under `root`, leaf-first
    pub(crate) fn collect_tree(&self, root: HandleId) -> Vec<HandleId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, false)];

        while let Some((handle, expanded)) = stack.pop() {
            if expanded {
                order.push(handle);
                continue;
            }
            if !self.handles.contains(handle) || !seen.insert(handle) {
                continue;
            }
            stack.push((handle, true));
            for child in self.child_links(handle).into_iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Retire a handle: drop its record, detach it from its parent and
    /// count its queue entry as a tombstone
    pub(crate) fn tombstone(&mut self, handle: HandleId) -> Option<HandleRecord> {
        let record = self.handles.remove(handle)?;
        if record.pending {
            self.tombstones += 1;
        }
        if let Some(parent) = record.parent {
            if let Some(parent) = self.handles.get_mut(parent) {
                parent.children.retain(|child| *child != handle);
            }
        }
        if self.active == Some(handle) {
            self.active = None;
        }
        if self.pending_child == Some(handle) {
            self.pending_child = None;
        }
        Some(record)
    }

    /// Tombstone every handle of `tree` first, then run the hooks in order
    pub(crate) fn destroy(
        &mut self,
        tree: Vec<HandleId>,
        mode: Destroy,
    ) -> (usize, Vec<TimelineError>) {
        let records: Vec<HandleRecord> = tree
            .into_iter()
            .filter_map(|handle| self.tombstone(handle))
            .collect();
        let count = records.len();

        let mut faults = Vec::new();
        for record in records {
            let HandleRecord { element, name, .. } = record;
            let Some(mut element) = element else {
                continue;
            };
            let result = match mode {
                Destroy::HardStop => element.hard_stop(),
                Destroy::Teardown => element.teardown(),
            };
            if let Err(source) = result {
                faults.push(match mode {
                    Destroy::HardStop => TimelineError::StopFailed {
                        element: name,
                        source,
                    },
                    Destroy::Teardown => TimelineError::TeardownFailed {
                        element: name,
                        source,
                    },
                });
            }
        }
        (count, faults)
    }

    /// Report stop hook faults. Under a propagating policy a single fault
    /// comes back as is, several come back aggregated.
    pub(crate) fn report_stop_faults(&mut self, mut faults: Vec<TimelineError>) -> TimelineResult<()> {
        if faults.is_empty() {
            return Ok(());
        }
        self.stats.faults += faults.len() as u64;
        let mut propagate = false;
        for fault in &faults {
            propagate |= self.config.fault_policy.report(self.id, fault);
        }
        if !propagate {
            return Ok(());
        }
        if faults.len() == 1 {
            return Err(faults.remove(0));
        }
        Err(TimelineError::Aggregate(faults))
    }
}

//! Lifecycle journal
//!
//! Scripted elements append one entry per hook call. Two runs of the same
//! workload are deterministic exactly when their journals are equal.

use std::cell::RefCell;
use std::rc::Rc;

use lifesim_core::Tick;
use lifesim_timeline::Outcome;

/// Hook call observed on an element
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Started,
    Resumed(Option<Outcome>),
    ChildReturned(Outcome),
    Completed(Outcome),
    Failed,
    SoftStop,
    HardStop,
    Teardown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    /// Last tick the element observed
    pub at: Tick,
    pub element: String,
    pub event: Lifecycle,
}

/// Shared, append-only record of lifecycle events
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Rc<RefCell<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, at: Tick, element: &str, event: Lifecycle) {
        tracing::trace!(element, at = %at, ?event, "journal");
        self.entries.borrow_mut().push(JournalEntry {
            at,
            element: element.to_string(),
            event,
        });
    }

    /// Snapshot of every entry so far
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.borrow().clone()
    }

    /// Events recorded for one element, in order
    pub fn events_for(&self, element: &str) -> Vec<Lifecycle> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.element == element)
            .map(|entry| entry.event.clone())
            .collect()
    }

    /// Elements in the order they received `event`
    pub fn elements_with(&self, event: &Lifecycle) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == *event)
            .map(|entry| entry.element.clone())
            .collect()
    }

    pub fn count(&self, event: &Lifecycle) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.event == *event)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let journal = Journal::new();
        let writer = journal.clone();
        writer.record(Tick::new(2), "walk", Lifecycle::Started);
        writer.record(Tick::new(4), "walk", Lifecycle::Completed(Outcome::Success));
        writer.record(Tick::new(4), "idle", Lifecycle::Started);

        assert_eq!(journal.len(), 3);
        assert_eq!(
            journal.events_for("walk"),
            vec![Lifecycle::Started, Lifecycle::Completed(Outcome::Success)]
        );
        assert_eq!(journal.elements_with(&Lifecycle::Started), vec!["walk", "idle"]);
        assert_eq!(journal.count(&Lifecycle::Started), 2);

        journal.clear();
        assert!(writer.is_empty());
    }
}

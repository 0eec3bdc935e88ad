//! Handle arena
//!
//! Every scheduled element lives in a slot of this arena, owned by the
//! timeline. Parent/child links are arena indices, so an element tree can
//! never keep itself alive through a reference cycle. Tombstoning a handle
//! removes its record and bumps the slot generation; stale [`HandleId`]s
//! then simply fail to resolve.

use lifesim_core::{HandleId, Tick, TimelineId};

use crate::Element;

/// Scheduler-side state of one handle
pub(crate) struct HandleRecord {
    pub when: Tick,
    pub sequence: u64,
    /// Has a live entry in the queue
    pub pending: bool,
    /// `None` while the element is checked out for a hook call
    pub element: Option<Box<dyn Element>>,
    pub name: String,
    pub parent: Option<HandleId>,
    pub children: Vec<HandleId>,
    pub started: bool,
    pub stop_requested: bool,
    pub stop_delivered: bool,
}

impl HandleRecord {
    pub fn new(element: Box<dyn Element>, parent: Option<HandleId>, now: Tick) -> Self {
        HandleRecord {
            when: now,
            sequence: 0,
            pending: false,
            name: element.name().to_string(),
            element: Some(element),
            parent,
            children: Vec::new(),
            started: false,
            stop_requested: false,
            stop_delivered: false,
        }
    }
}

struct Slot {
    generation: u32,
    record: Option<HandleRecord>,
}

/// Generational slab of handle records
pub(crate) struct HandleArena {
    timeline: TimelineId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleArena {
    pub fn new(timeline: TimelineId) -> Self {
        HandleArena {
            timeline,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn insert(&mut self, record: HandleRecord) -> HandleId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return HandleId::new(self.timeline, index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        HandleId::new(self.timeline, index, 0)
    }

    fn slot(&self, id: HandleId) -> Option<&Slot> {
        if id.timeline != self.timeline {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn get(&self, id: HandleId) -> Option<&HandleRecord> {
        self.slot(id).and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleRecord> {
        if id.timeline != self.timeline {
            return None;
        }
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.get(id).is_some()
    }

    /// Take the record out and retire the id
    pub fn remove(&mut self, id: HandleId) -> Option<HandleRecord> {
        if id.timeline != self.timeline {
            return None;
        }
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(record)
    }

    /// Live handles in slot order
    pub fn ids(&self) -> Vec<HandleId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.record.is_some())
            .map(|(index, slot)| HandleId::new(self.timeline, index as u32, slot.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Rebuild the free list so the lowest indices are reused first
    pub fn rebuild_free_list(&mut self) {
        self.free = self
            .slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.record.is_none())
            .map(|(index, _)| index as u32)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, Step};

    struct Noop;

    impl Element for Noop {
        fn start(&mut self, _ctx: &mut Context<'_>) -> Step {
            Step::done()
        }
    }

    fn record() -> HandleRecord {
        HandleRecord::new(Box::new(Noop), None, Tick::ZERO)
    }

    #[test]
    fn test_removed_handle_is_inert_after_reuse() {
        let mut arena = HandleArena::new(TimelineId(1));
        let first = arena.insert(record());
        assert!(arena.remove(first).is_some());
        assert!(arena.remove(first).is_none());

        let second = arena.insert(record());
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_foreign_timeline_does_not_resolve() {
        let mut arena = HandleArena::new(TimelineId(1));
        let id = arena.insert(record());
        let foreign = HandleId::new(TimelineId(2), id.index, id.generation);
        assert!(arena.get(foreign).is_none());
        assert!(arena.remove(foreign).is_none());
    }

    #[test]
    fn test_rebuilt_free_list_prefers_low_indices() {
        let mut arena = HandleArena::new(TimelineId(1));
        let ids: Vec<_> = (0..4).map(|_| arena.insert(record())).collect();
        arena.remove(ids[3]);
        arena.remove(ids[1]);
        arena.rebuild_free_list();

        let reused = arena.insert(record());
        assert_eq!(reused.index, 1);
        assert_eq!(arena.ids().len(), 3);
    }
}

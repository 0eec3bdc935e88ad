//! Callback lists fired on time advancement and per simulate call

use std::fmt;

/// Registration token for a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Ordered list of callbacks sharing one argument type
pub struct CallbackList<A> {
    next_id: u64,
    entries: Vec<(CallbackId, Box<dyn FnMut(A)>)>,
}

impl<A: Copy> CallbackList<A> {
    pub fn new() -> Self {
        CallbackList {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Add a callback; it fires after all previously registered ones
    pub fn register(&mut self, callback: impl FnMut(A) + 'static) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn remove(&mut self, id: CallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn fire(&mut self, arg: A) {
        for (_, callback) in self.entries.iter_mut() {
            callback(arg);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A: Copy> Default for CallbackList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_fire_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = CallbackList::new();

        let a = Rc::clone(&log);
        list.register(move |v: u32| a.borrow_mut().push(("a", v)));
        let b = Rc::clone(&log);
        list.register(move |v: u32| b.borrow_mut().push(("b", v)));

        list.fire(7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_remove() {
        let hits = Rc::new(RefCell::new(0));
        let mut list = CallbackList::new();
        let h = Rc::clone(&hits);
        let id = list.register(move |_: ()| *h.borrow_mut() += 1);

        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.fire(());
        assert_eq!(*hits.borrow(), 0);
        assert!(list.is_empty());
    }
}

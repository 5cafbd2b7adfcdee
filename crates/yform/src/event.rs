#![forbid(unsafe_code)]

//! `validate` events: one per committed field validation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Emitted by a form whenever a field commits a validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateEvent {
    pub path: String,
    pub valid: bool,
    /// First error message; `None` when valid.
    pub message: Option<String>,
}

/// Handle returned by `on_validate`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&ValidateEvent)>;

/// Subscriber list. Listeners may subscribe or unsubscribe from inside a
/// callback; the change applies from the next emit.
#[derive(Default)]
pub(crate) struct Listeners {
    next: Cell<u64>,
    entries: RefCell<Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.borrow().len())
            .finish()
    }
}

impl Listeners {
    pub(crate) fn add(&self, listener: impl Fn(&ValidateEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next.get());
        self.next.set(id.0 + 1);
        self.entries.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub(crate) fn emit(&self, event: &ValidateEvent) {
        let snapshot: Vec<Listener> = self
            .entries
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

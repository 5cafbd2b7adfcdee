#![forbid(unsafe_code)]

//! Flush scheduling: "apply pending mutations, then run queued reactions".
//!
//! The scheduler stands in for the reactivity layer of a host UI. Code that
//! mutates state queues follow-up work with [`Scheduler::next_tick`]; the host
//! (or a test) calls [`Scheduler::flush`] at its render boundary.
//!
//! A flush is a loop of rounds. Each round first runs every registered flush
//! hook (the form's model dirty-check is one), then drains the reactions that
//! were queued when the round started. The loop ends when a round finds the
//! queue empty after its hooks ran.
//!
//! # Invariants
//!
//! 1. Reactions run in FIFO order.
//! 2. A reaction queued during a flush runs in the same flush.
//! 3. A nested `flush()` call from inside a reaction is a no-op; the outer
//!    flush drains its work.
//! 4. A flush stops after [`MAX_FLUSH_ROUNDS`] rounds and logs a warning
//!    rather than spinning on reactions that keep re-queueing themselves.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

/// Upper bound on rounds per flush.
pub const MAX_FLUSH_ROUNDS: usize = 1024;

type Reaction = Box<dyn FnOnce()>;
type Hook = Rc<dyn Fn()>;

/// Identifier of a registered flush hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

#[derive(Default)]
struct Inner {
    queue: RefCell<VecDeque<Reaction>>,
    hooks: RefCell<Vec<(HookId, Hook)>>,
    next_hook: Cell<u64>,
    flushing: Cell<bool>,
    flushes: Cell<u64>,
}

/// Cheaply cloneable handle to one event loop's reaction queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("hooks", &self.inner.hooks.borrow().len())
            .field("flushes", &self.inner.flushes.get())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reaction` for the next flush.
    pub fn next_tick(&self, reaction: impl FnOnce() + 'static) {
        self.inner.queue.borrow_mut().push_back(Box::new(reaction));
    }

    /// Number of queued reactions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Number of completed flushes.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.inner.flushes.get()
    }

    /// Whether a flush is running right now.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.get()
    }

    /// Register a hook that runs at the start of every flush round.
    pub fn add_flush_hook(&self, hook: impl Fn() + 'static) -> HookId {
        let id = HookId(self.inner.next_hook.get());
        self.inner.next_hook.set(id.0 + 1);
        self.inner.hooks.borrow_mut().push((id, Rc::new(hook)));
        id
    }

    /// Remove a flush hook. Unknown ids are ignored.
    pub fn remove_flush_hook(&self, id: HookId) {
        self.inner.hooks.borrow_mut().retain(|(hook_id, _)| *hook_id != id);
    }

    /// Run hooks and reactions until nothing is left. Returns the number of
    /// reactions that ran.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.replace(true) {
            return 0;
        }

        let mut ran = 0;
        let mut rounds = 0;
        loop {
            if rounds == MAX_FLUSH_ROUNDS {
                tracing::warn!(
                    target: "yform::scheduler",
                    rounds,
                    pending = self.pending(),
                    "flush round limit reached; leaving remaining reactions queued"
                );
                break;
            }
            rounds += 1;

            let hooks: Vec<Hook> = self
                .inner
                .hooks
                .borrow()
                .iter()
                .map(|(_, hook)| Rc::clone(hook))
                .collect();
            for hook in hooks {
                hook();
            }

            let batch: Vec<Reaction> = self.inner.queue.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for reaction in batch {
                reaction();
                ran += 1;
            }
        }

        self.inner.flushing.set(false);
        self.inner.flushes.set(self.inner.flushes.get() + 1);
        tracing::trace!(target: "yform::scheduler", ran, rounds, "flush complete");
        ran
    }

    /// A handle that does not keep the queue alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning [`Scheduler`] handle.
#[derive(Clone, Default)]
pub struct WeakScheduler {
    inner: Weak<Inner>,
}

impl WeakScheduler {
    /// Upgrade back to a [`Scheduler`] if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Scheduler> {
        self.inner.upgrade().map(|inner| Scheduler { inner })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactions_run_in_fifo_order() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            scheduler.next_tick(move || log.borrow_mut().push(i));
        }
        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.flush(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.flushes(), 1);
    }

    #[test]
    fn reaction_queued_during_flush_runs_in_same_flush() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_log = Rc::clone(&log);
        let inner_scheduler = scheduler.clone();
        scheduler.next_tick(move || {
            inner_log.borrow_mut().push("outer");
            let log = Rc::clone(&inner_log);
            inner_scheduler.next_tick(move || log.borrow_mut().push("inner"));
        });
        assert_eq!(scheduler.flush(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let scheduler = Scheduler::new();
        let inner = scheduler.clone();
        let nested = Rc::new(Cell::new(usize::MAX));
        let seen = Rc::clone(&nested);
        scheduler.next_tick(move || seen.set(inner.flush()));
        scheduler.flush();
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn hooks_run_each_round_and_can_queue_work() {
        let scheduler = Scheduler::new();
        let budget = Rc::new(Cell::new(2));
        let rounds = Rc::new(Cell::new(0));
        let hook_scheduler = scheduler.downgrade();
        let hook_budget = Rc::clone(&budget);
        let hook_rounds = Rc::clone(&rounds);
        let id = scheduler.add_flush_hook(move || {
            hook_rounds.set(hook_rounds.get() + 1);
            if hook_budget.get() > 0 {
                hook_budget.set(hook_budget.get() - 1);
                if let Some(s) = hook_scheduler.upgrade() {
                    s.next_tick(|| {});
                }
            }
        });
        assert_eq!(scheduler.flush(), 2);
        // Two rounds with work, one final round that found nothing.
        assert_eq!(rounds.get(), 3);

        scheduler.remove_flush_hook(id);
        scheduler.flush();
        assert_eq!(rounds.get(), 3);
    }

    #[test]
    fn runaway_reactions_hit_the_round_limit() {
        fn requeue(scheduler: Scheduler) {
            let next = scheduler.clone();
            scheduler.next_tick(move || requeue(next));
        }
        let scheduler = Scheduler::new();
        requeue(scheduler.clone());
        assert_eq!(scheduler.flush(), MAX_FLUSH_ROUNDS);
        assert_eq!(scheduler.pending(), 1);
        assert!(!scheduler.is_flushing());
    }
}

#![forbid(unsafe_code)]

//! One settlement, two ways to observe it.
//!
//! A [`Completion`] is the read side of an operation that finishes later: a
//! validator waiting on user code, a form waiting on all of its fields. It can
//! be consumed by registering callbacks ([`Completion::on_settle`]) or by
//! awaiting it as a [`Future`]; both observe the same outcome, and neither
//! depends on the other being used.
//!
//! The write side is a [`Resolver`], consumed on use so an outcome is set at
//! most once. Dropping a resolver without settling leaves the completion
//! pending forever; nothing here times out.
//!
//! ```rust,ignore
//! let (resolver, done) = completion::<u32, String>();
//! done.on_settle(|outcome| println!("{outcome:?}"));
//! resolver.resolve(7);
//! assert_eq!(pollster::block_on(done), Ok(7));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

type Callback<T, E> = Box<dyn FnOnce(&Result<T, E>)>;

struct Slot<T, E> {
    outcome: Option<Rc<Result<T, E>>>,
    callbacks: Vec<Callback<T, E>>,
    wakers: Vec<Waker>,
}

/// Create a linked resolver/completion pair.
#[must_use]
pub fn completion<T, E>() -> (Resolver<T, E>, Completion<T, E>) {
    let slot = Rc::new(RefCell::new(Slot {
        outcome: None,
        callbacks: Vec::new(),
        wakers: Vec::new(),
    }));
    (
        Resolver {
            slot: Rc::clone(&slot),
        },
        Completion { slot },
    )
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Read side of a pending outcome. Cloning yields another view of the same
/// settlement.
pub struct Completion<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T, E> fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Completion")
            .field("settled", &slot.outcome.is_some())
            .field("callbacks", &slot.callbacks.len())
            .finish()
    }
}

impl<T: 'static, E: 'static> Completion<T, E> {
    /// A completion that is already settled.
    #[must_use]
    pub fn settled(outcome: Result<T, E>) -> Self {
        let (resolver, completion) = completion();
        resolver.settle(outcome);
        completion
    }

    /// Run `f` once with the outcome. Runs immediately if already settled.
    pub fn on_settle(&self, f: impl FnOnce(&Result<T, E>) + 'static) {
        let settled = self.slot.borrow().outcome.clone();
        match settled {
            Some(outcome) => f(&outcome),
            None => self.slot.borrow_mut().callbacks.push(Box::new(f)),
        }
    }
}

impl<T, E> Completion<T, E> {
    /// Whether an outcome has been set.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    /// Inspect the outcome without consuming it.
    pub fn peek<R>(&self, f: impl FnOnce(Option<&Result<T, E>>) -> R) -> R {
        let outcome = self.slot.borrow().outcome.clone();
        f(outcome.as_deref())
    }
}

impl<T: Clone, E: Clone> Completion<T, E> {
    /// A copy of the outcome, if settled.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.slot
            .borrow()
            .outcome
            .as_deref()
            .map(Result::clone)
    }
}

impl<T: Clone, E: Clone> Future for Completion<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        if let Some(outcome) = slot.outcome.as_deref() {
            return Poll::Ready(outcome.clone());
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Write side of a [`Completion`].
pub struct Resolver<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.slot.borrow().outcome.is_some())
            .finish()
    }
}

impl<T, E> Resolver<T, E> {
    /// Settle with a success value.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle with an error value.
    pub fn reject(self, error: E) {
        self.settle(Err(error));
    }

    /// Settle with `outcome`, then run callbacks and wake waiters.
    ///
    /// Callbacks run after the slot borrow is released, so they may register
    /// further callbacks or inspect the same completion.
    pub fn settle(self, outcome: Result<T, E>) {
        let (outcome, callbacks, wakers) = {
            let mut slot = self.slot.borrow_mut();
            if slot.outcome.is_some() {
                return;
            }
            let outcome = Rc::new(outcome);
            slot.outcome = Some(Rc::clone(&outcome));
            (
                outcome,
                std::mem::take(&mut slot.callbacks),
                std::mem::take(&mut slot.wakers),
            )
        };
        for callback in callbacks {
            callback(&outcome);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// A completion observing this resolver.
    #[must_use]
    pub fn completion(&self) -> Completion<T, E> {
        Completion {
            slot: Rc::clone(&self.slot),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn callback_registered_before_settle_runs_once() {
        let (resolver, done) = completion::<u32, ()>();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        done.on_settle(move |outcome| {
            assert_eq!(outcome, &Ok(3));
            seen.set(seen.get() + 1);
        });
        assert!(!done.is_settled());
        resolver.resolve(3);
        assert!(done.is_settled());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn callback_registered_after_settle_runs_immediately() {
        let done = Completion::<(), String>::settled(Err("boom".into()));
        let hit = Rc::new(Cell::new(false));
        let seen = Rc::clone(&hit);
        done.on_settle(move |outcome| {
            assert_eq!(outcome.as_ref().unwrap_err(), "boom");
            seen.set(true);
        });
        assert!(hit.get());
    }

    #[test]
    fn future_and_callback_see_the_same_outcome() {
        let (resolver, done) = completion::<(), Vec<u8>>();
        let from_callback = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&from_callback);
        done.on_settle(move |outcome| *sink.borrow_mut() = Some(outcome.clone()));
        resolver.reject(vec![1, 2]);
        let awaited = pollster::block_on(done.clone());
        assert_eq!(Some(awaited), from_callback.borrow().clone());
    }

    #[test]
    fn callbacks_may_reenter_the_completion() {
        let (resolver, done) = completion::<u8, ()>();
        let inner = done.clone();
        let hit = Rc::new(Cell::new(false));
        let seen = Rc::clone(&hit);
        done.on_settle(move |_| {
            let seen = Rc::clone(&seen);
            inner.on_settle(move |outcome| {
                assert_eq!(outcome, &Ok(1));
                seen.set(true);
            });
        });
        resolver.resolve(1);
        assert!(hit.get());
    }

    #[test]
    fn outcome_and_peek() {
        let (resolver, done) = completion::<u8, ()>();
        assert_eq!(done.outcome(), None);
        assert!(done.peek(|o| o.is_none()));
        resolver.resolve(9);
        assert_eq!(done.outcome(), Some(Ok(9)));
        assert!(done.peek(|o| matches!(o, Some(Ok(9)))));
    }

    #[test]
    fn dropped_resolver_leaves_completion_pending() {
        let (resolver, done) = completion::<(), ()>();
        drop(resolver);
        assert!(!done.is_settled());
    }
}

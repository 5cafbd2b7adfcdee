#![forbid(unsafe_code)]

//! Evaluate a rule list against one value.
//!
//! [`run`] walks the rules strictly in order. Built-in rules are checked on
//! the spot; a custom rule hands its validator a [`Done`] handle and the run
//! suspends until that handle is settled, which may happen inside the
//! validator call or any time later on the same thread. When the last rule has
//! reported (or the run is stopped) the run's [`Completion`] settles with
//! `Ok(())` or every collected error in rule order.
//!
//! # Faults
//!
//! A validator that returns `Err` or panics is caught and reported as an
//! [`ERROR_CODE_FAULT`] error for that rule; the run then continues with the
//! next rule. A `Done` dropped without being settled leaves the run pending
//! and logs a warning. Nothing times out.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use serde_json::Value;
use yform_core::{Completion, Resolver, completion};

use crate::checks::check_builtin;
use crate::error::{ERROR_CODE_CUSTOM, ERROR_CODE_FAULT, ValidationError};
use crate::rule::{Rule, RuleContext, RuleKind, RuleSet};

/// Settlement of a finished run.
pub type RunOutcome = Result<(), Vec<ValidationError>>;

/// Options for [`run_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after the first failing rule.
    pub first: bool,
}

/// Run `rules` against `value` at `path`.
pub fn run(rules: &RuleSet, value: &Value, path: &str) -> Run {
    run_with(rules, value, path, RunOptions::default())
}

/// Run with explicit [`RunOptions`].
pub fn run_with(rules: &RuleSet, value: &Value, path: &str, options: RunOptions) -> Run {
    let (resolver, completion) = completion();
    let state = Rc::new(RunState {
        rules: rules.as_slice().to_vec(),
        value: value.clone(),
        path: path.to_string(),
        options,
        cursor: Cell::new(0),
        awaiting: Cell::new(None),
        driving: Cell::new(false),
        calling: Cell::new(None),
        abandoned: Cell::new(false),
        finished: Cell::new(false),
        errors: RefCell::new(Vec::new()),
        resolver: RefCell::new(Some(resolver)),
    });
    tracing::trace!(
        target: "yform::engine",
        path,
        rules = state.rules.len(),
        first = options.first,
        "run started"
    );
    RunState::drive(&state);
    Run { state, completion }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Handle to an in-flight (or finished) evaluation.
///
/// Dropping the handle does not cancel anything: a pending custom validator
/// still holds its [`Done`], and the completion settles when it reports.
pub struct Run {
    state: Rc<RunState>,
    completion: Completion<(), Vec<ValidationError>>,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("path", &self.state.path)
            .field("cursor", &self.state.cursor.get())
            .field("rules", &self.state.rules.len())
            .field("finished", &self.state.finished.get())
            .finish()
    }
}

impl Run {
    /// Errors produced so far, in rule order.
    #[must_use]
    pub fn errors(&self) -> Vec<ValidationError> {
        self.state.errors.borrow().clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.finished.get()
    }

    /// Index of the custom rule the run is waiting on, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<usize> {
        self.state.awaiting.get()
    }

    /// Skip the remaining rules and settle with the errors collected so far.
    /// A late report from the rule being awaited is ignored.
    pub fn stop(&self) {
        if self.state.finished.get() {
            return;
        }
        tracing::trace!(
            target: "yform::engine",
            path = %self.state.path,
            at = self.state.cursor.get(),
            "run stopped early"
        );
        self.state.awaiting.set(None);
        RunState::finish(&self.state);
    }

    /// The run's settlement.
    #[must_use]
    pub fn completion(&self) -> Completion<(), Vec<ValidationError>> {
        self.completion.clone()
    }

    #[must_use]
    pub fn into_completion(self) -> Completion<(), Vec<ValidationError>> {
        self.completion
    }
}

struct RunState {
    rules: Vec<Rule>,
    value: Value,
    path: String,
    options: RunOptions,
    cursor: Cell<usize>,
    awaiting: Cell<Option<usize>>,
    driving: Cell<bool>,
    /// Custom rule whose validator is executing right now.
    calling: Cell<Option<usize>>,
    /// The validator at `calling` dropped its `Done` without reporting.
    abandoned: Cell<bool>,
    finished: Cell<bool>,
    errors: RefCell<Vec<ValidationError>>,
    resolver: RefCell<Option<Resolver<(), Vec<ValidationError>>>>,
}

impl RunState {
    /// Evaluate rules until the run suspends or finishes.
    ///
    /// Re-entrant calls (a `Done` settled inside its validator) return at
    /// once; the outer loop picks up the advanced cursor.
    fn drive(this: &Rc<Self>) {
        if this.driving.replace(true) {
            return;
        }
        loop {
            if this.finished.get() || this.awaiting.get().is_some() {
                break;
            }
            let index = this.cursor.get();
            let stop_on_first = this.options.first && !this.errors.borrow().is_empty();
            if index >= this.rules.len() || stop_on_first {
                Self::finish(this);
                break;
            }

            let rule = &this.rules[index];
            match rule.kind() {
                RuleKind::Builtin(builtin) => {
                    let outcome = check_builtin(rule, builtin, &this.value, &this.path);
                    tracing::trace!(
                        target: "yform::engine",
                        path = %this.path,
                        rule = index,
                        ok = outcome.is_ok(),
                        "rule checked"
                    );
                    if let Err(error) = outcome {
                        this.errors.borrow_mut().push(error);
                    }
                    this.cursor.set(index + 1);
                }
                RuleKind::Custom(custom) => {
                    this.awaiting.set(Some(index));
                    let done = Done {
                        run: Rc::clone(this),
                        index,
                        settled: false,
                    };
                    let ctx = RuleContext {
                        path: &this.path,
                        rule,
                        index,
                    };
                    this.calling.set(Some(index));
                    this.abandoned.set(false);
                    let called = catch_unwind(AssertUnwindSafe(|| {
                        custom.call(&ctx, &this.value, done)
                    }));
                    this.calling.set(None);
                    let fault = match called {
                        Ok(Ok(())) => None,
                        Ok(Err(err)) => Some(err.to_string()),
                        Err(payload) => Some(panic_text(payload.as_ref())),
                    };
                    if let Some(text) = fault {
                        tracing::warn!(
                            target: "yform::engine",
                            path = %this.path,
                            rule = index,
                            fault = %text,
                            "custom validator faulted"
                        );
                        let message = rule.message().map_or(text, str::to_string);
                        Self::report(
                            this,
                            index,
                            Some(ValidationError::new(ERROR_CODE_FAULT, message, &this.path)),
                        );
                    } else if this.abandoned.get() && this.awaiting.get() == Some(index) {
                        warn_abandoned(&this.path, index);
                    }
                }
            }
        }
        this.driving.set(false);
    }

    /// Record the outcome of the custom rule at `index` and resume.
    fn report(this: &Rc<Self>, index: usize, error: Option<ValidationError>) {
        if this.finished.get() || this.awaiting.get() != Some(index) {
            return;
        }
        if let Some(error) = error {
            this.errors.borrow_mut().push(error);
        }
        this.awaiting.set(None);
        this.cursor.set(index + 1);
        Self::drive(this);
    }

    fn finish(this: &Rc<Self>) {
        if this.finished.replace(true) {
            return;
        }
        let errors = this.errors.borrow().clone();
        tracing::trace!(
            target: "yform::engine",
            path = %this.path,
            errors = errors.len(),
            "run finished"
        );
        let resolver = this.resolver.borrow_mut().take();
        if let Some(resolver) = resolver {
            if errors.is_empty() {
                resolver.resolve(());
            } else {
                resolver.reject(errors);
            }
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "custom validator panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Done
// ---------------------------------------------------------------------------

/// One-shot reporter handed to a custom validator.
///
/// Consumed by [`Done::pass`] or [`Done::fail`], so a validator reports at
/// most once.
#[must_use = "a custom validator must call pass() or fail()"]
pub struct Done {
    run: Rc<RunState>,
    index: usize,
    settled: bool,
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("path", &self.run.path)
            .field("rule", &self.index)
            .finish()
    }
}

impl Done {
    /// The rule passed.
    pub fn pass(mut self) {
        self.settle(None);
    }

    /// The rule failed with `message`. A message on the rule itself takes
    /// precedence.
    pub fn fail(mut self, message: impl Into<String>) {
        let message = self.run.rules[self.index]
            .message()
            .map_or_else(|| message.into(), str::to_string);
        let error = ValidationError::new(ERROR_CODE_CUSTOM, message, &self.run.path);
        self.settle(Some(error));
    }

    /// Report `Ok` as pass and `Err` as failure with its text.
    pub fn finish<E: fmt::Display>(self, outcome: Result<(), E>) {
        match outcome {
            Ok(()) => self.pass(),
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn settle(&mut self, error: Option<ValidationError>) {
        self.settled = true;
        RunState::report(&self.run, self.index, error);
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if self.settled || self.run.finished.get() || self.run.awaiting.get() != Some(self.index) {
            return;
        }
        // Inside the validator call the run may still resume on a fault;
        // the engine decides once the call returns.
        if self.run.calling.get() == Some(self.index) {
            self.run.abandoned.set(true);
        } else {
            warn_abandoned(&self.run.path, self.index);
        }
    }
}

fn warn_abandoned(path: &str, rule: usize) {
    tracing::warn!(
        target: "yform::engine",
        path,
        rule,
        "custom validator dropped its Done without reporting; run stays pending"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERROR_CODE_RANGE, ERROR_CODE_REQUIRED};
    use serde_json::json;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Ok(mut out) = self.0.lock() {
                out.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a scoped subscriber and return everything it logged.
    fn logged(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn required(message: &str) -> Rule {
        Rule::builder().required().message(message).build().unwrap()
    }

    fn min(n: f64, message: &str) -> Rule {
        Rule::builder().min(n).message(message).build().unwrap()
    }

    fn messages(outcome: &RunOutcome) -> Vec<String> {
        match outcome {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.message.clone()).collect(),
        }
    }

    #[test]
    fn empty_rule_list_passes_synchronously() {
        let run = run(&RuleSet::new(), &json!("x"), "name");
        assert!(run.is_finished());
        assert_eq!(run.completion().outcome(), Some(Ok(())));
    }

    #[test]
    fn errors_are_collected_in_rule_order() {
        let rules: RuleSet = vec![min(5.0, "a"), required("b"), min(10.0, "c")].into();
        let run = run(&rules, &json!("abc"), "name");
        let outcome = run.completion().outcome().unwrap();
        assert_eq!(messages(&outcome), vec!["a", "c"]);
    }

    #[test]
    fn first_option_stops_after_first_failure() {
        let rules: RuleSet = vec![required("a"), min(2.0, "b")].into();
        let run = run_with(&rules, &Value::Null, "n", RunOptions { first: true });
        let outcome = run.completion().outcome().unwrap();
        assert_eq!(messages(&outcome), vec!["a"]);
        assert_eq!(run.errors()[0].code, ERROR_CODE_REQUIRED);
    }

    #[test]
    fn synchronous_custom_validator() {
        let rules: RuleSet = vec![
            Rule::custom(|_, value, done| {
                if value == &json!("ok") {
                    done.pass();
                } else {
                    done.fail("not ok");
                }
                Ok(())
            })
            .build()
            .unwrap(),
            min(5.0, "short"),
        ]
        .into();
        let run = run(&rules, &json!("bad"), "f");
        let outcome = run.completion().outcome().unwrap();
        assert_eq!(messages(&outcome), vec!["not ok", "short"]);
        assert_eq!(run.errors()[0].code, ERROR_CODE_CUSTOM);
    }

    #[test]
    fn deferred_custom_validator_suspends_the_run() {
        let parked: Rc<RefCell<Option<Done>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&parked);
        let rules: RuleSet = vec![
            Rule::custom(move |_, _, done| {
                *slot.borrow_mut() = Some(done);
                Ok(())
            })
            .build()
            .unwrap(),
            min(10.0, "after"),
        ]
        .into();

        let run = run(&rules, &json!(3), "n");
        assert!(!run.is_finished());
        assert_eq!(run.awaiting(), Some(0));
        assert!(run.errors().is_empty());

        let done = parked.borrow_mut().take().unwrap();
        done.fail("later");
        assert!(run.is_finished());
        let outcome = pollster::block_on(run.completion());
        assert_eq!(messages(&outcome), vec!["later", "after"]);
    }

    #[test]
    fn rule_message_overrides_custom_message() {
        let rules: RuleSet = vec![
            Rule::custom(|_, _, done| {
                done.fail("from validator");
                Ok(())
            })
            .message("from rule")
            .build()
            .unwrap(),
        ]
        .into();
        let outcome = run(&rules, &json!(1), "n").completion().outcome().unwrap();
        assert_eq!(messages(&outcome), vec!["from rule"]);
    }

    #[test]
    fn returned_error_becomes_fault() {
        init_tracing();
        let rules: RuleSet = vec![
            Rule::custom(|_, _, _done| Err("backend unreachable".into()))
                .build()
                .unwrap(),
            min(0.0, "never"),
        ]
        .into();
        let run = run(&rules, &json!(1), "n");
        let errors = run.completion().outcome().unwrap().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ERROR_CODE_FAULT);
        assert_eq!(errors[0].message, "backend unreachable");
    }

    #[test]
    fn panic_becomes_fault_with_rule_message() {
        init_tracing();
        let rules: RuleSet = vec![
            Rule::custom(|_, _, _done| panic!("boom"))
                .message("check failed")
                .build()
                .unwrap(),
        ]
        .into();
        let run = run(&rules, &json!(1), "n");
        let errors = run.completion().outcome().unwrap().unwrap_err();
        assert!(errors[0].is_fault());
        assert_eq!(errors[0].message, "check failed");
    }

    #[test]
    fn report_after_fault_is_ignored() {
        let rules: RuleSet = vec![
            Rule::custom(|_, _, done| {
                done.pass();
                Err("too late".into())
            })
            .build()
            .unwrap(),
        ]
        .into();
        let outcome = run(&rules, &json!(1), "n").completion().outcome().unwrap();
        assert_eq!(outcome, Ok(()));
    }

    #[test]
    fn dropped_done_leaves_run_pending() {
        init_tracing();
        let rules: RuleSet = vec![Rule::custom(|_, _, done| {
            drop(done);
            Ok(())
        })
        .build()
        .unwrap()]
        .into();
        let mut pending = None;
        let output = logged(|| pending = Some(run(&rules, &json!(1), "n")));
        let run = pending.unwrap();
        assert!(!run.is_finished());
        assert!(!run.completion().is_settled());
        assert!(output.contains("dropped its Done"));
    }

    #[test]
    fn dropped_done_before_fault_does_not_warn_pending() {
        let rules: RuleSet = vec![Rule::custom(|_, _, done| {
            drop(done);
            Err("backend unreachable".into())
        })
        .build()
        .unwrap()]
        .into();
        let mut finished = None;
        let output = logged(|| finished = Some(run(&rules, &json!(1), "n")));
        let run = finished.unwrap();
        assert!(run.is_finished());
        assert!(run.errors()[0].is_fault());
        assert!(output.contains("custom validator faulted"));
        assert!(!output.contains("dropped its Done"));
    }

    #[test]
    fn done_dropped_after_the_call_warns() {
        let parked: Rc<RefCell<Option<Done>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&parked);
        let rules: RuleSet = vec![Rule::custom(move |_, _, done| {
            *slot.borrow_mut() = Some(done);
            Ok(())
        })
        .build()
        .unwrap()]
        .into();
        let run = run(&rules, &json!(1), "n");
        let output = logged(|| drop(parked.borrow_mut().take()));
        assert!(!run.is_finished());
        assert!(output.contains("dropped its Done"));
    }

    #[test]
    fn stop_settles_with_collected_errors_and_ignores_late_reports() {
        let parked: Rc<RefCell<Option<Done>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&parked);
        let rules: RuleSet = vec![
            min(5.0, "first"),
            Rule::custom(move |_, _, done| {
                *slot.borrow_mut() = Some(done);
                Ok(())
            })
            .build()
            .unwrap(),
        ]
        .into();
        let run = run(&rules, &json!(1), "n");
        run.stop();
        assert!(run.is_finished());
        let errors = run.completion().outcome().unwrap().unwrap_err();
        assert_eq!(errors[0].code, ERROR_CODE_RANGE);

        parked.borrow_mut().take().unwrap().fail("late");
        assert_eq!(run.errors().len(), 1);
    }

    #[test]
    fn context_exposes_path_and_index() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let rules: RuleSet = vec![
            min(0.0, "x"),
            Rule::custom(move |ctx, _, done| {
                *sink.borrow_mut() = Some((ctx.path.to_string(), ctx.index));
                done.pass();
                Ok(())
            })
            .build()
            .unwrap(),
        ]
        .into();
        let _ = run(&rules, &json!(1), "user.age");
        assert_eq!(*seen.borrow(), Some(("user.age".to_string(), 1)));
    }
}

#![forbid(unsafe_code)]

//! Fields: one model path, its rules, and its validation state.
//!
//! # State machine
//!
//! ```text
//!        validate()            rules pass
//! Idle ────────────▶ Validating ──────────▶ Valid
//!   ▲                    │      rules fail
//!   │ reset / clear      └────────────────▶ Invalid
//!   └──────────────────────────────────────────┘
//! ```
//!
//! Validations may overlap. Each one takes a token from the field's
//! [`Sequencer`]; only the newest may commit state. Every validation still
//! emits its own `validate` event and settles its caller's outcome.
//!
//! An external error ([`Field::set_error`]) overrides the visible state and
//! message without touching the rule-derived state underneath.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use serde_json::Value;
use yform_core::{Completion, PathError};
use yform_validation::{Rule, RuleSet, Trigger, ValidationError, run};

use crate::config::{FieldConfig, FieldProps};
use crate::error::FormError;
use crate::event::ValidateEvent;
use crate::form::{Form, WeakForm};
use crate::sequencer::{SequenceTrace, Sequencer};
use crate::view::{FieldView, field_view};

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mounted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(u64);

impl FieldId {
    fn next() -> Self {
        Self(NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Rule-derived validation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ValidateState {
    #[default]
    Idle,
    Validating,
    Valid,
    Invalid,
}

impl ValidateState {
    /// Name as exposed to views; idle is the empty string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Validating => "validating",
            Self::Valid => "success",
            Self::Invalid => "error",
        }
    }
}

#[derive(Debug, Default)]
struct FieldState {
    validate_state: ValidateState,
    message: String,
    errors: Vec<ValidationError>,
    /// Reset target, captured at first registration.
    initial_value: Option<Value>,
    /// Model value as of the last dirty check.
    observed: Option<Value>,
    registered: bool,
}

pub(crate) struct FieldInner {
    id: FieldId,
    form: WeakForm,
    parent: Option<Weak<FieldInner>>,
    depth: usize,
    props: RefCell<FieldProps>,
    state: RefCell<FieldState>,
    sequencer: RefCell<Sequencer>,
}

/// Handle to a mounted field. Clones refer to the same field.
#[derive(Clone)]
pub struct Field {
    inner: Rc<FieldInner>,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Field {}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self.inner.props.borrow();
        let state = self.inner.state.borrow();
        f.debug_struct("Field")
            .field("id", &self.inner.id)
            .field("path", &props.path)
            .field("depth", &self.inner.depth)
            .field("state", &state.validate_state)
            .field("message", &state.message)
            .finish()
    }
}

impl Field {
    fn create(form: WeakForm, parent: Option<&Field>, props: FieldProps) -> Self {
        if let Some(path) = props.path.as_deref()
            && let Err(err) = yform_core::PropPath::parse(path)
        {
            tracing::warn!(target: "yform::field", path, %err, "field path does not parse; it will read as null");
        }
        Self {
            inner: Rc::new(FieldInner {
                id: FieldId::next(),
                form,
                parent: parent.map(|p| Rc::downgrade(&p.inner)),
                depth: parent.map_or(0, |p| p.inner.depth + 1),
                props: RefCell::new(props),
                state: RefCell::new(FieldState::default()),
                sequencer: RefCell::new(Sequencer::new()),
            }),
        }
    }

    /// Create a field and register it with `form`.
    pub fn mount(form: &Form, props: FieldProps) -> Self {
        let field = Self::create(form.downgrade(), None, props);
        form.add_field(&field);
        field
    }

    /// Mount from serialized configuration.
    ///
    /// # Errors
    ///
    /// A rule in `config` does not build.
    pub fn mount_config(form: &Form, config: FieldConfig) -> Result<Self, FormError> {
        let props = FieldProps::try_from(config)?;
        Ok(Self::mount(form, props))
    }

    /// Create a field nested inside `parent`, registered with the parent's
    /// form one level deeper.
    pub fn mount_in(parent: &Field, props: FieldProps) -> Self {
        let field = Self::create(parent.inner.form.clone(), Some(parent), props);
        if let Some(form) = field.form() {
            form.add_field(&field);
        }
        field
    }

    /// Remove the field from its form.
    pub fn unmount(&self) {
        if let Some(form) = self.form() {
            form.remove_field(self);
        }
    }

    pub(crate) fn from_weak(weak: &Weak<FieldInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<FieldInner> {
        Rc::downgrade(&self.inner)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> FieldId {
        self.inner.id
    }

    #[must_use]
    pub fn path(&self) -> Option<String> {
        self.inner.props.borrow().path.clone()
    }

    #[must_use]
    pub fn has_path(&self) -> bool {
        self.inner.props.borrow().path.is_some()
    }

    pub(crate) fn is_bound_to(&self, path: &str) -> bool {
        self.inner.props.borrow().path.as_deref() == Some(path)
    }

    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.inner.props.borrow().label.clone()
    }

    /// Number of enclosing fields.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    #[must_use]
    pub fn parent(&self) -> Option<Field> {
        self.inner.parent.as_ref().and_then(Self::from_weak)
    }

    #[must_use]
    pub fn form(&self) -> Option<Form> {
        self.inner.form.upgrade()
    }

    /// A copy of the current props.
    #[must_use]
    pub fn props(&self) -> FieldProps {
        self.inner.props.borrow().clone()
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.inner.props.borrow().visible
    }

    /// Visible state: the external error wins over the rule-derived state.
    #[must_use]
    pub fn validate_state(&self) -> ValidateState {
        if self.inner.props.borrow().error.is_some() {
            ValidateState::Invalid
        } else {
            self.inner.state.borrow().validate_state
        }
    }

    /// Visible message: the external error wins over the rule-derived one.
    #[must_use]
    pub fn message(&self) -> String {
        if let Some(error) = self.inner.props.borrow().error.clone() {
            return error;
        }
        self.inner.state.borrow().message.clone()
    }

    /// State from rule evaluation alone.
    #[must_use]
    pub fn computed_state(&self) -> ValidateState {
        self.inner.state.borrow().validate_state
    }

    /// Errors of the last committed validation.
    #[must_use]
    pub fn errors(&self) -> Vec<ValidationError> {
        self.inner.state.borrow().errors.clone()
    }

    #[must_use]
    pub fn external_error(&self) -> Option<String> {
        self.inner.props.borrow().error.clone()
    }

    /// Value captured at first registration, restored by [`Field::reset`].
    #[must_use]
    pub fn initial_value(&self) -> Option<Value> {
        self.inner.state.borrow().initial_value.clone()
    }

    /// Recent lifecycle events of this field's validations, bounded by
    /// [`crate::sequencer::TRACE_CAPACITY`].
    #[must_use]
    pub fn trace(&self) -> SequenceTrace {
        self.inner.sequencer.borrow().trace().clone()
    }

    /// Rules in effect, before trigger filtering: local rules if set, else
    /// the form's rules for the same path, then the implied presence rule.
    #[must_use]
    pub fn resolved_rules(&self) -> RuleSet {
        let props = self.inner.props.borrow();
        let mut rules = match (&props.rules, &props.path) {
            (Some(local), _) => local.clone(),
            (None, Some(path)) => self
                .form()
                .and_then(|form| form.rules_for(path))
                .unwrap_or_default(),
            (None, None) => RuleSet::new(),
        };
        if props.required
            && let Some(path) = &props.path
        {
            rules.push(Rule::implied_required(path));
        }
        rules
    }

    /// Whether the field shows the required marker.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.inner.props.borrow().required || self.resolved_rules().is_required()
    }

    #[must_use]
    pub fn view(&self) -> FieldView {
        field_view(self)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Validate with the rules that fire on `trigger` (`None`: all rules).
    pub fn validate(&self, trigger: Option<Trigger>) -> FieldValidation {
        let Some(path) = self.path() else {
            return FieldValidation::passed(None);
        };
        let rules = self.resolved_rules().for_trigger(trigger);
        if rules.is_empty() {
            return FieldValidation::passed(Some(path));
        }
        let value = self
            .form()
            .map_or(Value::Null, |form| form.read(&path));

        let token = self.inner.sequencer.borrow_mut().start();
        self.inner.state.borrow_mut().validate_state = ValidateState::Validating;
        tracing::debug!(
            target: "yform::field",
            path = %path,
            token = token.raw(),
            rules = rules.len(),
            trigger = trigger.map_or("all", Trigger::as_str),
            "validate started"
        );

        let (resolver, completion) = yform_core::completion();
        let weak = self.downgrade();
        let commit_path = path.clone();
        run(&rules, &value, &path)
            .into_completion()
            .on_settle(move |outcome| {
                if let Some(field) = Self::from_weak(&weak) {
                    field.commit(&commit_path, token, outcome);
                }
                resolver.settle(outcome.clone());
            });
        FieldValidation::new(Some(path), completion)
    }

    /// Apply a settled validation. Only the current token writes field
    /// state; every settled validation emits its own event.
    fn commit(
        &self,
        path: &str,
        token: crate::sequencer::Token,
        outcome: &Result<(), Vec<ValidationError>>,
    ) {
        let valid = outcome.is_ok();
        let errors = outcome.as_ref().err().cloned().unwrap_or_default();
        let message = errors.first().map(|e| e.message.clone());

        if self.inner.sequencer.borrow_mut().try_commit(token, valid) {
            {
                let mut state = self.inner.state.borrow_mut();
                state.validate_state = if valid {
                    ValidateState::Valid
                } else {
                    ValidateState::Invalid
                };
                state.message = message.clone().unwrap_or_default();
                state.errors = errors;
            }
            tracing::debug!(
                target: "yform::field",
                path,
                token = token.raw(),
                valid,
                "validation committed"
            );
        } else {
            tracing::debug!(
                target: "yform::field",
                path,
                token = token.raw(),
                valid,
                "stale validation discarded"
            );
        }

        if let Some(form) = self.form() {
            form.emit(&ValidateEvent {
                path: path.to_string(),
                valid,
                message,
            });
        }
    }

    /// The control committed a user edit. The model already holds the value.
    pub fn on_change(&self) -> FieldValidation {
        self.sync_observed();
        self.validate(Some(Trigger::Change))
    }

    /// The control lost focus.
    pub fn on_blur(&self) -> FieldValidation {
        self.validate(Some(Trigger::Blur))
    }

    /// Write `value` as a user edit and validate with the change trigger.
    ///
    /// # Errors
    ///
    /// The field has no path, or the model rejects the write.
    pub fn input(&self, value: Value) -> Result<FieldValidation, PathError> {
        let Some(path) = self.path() else {
            return Err(PathError::Empty);
        };
        if let Some(form) = self.form() {
            form.write(&path, value)?;
        }
        Ok(self.on_change())
    }

    fn sync_observed(&self) {
        let (Some(path), Some(form)) = (self.path(), self.form()) else {
            return;
        };
        let current = form.read(&path);
        self.inner.state.borrow_mut().observed = Some(current);
    }

    /// Flush hook: re-validate if the model value moved since the last check.
    pub(crate) fn observe_model(&self, form: &Form) {
        let (path, watch) = {
            let props = self.inner.props.borrow();
            (props.path.clone(), props.watch_model)
        };
        let Some(path) = path else { return };
        let current = form.read(&path);
        let changed = {
            let mut state = self.inner.state.borrow_mut();
            if state.observed.as_ref() == Some(&current) {
                false
            } else {
                state.observed = Some(current);
                true
            }
        };
        if changed && watch {
            tracing::trace!(target: "yform::field", path = %path, "model changed");
            let _ = self.validate(Some(Trigger::Change));
        }
    }

    /// Called by the form on registration.
    pub(crate) fn on_registered(&self, form: &Form) {
        let Some(path) = self.path() else { return };
        let current = form.read(&path);
        let mut state = self.inner.state.borrow_mut();
        if !state.registered {
            state.registered = true;
            state.initial_value = Some(current.clone());
        }
        state.observed = Some(current);
    }

    // -----------------------------------------------------------------------
    // Reset / clear / props
    // -----------------------------------------------------------------------

    /// Restore the initial value and clear validation state. The restored
    /// value is not treated as a change.
    ///
    /// # Errors
    ///
    /// The model rejects the write.
    pub fn reset(&self) -> Result<(), PathError> {
        self.clear_validate();
        self.inner.sequencer.borrow_mut().clear_trace();
        let (Some(path), Some(form)) = (self.path(), self.form()) else {
            return Ok(());
        };
        let Some(initial) = self.initial_value() else {
            return Ok(());
        };
        form.write(&path, initial.clone())?;
        self.inner.state.borrow_mut().observed = Some(initial);
        Ok(())
    }

    /// Return to idle with no message. In-flight validations become stale.
    pub fn clear_validate(&self) {
        self.inner.sequencer.borrow_mut().cancel();
        let mut state = self.inner.state.borrow_mut();
        state.validate_state = ValidateState::Idle;
        state.message.clear();
        state.errors.clear();
    }

    /// Set or clear the external error. Clearing returns the field to idle.
    pub fn set_error(&self, error: Option<String>) {
        let cleared = error.is_none();
        self.inner.props.borrow_mut().error = error;
        if cleared {
            self.clear_validate();
        }
    }

    pub fn set_visible(&self, visible: bool) {
        let changed = {
            let mut props = self.inner.props.borrow_mut();
            std::mem::replace(&mut props.visible, visible) != visible
        };
        if changed {
            self.relayout();
        }
    }

    pub fn set_label(&self, label: Option<String>) {
        let changed = {
            let mut props = self.inner.props.borrow_mut();
            std::mem::replace(&mut props.label, label.clone()) != label
        };
        if changed {
            self.relayout();
        }
    }

    /// Replace the field-local rules (`None` falls back to the form's).
    pub fn set_rules(&self, rules: Option<RuleSet>) {
        self.inner.props.borrow_mut().rules = rules;
    }

    pub fn set_required(&self, required: bool) {
        self.inner.props.borrow_mut().required = required;
    }

    pub fn set_show_message(&self, show: bool) {
        self.inner.props.borrow_mut().show_message = show;
    }

    pub fn set_watch_model(&self, watch: bool) {
        self.inner.props.borrow_mut().watch_model = watch;
    }

    fn relayout(&self) {
        if let Some(form) = self.form() {
            form.mark_layout_dirty();
        }
    }
}

// ---------------------------------------------------------------------------
// FieldValidation
// ---------------------------------------------------------------------------

/// Outcome of a field validation, by callback or by `.await`.
#[must_use = "a validation outcome is observed via on_done() or .await"]
pub struct FieldValidation {
    path: Option<String>,
    completion: Completion<(), Vec<ValidationError>>,
}

impl fmt::Debug for FieldValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValidation")
            .field("path", &self.path)
            .field("settled", &self.completion.is_settled())
            .finish()
    }
}

impl FieldValidation {
    pub(crate) fn new(path: Option<String>, completion: Completion<(), Vec<ValidationError>>) -> Self {
        Self { path, completion }
    }

    fn passed(path: Option<String>) -> Self {
        Self::new(path, Completion::settled(Ok(())))
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Run `f(valid, errors)` once the validation settles.
    pub fn on_done(&self, f: impl FnOnce(bool, &[ValidationError]) + 'static) {
        self.completion.on_settle(move |outcome| match outcome {
            Ok(()) => f(true, &[]),
            Err(errors) => f(false, errors),
        });
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<Result<(), Vec<ValidationError>>> {
        self.completion.outcome()
    }

    #[must_use]
    pub fn completion(&self) -> Completion<(), Vec<ValidationError>> {
        self.completion.clone()
    }

    pub(crate) fn into_completion(self) -> Completion<(), Vec<ValidationError>> {
        self.completion
    }
}

impl Future for FieldValidation {
    type Output = Result<(), Vec<ValidationError>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().completion).poll(cx)
    }
}

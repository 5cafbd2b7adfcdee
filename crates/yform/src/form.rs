#![forbid(unsafe_code)]

//! The form controller.
//!
//! A [`Form`] owns the field registry (in registration order), a handle to
//! the caller's model, the form-level rule table and display settings. It
//! runs bulk operations over its own fields only: a sub-form created with
//! [`Form::nested`] keeps a separate registry and is never reached by the
//! parent's `validate`, `reset_fields` or `clear_validate`.
//!
//! Model changes are observed at flush time. Each flush round starts with a
//! dirty check over the registered fields; a field whose value moved and that
//! watches the model re-validates with the change trigger.
//!
//! ```rust,ignore
//! let model = JsonModel::new(json!({ "name": "" })).into_shared();
//! let form = Form::builder(model)
//!     .rules(FormRules::from_json(json!({
//!         "name": { "required": true, "message": "name is required" }
//!     }))?)
//!     .build();
//! let name = Field::mount(&form, FieldProps::at("name").label("Name"));
//!
//! form.validate().on_done(|valid, invalid| {
//!     assert!(!valid);
//!     assert_eq!(invalid["name"][0].message, "name is required");
//! });
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use serde_json::Value;
use yform_core::{
    Completion, HookId, PathError, PropPath, Resolver, Scheduler, SharedModel, completion,
};
use yform_validation::{FormRules, RuleSet, ValidationError};

use crate::config::{FormConfig, LabelPosition, LabelWidth, Size};
use crate::error::FormError;
use crate::event::{ListenerId, Listeners, ValidateEvent};
use crate::field::{Field, FieldInner, FieldValidation};
use crate::label_width::{
    DisplayWidthMeasurer, FormLayout, LabelItem, LabelLayout, LabelMeasurer,
    LabelWidthCoordinator,
};
use crate::view::{FormView, form_view};

/// Failing paths of a bulk validation, each with its errors in rule order.
/// Paths without errors are absent.
pub type InvalidFields = BTreeMap<String, Vec<ValidationError>>;

pub(crate) struct FormInner {
    config: RefCell<FormConfig>,
    model: SharedModel,
    scheduler: Scheduler,
    fields: RefCell<Vec<Field>>,
    listeners: Listeners,
    labels: RefCell<LabelWidthCoordinator>,
    measurer: Rc<dyn LabelMeasurer>,
    layout_queued: Cell<bool>,
    hook: Cell<Option<HookId>>,
    parent: Option<Weak<FormInner>>,
    host: Option<Weak<FieldInner>>,
}

impl Drop for FormInner {
    fn drop(&mut self) {
        if let Some(id) = self.hook.take() {
            self.scheduler.remove_flush_hook(id);
        }
    }
}

/// Handle to a form. Clones refer to the same form.
#[derive(Clone)]
pub struct Form {
    inner: Rc<FormInner>,
}

impl PartialEq for Form {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("fields", &self.inner.fields.borrow().len())
            .field("nested", &self.inner.parent.is_some())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

/// Non-owning [`Form`] handle held by fields.
#[derive(Clone, Default)]
pub(crate) struct WeakForm {
    inner: Weak<FormInner>,
}

impl WeakForm {
    pub(crate) fn upgrade(&self) -> Option<Form> {
        self.inner.upgrade().map(|inner| Form { inner })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Form`].
#[must_use]
pub struct FormBuilder {
    model: SharedModel,
    config: FormConfig,
    scheduler: Option<Scheduler>,
    measurer: Option<Rc<dyn LabelMeasurer>>,
    parent: Option<Weak<FormInner>>,
    host: Option<Weak<FieldInner>>,
}

impl FormBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(mut self, rules: FormRules) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn label_width(mut self, width: LabelWidth) -> Self {
        self.config.label_width = Some(width);
        self
    }

    pub fn label_position(mut self, position: LabelPosition) -> Self {
        self.config.label_position = position;
        self
    }

    pub fn inline(mut self, inline: bool) -> Self {
        self.config.inline = inline;
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.config.size = Some(size);
        self
    }

    pub fn show_message(mut self, show: bool) -> Self {
        self.config.show_message = show;
        self
    }

    pub fn validate_on_rule_change(mut self, enabled: bool) -> Self {
        self.config.validate_on_rule_change = enabled;
        self
    }

    /// Share an existing scheduler (one per event loop).
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Label measurement; defaults to [`DisplayWidthMeasurer`].
    pub fn measurer(mut self, measurer: impl LabelMeasurer + 'static) -> Self {
        self.measurer = Some(Rc::new(measurer));
        self
    }

    #[must_use]
    pub fn build(self) -> Form {
        let form = Form {
            inner: Rc::new(FormInner {
                config: RefCell::new(self.config),
                model: self.model,
                scheduler: self.scheduler.unwrap_or_default(),
                fields: RefCell::new(Vec::new()),
                listeners: Listeners::default(),
                labels: RefCell::new(LabelWidthCoordinator::new()),
                measurer: self
                    .measurer
                    .unwrap_or_else(|| Rc::new(DisplayWidthMeasurer::default())),
                layout_queued: Cell::new(false),
                hook: Cell::new(None),
                parent: self.parent,
                host: self.host,
            }),
        };
        let weak = Rc::downgrade(&form.inner);
        let id = form.inner.scheduler.add_flush_hook(move || {
            if let Some(inner) = weak.upgrade() {
                Form { inner }.check_model();
            }
        });
        form.inner.hook.set(Some(id));
        form
    }
}

impl Form {
    /// Start building a form over `model`.
    pub fn builder(model: SharedModel) -> FormBuilder {
        FormBuilder {
            model,
            config: FormConfig::default(),
            scheduler: None,
            measurer: None,
            parent: None,
            host: None,
        }
    }

    /// A form with default configuration.
    #[must_use]
    pub fn new(model: SharedModel) -> Self {
        Self::builder(model).build()
    }

    /// A form with `config`.
    #[must_use]
    pub fn with_config(model: SharedModel, config: FormConfig) -> Self {
        Self::builder(model).config(config).build()
    }

    /// A sub-form hosted by `host`, sharing this form's model, scheduler and
    /// measurer but with its own registry, rules and label-width scope.
    #[must_use]
    pub fn nested(&self, host: &Field, config: FormConfig) -> Form {
        let builder = FormBuilder {
            model: Rc::clone(&self.inner.model),
            config,
            scheduler: Some(self.inner.scheduler.clone()),
            measurer: Some(Rc::clone(&self.inner.measurer)),
            parent: Some(Rc::downgrade(&self.inner)),
            host: Some(host.downgrade()),
        };
        builder.build()
    }

    pub(crate) fn downgrade(&self) -> WeakForm {
        WeakForm {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Form> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Form { inner })
    }

    #[must_use]
    pub fn host(&self) -> Option<Field> {
        self.inner.host.as_ref().and_then(Field::from_weak)
    }

    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.inner.parent.is_some()
    }

    #[must_use]
    pub fn model(&self) -> SharedModel {
        Rc::clone(&self.inner.model)
    }

    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        self.inner.scheduler.clone()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register `field`. Idempotent; returns whether it was added. Fields
    /// created for another form are refused.
    pub fn add_field(&self, field: &Field) -> bool {
        let belongs = field.form().is_some_and(|f| f == *self);
        if !belongs {
            tracing::warn!(
                target: "yform::form",
                path = ?field.path(),
                "refusing to register a field mounted on another form"
            );
            return false;
        }
        {
            let mut fields = self.inner.fields.borrow_mut();
            if fields.contains(field) {
                return false;
            }
            fields.push(field.clone());
        }
        field.on_registered(self);
        tracing::debug!(target: "yform::form", path = ?field.path(), "field registered");
        self.mark_layout_dirty();
        true
    }

    /// Unregister `field`. Idempotent; returns whether it was present.
    pub fn remove_field(&self, field: &Field) -> bool {
        let removed = {
            let mut fields = self.inner.fields.borrow_mut();
            let before = fields.len();
            fields.retain(|f| f != field);
            fields.len() != before
        };
        if removed {
            tracing::debug!(target: "yform::form", path = ?field.path(), "field removed");
            self.mark_layout_dirty();
        }
        removed
    }

    /// Registered fields in registration order.
    #[must_use]
    pub fn fields(&self) -> Vec<Field> {
        self.inner.fields.borrow().clone()
    }

    /// First field bound to `path`.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<Field> {
        self.inner
            .fields
            .borrow()
            .iter()
            .find(|f| f.is_bound_to(path))
            .cloned()
    }

    fn fields_at(&self, path: &str) -> Vec<Field> {
        self.inner
            .fields
            .borrow()
            .iter()
            .filter(|f| f.is_bound_to(path))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Validate every path-bearing field with all of its rules.
    pub fn validate(&self) -> FormValidation {
        let parts: Vec<(String, Completion<(), Vec<ValidationError>>)> = self
            .fields()
            .into_iter()
            .filter_map(|field| {
                let path = field.path()?;
                Some((path, field.validate(None).into_completion()))
            })
            .collect();
        tracing::debug!(target: "yform::form", fields = parts.len(), "validate all");

        let (resolver, completion) = completion::<(), InvalidFields>();
        join_in_order(parts, move |results| {
            let mut invalid = InvalidFields::new();
            for (path, errors) in results {
                if !errors.is_empty() {
                    invalid.entry(path).or_default().extend(errors);
                }
            }
            tracing::debug!(
                target: "yform::form",
                valid = invalid.is_empty(),
                invalid = invalid.len(),
                "validate all settled"
            );
            let valid = invalid.is_empty();
            settle(resolver, invalid, valid);
        });
        FormValidation { completion }
    }

    /// Validate the field(s) bound to `path` with all of their rules.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownPath`] when no registered field is bound to `path`.
    pub fn validate_field(&self, path: &str) -> Result<FieldValidation, FormError> {
        let fields = self.fields_at(path);
        if fields.is_empty() {
            return Err(FormError::UnknownPath {
                path: path.to_string(),
            });
        }
        let parts = fields
            .iter()
            .map(|field| (path.to_string(), field.validate(None).into_completion()))
            .collect();

        let (resolver, completion) = completion::<(), Vec<ValidationError>>();
        join_in_order(parts, move |results| {
            let errors: Vec<ValidationError> =
                results.into_iter().flat_map(|(_, errors)| errors).collect();
            let valid = errors.is_empty();
            settle(resolver, errors, valid);
        });
        Ok(FieldValidation::new(Some(path.to_string()), completion))
    }

    /// Reset every path-bearing field to its initial value.
    ///
    /// # Errors
    ///
    /// The first model write that failed; the remaining fields are still
    /// reset.
    pub fn reset_fields(&self) -> Result<(), FormError> {
        tracing::debug!(target: "yform::form", "reset fields");
        let mut first_error = None;
        for field in self.fields() {
            if let Err(err) = field.reset() {
                tracing::warn!(target: "yform::form", path = ?field.path(), %err, "reset failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    /// Clear validation state of the fields bound to `paths`, or of every
    /// field when `paths` is empty.
    pub fn clear_validate(&self, paths: &[&str]) {
        tracing::debug!(target: "yform::form", paths = ?paths, "clear validate");
        for field in self.fields() {
            let selected = paths.is_empty() || paths.iter().any(|p| field.is_bound_to(p));
            if selected {
                field.clear_validate();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Subscribe to `validate` events.
    pub fn on_validate(&self, listener: impl Fn(&ValidateEvent) + 'static) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Unsubscribe. Returns whether the listener was registered.
    pub fn off_validate(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub(crate) fn emit(&self, event: &ValidateEvent) {
        self.inner.listeners.emit(event);
    }

    // -----------------------------------------------------------------------
    // Model
    // -----------------------------------------------------------------------

    /// Read the model at `path`.
    ///
    /// # Errors
    ///
    /// `path` does not parse.
    pub fn value(&self, path: &str) -> Result<Option<Value>, PathError> {
        let path = PropPath::parse(path)?;
        Ok(self.inner.model.borrow().get(&path))
    }

    /// Programmatic write. Watching fields re-validate on the next flush.
    ///
    /// # Errors
    ///
    /// `path` does not parse or the model rejects the write.
    pub fn set_value(&self, path: &str, value: Value) -> Result<(), FormError> {
        self.write(path, value)?;
        Ok(())
    }

    pub(crate) fn read(&self, path: &str) -> Value {
        match PropPath::parse(path) {
            Ok(path) => self.inner.model.borrow().get(&path).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        }
    }

    pub(crate) fn write(&self, path: &str, value: Value) -> Result<(), PathError> {
        let path = PropPath::parse(path)?;
        self.inner.model.borrow_mut().set(&path, value)
    }

    fn check_model(&self) {
        for field in self.fields() {
            field.observe_model(self);
        }
    }

    /// Run the model dirty check and queued reactions until quiet. Returns
    /// the number of reactions that ran.
    pub fn flush(&self) -> usize {
        self.inner.scheduler.flush()
    }

    /// Queue `reaction` for the next flush.
    pub fn next_tick(&self, reaction: impl FnOnce() + 'static) {
        self.inner.scheduler.next_tick(reaction);
    }

    // -----------------------------------------------------------------------
    // Rules and configuration
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn rules(&self) -> FormRules {
        self.inner.config.borrow().rules.clone()
    }

    #[must_use]
    pub fn rules_for(&self, path: &str) -> Option<RuleSet> {
        self.inner.config.borrow().rules.get(path).cloned()
    }

    /// Replace the rule table. Re-validates when `validate_on_rule_change`
    /// is on and returns that validation.
    pub fn set_rules(&self, rules: FormRules) -> Option<FormValidation> {
        let revalidate = {
            let mut config = self.inner.config.borrow_mut();
            config.rules = rules;
            config.validate_on_rule_change
        };
        tracing::debug!(target: "yform::form", revalidate, "rules replaced");
        revalidate.then(|| self.validate())
    }

    #[must_use]
    pub fn label_position(&self) -> LabelPosition {
        self.inner.config.borrow().label_position
    }

    #[must_use]
    pub fn label_width(&self) -> Option<LabelWidth> {
        self.inner.config.borrow().label_width
    }

    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.inner.config.borrow().inline
    }

    #[must_use]
    pub fn size(&self) -> Option<Size> {
        self.inner.config.borrow().size
    }

    #[must_use]
    pub fn show_message(&self) -> bool {
        self.inner.config.borrow().show_message
    }

    pub fn set_label_width(&self, width: Option<LabelWidth>) {
        self.inner.config.borrow_mut().label_width = width;
        self.mark_layout_dirty();
    }

    pub fn set_label_position(&self, position: LabelPosition) {
        self.inner.config.borrow_mut().label_position = position;
        self.mark_layout_dirty();
    }

    pub fn set_inline(&self, inline: bool) {
        self.inner.config.borrow_mut().inline = inline;
        self.mark_layout_dirty();
    }

    pub fn set_size(&self, size: Option<Size>) {
        self.inner.config.borrow_mut().size = size;
    }

    pub fn set_show_message(&self, show: bool) {
        self.inner.config.borrow_mut().show_message = show;
    }

    // -----------------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------------

    fn form_layout(&self) -> FormLayout {
        let config = self.inner.config.borrow();
        FormLayout {
            label_width: config.label_width,
            label_position: config.label_position,
            inline: config.inline,
        }
    }

    /// Queue a full label rescan for the next flush.
    pub(crate) fn mark_layout_dirty(&self) {
        if self.inner.layout_queued.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.scheduler.next_tick(move || {
            if let Some(inner) = weak.upgrade() {
                Form { inner }.rescan_labels();
            }
        });
    }

    fn rescan_labels(&self) {
        self.inner.layout_queued.set(false);
        let layout = self.form_layout();
        let snapshot: Vec<(Option<String>, usize, bool, Option<LabelWidth>)> = self
            .fields()
            .iter()
            .map(|field| {
                let props = field.props();
                (props.label, field.depth(), props.visible, props.label_width)
            })
            .collect();
        let items = snapshot
            .iter()
            .map(|(label, depth, visible, label_width)| LabelItem {
                label: label.as_deref(),
                depth: *depth,
                visible: *visible,
                label_width: *label_width,
            });
        self.inner
            .labels
            .borrow_mut()
            .rescan(&layout, items, &*self.inner.measurer);
    }

    /// Geometry of `field` as of the last applied rescan.
    #[must_use]
    pub fn label_layout(&self, field: &Field) -> LabelLayout {
        let props = field.props();
        let item = LabelItem {
            label: props.label.as_deref(),
            depth: field.depth(),
            visible: props.visible,
            label_width: props.label_width,
        };
        self.inner
            .labels
            .borrow()
            .layout(&self.form_layout(), &item, &*self.inner.measurer)
    }

    /// Number of label rescans applied so far.
    #[must_use]
    pub fn label_rescans(&self) -> u64 {
        self.inner.labels.borrow().rescans()
    }

    #[must_use]
    pub fn view(&self) -> FormView {
        form_view(self)
    }
}

// ---------------------------------------------------------------------------
// Joining field outcomes
// ---------------------------------------------------------------------------

type Joined = Vec<(String, Vec<ValidationError>)>;

struct Join {
    remaining: Cell<usize>,
    slots: RefCell<Vec<Option<(String, Vec<ValidationError>)>>>,
    done: RefCell<Option<Box<dyn FnOnce(Joined)>>>,
}

/// Wait for every part, then call `done` once with their errors in the order
/// the parts were given, whatever order they settled in.
fn join_in_order(
    parts: Vec<(String, Completion<(), Vec<ValidationError>>)>,
    done: impl FnOnce(Joined) + 'static,
) {
    if parts.is_empty() {
        done(Vec::new());
        return;
    }
    let join = Rc::new(Join {
        remaining: Cell::new(parts.len()),
        slots: RefCell::new((0..parts.len()).map(|_| None).collect()),
        done: RefCell::new(Some(Box::new(done))),
    });
    for (index, (path, part)) in parts.into_iter().enumerate() {
        let join = Rc::clone(&join);
        part.on_settle(move |outcome| {
            let errors = outcome.as_ref().err().cloned().unwrap_or_default();
            join.slots.borrow_mut()[index] = Some((path, errors));
            let left = join.remaining.get() - 1;
            join.remaining.set(left);
            if left == 0 {
                let results = join.slots.take().into_iter().flatten().collect();
                if let Some(done) = join.done.take() {
                    done(results);
                }
            }
        });
    }
}

fn settle<E>(resolver: Resolver<(), E>, errors: E, valid: bool) {
    if valid {
        resolver.resolve(());
    } else {
        resolver.reject(errors);
    }
}

// ---------------------------------------------------------------------------
// FormValidation
// ---------------------------------------------------------------------------

/// Outcome of [`Form::validate`], by callback or by `.await`.
#[must_use = "a validation outcome is observed via on_done() or .await"]
pub struct FormValidation {
    completion: Completion<(), InvalidFields>,
}

impl fmt::Debug for FormValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormValidation")
            .field("settled", &self.completion.is_settled())
            .finish()
    }
}

impl FormValidation {
    /// Run `f(valid, invalid_fields)` once every field has settled.
    pub fn on_done(&self, f: impl FnOnce(bool, &InvalidFields) + 'static) {
        self.completion.on_settle(move |outcome| match outcome {
            Ok(()) => f(true, &InvalidFields::new()),
            Err(invalid) => f(false, invalid),
        });
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.completion.is_settled()
    }

    #[must_use]
    pub fn outcome(&self) -> Option<Result<(), InvalidFields>> {
        self.completion.outcome()
    }

    #[must_use]
    pub fn completion(&self) -> Completion<(), InvalidFields> {
        self.completion.clone()
    }
}

impl Future for FormValidation {
    type Output = Result<(), InvalidFields>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().completion).poll(cx)
    }
}

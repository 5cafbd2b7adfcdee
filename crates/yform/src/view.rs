#![forbid(unsafe_code)]

//! Render descriptors.
//!
//! Views are plain snapshots for a host renderer: class names, pixel
//! geometry and the error text to show. They are recomputed on every call
//! and hold no references back into the form.

use crate::config::LabelPosition;
use crate::field::{Field, FieldId, ValidateState};
use crate::form::Form;

/// Snapshot of a form container.
#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub classes: Vec<String>,
    pub label_position: LabelPosition,
    pub inline: bool,
}

impl FormView {
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Snapshot of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub id: FieldId,
    pub path: Option<String>,
    pub label: Option<String>,
    pub classes: Vec<String>,
    pub state: ValidateState,
    pub required: bool,
    pub visible: bool,
    /// Label box width in pixels.
    pub label_width: Option<f32>,
    /// Control offset in pixels.
    pub content_margin_left: Option<f32>,
    /// Error text to render, if any.
    pub error: Option<String>,
}

impl FieldView {
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

pub(crate) fn form_view(form: &Form) -> FormView {
    let position = form.label_position();
    let inline = form.is_inline();
    let mut classes = vec![
        "y-form".to_string(),
        format!("y-form--label-{}", position.as_str()),
    ];
    if inline {
        classes.push("y-form--inline".to_string());
    }
    FormView {
        classes,
        label_position: position,
        inline,
    }
}

pub(crate) fn field_view(field: &Field) -> FieldView {
    let form = field.form();
    let props = field.props();
    let state = field.validate_state();
    let required = field.is_required();

    let mut classes = vec!["y-form-item".to_string()];
    match state {
        ValidateState::Invalid => classes.push("is-error".into()),
        ValidateState::Validating => classes.push("is-validating".into()),
        ValidateState::Valid => classes.push("is-success".into()),
        ValidateState::Idle => {}
    }
    if required {
        classes.push("is-required".into());
    }
    if let Some(size) = props.size.or_else(|| form.as_ref().and_then(Form::size)) {
        classes.push(format!("y-form-item--{}", size.as_str()));
    }

    let show = props.show_message && form.as_ref().is_none_or(Form::show_message);
    let message = field.message();
    let error = (state == ValidateState::Invalid && show && !message.is_empty()).then_some(message);

    let layout = form
        .as_ref()
        .map(|f| f.label_layout(field))
        .unwrap_or_default();

    FieldView {
        id: field.id(),
        path: props.path,
        label: props.label,
        classes,
        state,
        required,
        visible: props.visible,
        label_width: layout.label_width,
        content_margin_left: layout.content_offset,
        error,
    }
}

#![forbid(unsafe_code)]

//! Form controller: fields bound to a shared model, validated by declarative
//! rules on change and blur, aggregated by a form, and aligned by a shared
//! label column.
//!
//! # Role in yform
//! `yform` is the crate hosts use. It builds on `yform-core` (model paths,
//! completions, the flush scheduler) and `yform-validation` (rules and the
//! engine) and adds:
//!
//! - [`field`] - per-field state machine and trigger handling
//! - [`form`] - registry, bulk validate/reset/clear, events, nested forms
//! - [`label_width`] - fixed and auto label widths
//! - [`sequencer`] - latest-wins ordering of overlapping validations
//! - [`config`] - form and field configuration (serde)
//! - [`view`] - render descriptors
//!
//! Everything is single-threaded; a form, its fields and its scheduler live
//! on one event loop. Programmatic model writes are noticed on
//! [`Form::flush`].
//!
//! ```rust,ignore
//! use serde_json::json;
//! use yform::{Field, FieldProps, Form, FormRules, JsonModel};
//!
//! let form = Form::builder(JsonModel::new(json!({ "name": "" })).into_shared())
//!     .rules(FormRules::from_json(json!({
//!         "name": { "required": true, "min": 3, "message": "enter a name", "trigger": "change" }
//!     }))?)
//!     .build();
//! let name = Field::mount(&form, FieldProps::at("name").label("Name"));
//!
//! let outcome = pollster::block_on(form.validate());
//! assert!(outcome.is_err());
//!
//! form.set_value("name", json!("jack"))?;
//! form.flush();
//! assert_eq!(name.message(), "");
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod field;
pub mod form;
pub mod label_width;
pub mod sequencer;
pub mod view;

pub use config::{FieldConfig, FieldProps, FormConfig, LabelPosition, LabelWidth, Size};
pub use error::FormError;
pub use event::{ListenerId, ValidateEvent};
pub use field::{Field, FieldId, FieldValidation, ValidateState};
pub use form::{Form, FormBuilder, FormValidation, InvalidFields};
pub use label_width::{
    DisplayWidthMeasurer, LABEL_PADDING, LabelLayout, LabelMeasurer, LabelWidthCoordinator,
};
pub use sequencer::{SequenceEvent, SequenceTrace, TRACE_CAPACITY, Token};
pub use view::{FieldView, FormView};

pub use yform_core::{JsonModel, Model, PathError, PropPath, Scheduler, SharedModel};
pub use yform_validation::{
    ConfigError, FormRules, Rule, RuleSet, Trigger, ValidationError, ValueType,
};

#![forbid(unsafe_code)]

//! Errors returned by form operations.
//!
//! Rule violations are never errors here: they are reported through field
//! state and validation outcomes.

use thiserror::Error;
use yform_core::PathError;
use yform_validation::ConfigError;

#[derive(Debug, Error)]
pub enum FormError {
    /// No registered field is bound to the path.
    #[error("no field is bound to `{path}`")]
    UnknownPath { path: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

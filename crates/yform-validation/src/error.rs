#![forbid(unsafe_code)]

//! Validation results and rule configuration errors.

use thiserror::Error;

/// A required value was empty.
pub const ERROR_CODE_REQUIRED: &str = "required";
/// The value did not conform to the declared type.
pub const ERROR_CODE_TYPE: &str = "type";
/// A `min`/`max` bound was violated.
pub const ERROR_CODE_RANGE: &str = "range";
/// An exact `len` was violated.
pub const ERROR_CODE_LEN: &str = "len";
/// The value did not match the rule's pattern.
pub const ERROR_CODE_PATTERN: &str = "pattern";
/// The value was whitespace only.
pub const ERROR_CODE_WHITESPACE: &str = "whitespace";
/// The value was not one of the allowed values.
pub const ERROR_CODE_ENUM: &str = "enum";
/// A custom validator reported failure.
pub const ERROR_CODE_CUSTOM: &str = "custom";
/// A custom validator returned an error or panicked.
pub const ERROR_CODE_FAULT: &str = "fault";

/// One failed rule.
///
/// `field` is the property path the rule ran against and `code` one of the
/// `ERROR_CODE_*` constants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    pub field: String,
}

impl ValidationError {
    /// Create an error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: field.into(),
        }
    }

    /// Whether this error was produced by a faulting custom validator.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.code == ERROR_CODE_FAULT
    }
}

/// A rule or rule table that cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A built-in rule has no message to report.
    #[error("built-in rule has no message")]
    MissingMessage,

    /// A rule neither checks anything nor has a custom validator.
    #[error("rule has no checks and no validator")]
    EmptyRule,

    /// `min` is greater than `max`.
    #[error("rule bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: f64, max: f64 },

    /// The pattern is not a valid regular expression.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Unrecognized `type` name.
    #[error("unknown rule type `{0}`")]
    UnknownType(String),

    /// Unrecognized trigger name.
    #[error("unknown trigger `{0}`")]
    UnknownTrigger(String),

    /// A label width that is neither `auto` nor a pixel length.
    #[error("invalid label width `{0}`")]
    InvalidLabelWidth(String),

    /// An entry of a rule table failed to build.
    #[error("rule {index} for `{path}`: {source}")]
    InRule {
        path: String,
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },

    /// The rule table was not valid JSON for its shape.
    #[error("invalid rule table: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_its_message() {
        let err = ValidationError::new(ERROR_CODE_REQUIRED, "name is required", "name");
        assert_eq!(err.to_string(), "name is required");
        assert_eq!(err.field, "name");
        assert!(!err.is_fault());
    }

    #[test]
    fn nested_config_error_names_path_and_index() {
        let err = ConfigError::InRule {
            path: "age".into(),
            index: 2,
            source: Box::new(ConfigError::UnknownType("decimal".into())),
        };
        assert_eq!(err.to_string(), "rule 2 for `age`: unknown rule type `decimal`");
    }
}

#![forbid(unsafe_code)]

//! Declarative validation rules and the engine that runs them.
//!
//! # Role in yform
//! This crate knows about values and rules, nothing about fields, forms or
//! triggers beyond the trigger set carried on each rule. The field layer
//! decides which rules apply and when; this crate only evaluates a list.
//!
//! - [`rule`] - [`Rule`], [`RuleSet`], triggers, value types
//! - [`checks`] - built-in checks and their precedence
//! - [`engine`] - [`run`]: ordered evaluation, custom validators, faults
//! - [`config`] - serde rule tables ([`FormRules`])
//! - [`error`] - [`ValidationError`] and [`ConfigError`]
//!
//! ```rust,ignore
//! use serde_json::json;
//! use yform_validation::{Rule, RuleSet, run};
//!
//! let rules: RuleSet = Rule::builder()
//!     .required()
//!     .message("name is required")
//!     .build()?
//!     .into();
//! let outcome = run(&rules, &json!(""), "name").completion().outcome();
//! assert!(matches!(outcome, Some(Err(errors)) if errors[0].message == "name is required"));
//! ```

pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod rule;

pub use config::{FormRules, OneOrMany, RuleDef};
pub use engine::{Done, Run, RunOptions, RunOutcome, run, run_with};
pub use error::{
    ConfigError, ERROR_CODE_CUSTOM, ERROR_CODE_ENUM, ERROR_CODE_FAULT, ERROR_CODE_LEN,
    ERROR_CODE_PATTERN, ERROR_CODE_RANGE, ERROR_CODE_REQUIRED, ERROR_CODE_TYPE,
    ERROR_CODE_WHITESPACE, ValidationError,
};
pub use rule::{
    BuiltinRule, CheckFault, CustomRule, Rule, RuleBuilder, RuleContext, RuleKind, RuleSet,
    Trigger, Triggers, ValueType,
};

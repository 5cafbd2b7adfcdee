#![forbid(unsafe_code)]

//! Rules: what a value must satisfy, and when the check fires.
//!
//! A [`Rule`] is either built-in (a bundle of declarative checks) or custom
//! (user code that settles a [`Done`] handle). The choice is made once, at
//! construction, and all constructors validate their input: a rule that could
//! never report anything, or whose bounds cannot both hold, is a
//! [`ConfigError`] rather than a silent pass at validation time.
//!
//! ```rust,ignore
//! use yform_validation::{Rule, Trigger, ValueType};
//!
//! let age = Rule::builder()
//!     .value_type(ValueType::Integer)
//!     .min(18.0)
//!     .message("must be an adult")
//!     .trigger(Trigger::Blur)
//!     .build()?;
//!
//! let even = Rule::custom(|_ctx, value, done| {
//!     if value.as_i64().is_some_and(|n| n % 2 == 0) {
//!         done.pass();
//!     } else {
//!         done.fail("must be even");
//!     }
//!     Ok(())
//! })
//! .build()?;
//! ```

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use bitflags::bitflags;
use regex::Regex;
use serde_json::Value;

use crate::engine::Done;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// The interaction that caused a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The value was committed (user edit or programmatic write).
    Change,
    /// The control lost focus.
    Blur,
}

impl Trigger {
    /// Lowercase name as used in rule tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Blur => "blur",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "change" => Ok(Self::Change),
            "blur" => Ok(Self::Blur),
            _ => Err(ConfigError::UnknownTrigger(s.to_string())),
        }
    }
}

bitflags! {
    /// Set of triggers a rule listens to. Empty means "every trigger".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Triggers: u8 {
        const CHANGE = 1 << 0;
        const BLUR = 1 << 1;
    }
}

impl Triggers {
    /// Whether a rule with this set applies to a validation caused by
    /// `trigger`. `None` (an explicit validate call) applies every rule.
    #[must_use]
    pub fn fires_on(self, trigger: Option<Trigger>) -> bool {
        match trigger {
            None => true,
            Some(t) => self.is_empty() || self.contains(Self::from(t)),
        }
    }
}

impl From<Trigger> for Triggers {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Change => Self::CHANGE,
            Trigger::Blur => Self::BLUR,
        }
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Declared type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
    Date,
    Email,
    Url,
    Regexp,
}

impl ValueType {
    /// Lowercase name as used in rule tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Date => "date",
            Self::Email => "email",
            Self::Url => "url",
            Self::Regexp => "regexp",
        }
    }

    /// Whether range checks measure this type numerically.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer | Self::Float)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "array" => Self::Array,
            "object" => Self::Object,
            "date" => Self::Date,
            "email" => Self::Email,
            "url" => Self::Url,
            "regexp" => Self::Regexp,
            _ => return Err(ConfigError::UnknownType(s.to_string())),
        })
    }
}

// ---------------------------------------------------------------------------
// Rule kinds
// ---------------------------------------------------------------------------

/// Declarative checks of a built-in rule. Presence is on [`Rule`] itself.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRule {
    pub value_type: Option<ValueType>,
    pub len: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<Regex>,
    pub whitespace: bool,
    pub one_of: Option<Vec<Value>>,
}

impl BuiltinRule {
    fn has_checks(&self) -> bool {
        self.value_type.is_some()
            || self.len.is_some()
            || self.min.is_some()
            || self.max.is_some()
            || self.pattern.is_some()
            || self.whitespace
            || self.one_of.is_some()
    }
}

/// What a custom validator can see besides the value.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Property path being validated.
    pub path: &'a str,
    /// The rule being evaluated.
    pub rule: &'a Rule,
    /// Position of the rule in its list.
    pub index: usize,
}

/// Error a custom validator may return instead of settling its [`Done`].
pub type CheckFault = Box<dyn std::error::Error + 'static>;

/// Signature of custom validator code.
pub type CustomCheck = dyn Fn(&RuleContext<'_>, &Value, Done) -> Result<(), CheckFault>;

/// A custom validator. Cloning shares the closure.
#[derive(Clone)]
pub struct CustomRule {
    check: Rc<CustomCheck>,
}

impl CustomRule {
    pub(crate) fn call(
        &self,
        ctx: &RuleContext<'_>,
        value: &Value,
        done: Done,
    ) -> Result<(), CheckFault> {
        (self.check)(ctx, value, done)
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomRule(..)")
    }
}

/// Built-in checks or custom code.
#[derive(Debug, Clone)]
pub enum RuleKind {
    Builtin(BuiltinRule),
    Custom(CustomRule),
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// One validation rule.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    required: bool,
    message: Option<String>,
    triggers: Triggers,
}

impl Rule {
    /// Start a built-in rule.
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Start a custom rule around `check`.
    ///
    /// The check must eventually call [`Done::pass`] or [`Done::fail`]; it
    /// may do so synchronously or hand the `Done` to later code. Returning
    /// `Err` (or panicking) is reported as a fault.
    #[must_use]
    pub fn custom(
        check: impl Fn(&RuleContext<'_>, &Value, Done) -> Result<(), CheckFault> + 'static,
    ) -> RuleBuilder {
        RuleBuilder {
            custom: Some(CustomRule {
                check: Rc::new(check),
            }),
            ..RuleBuilder::default()
        }
    }

    /// The presence rule added for a field flagged `required`.
    #[must_use]
    pub fn implied_required(path: &str) -> Self {
        Self {
            kind: RuleKind::Builtin(BuiltinRule::default()),
            required: true,
            message: Some(format!("{path} is required")),
            triggers: Triggers::empty(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self.kind, RuleKind::Custom(_))
    }

    /// Whether the rule demands presence. For custom rules this only drives
    /// the required marker; the validator decides the outcome.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn triggers(&self) -> Triggers {
        self.triggers
    }

    /// See [`Triggers::fires_on`].
    #[must_use]
    pub fn applies_to(&self, trigger: Option<Trigger>) -> bool {
        self.triggers.fires_on(trigger)
    }
}

/// Builder for [`Rule`]. Checks are validated in [`RuleBuilder::build`].
#[derive(Debug, Default)]
#[must_use]
pub struct RuleBuilder {
    custom: Option<CustomRule>,
    required: bool,
    value_type: Option<ValueType>,
    len: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<String>,
    whitespace: bool,
    one_of: Option<Vec<Value>>,
    message: Option<String>,
    triggers: Triggers,
}

impl RuleBuilder {
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Exact length (chars, elements) or exact numeric value.
    pub fn len(mut self, len: f64) -> Self {
        self.len = Some(len);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Regular expression the value must match somewhere.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Reject values consisting only of whitespace.
    pub fn whitespace(mut self) -> Self {
        self.whitespace = true;
        self
    }

    /// Restrict the value to one of `values`.
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.one_of = Some(values.into_iter().collect());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add `trigger` to the rule's trigger set.
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers |= Triggers::from(trigger);
        self
    }

    pub fn triggers(mut self, triggers: Triggers) -> Self {
        self.triggers = triggers;
        self
    }

    /// Finish the rule.
    ///
    /// # Errors
    ///
    /// Built-in rules need at least one check, a message, `min <= max`, and a
    /// pattern that compiles. Custom rules always build.
    pub fn build(self) -> Result<Rule, ConfigError> {
        if let Some(custom) = self.custom {
            return Ok(Rule {
                kind: RuleKind::Custom(custom),
                required: self.required,
                message: self.message,
                triggers: self.triggers,
            });
        }

        let pattern = self
            .pattern
            .map(|pattern| {
                Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern { pattern, source })
            })
            .transpose()?;
        let builtin = BuiltinRule {
            value_type: self.value_type,
            len: self.len,
            min: self.min,
            max: self.max,
            pattern,
            whitespace: self.whitespace,
            one_of: self.one_of,
        };

        if !self.required && !builtin.has_checks() {
            return Err(ConfigError::EmptyRule);
        }
        if let (Some(min), Some(max)) = (builtin.min, builtin.max)
            && min > max
        {
            return Err(ConfigError::InvertedBounds { min, max });
        }
        if self.message.is_none() {
            return Err(ConfigError::MissingMessage);
        }

        Ok(Rule {
            kind: RuleKind::Builtin(builtin),
            required: self.required,
            message: self.message,
            triggers: self.triggers,
        })
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Ordered list of rules for one path.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules that fire on `trigger`, in order.
    #[must_use]
    pub fn for_trigger(&self, trigger: Option<Trigger>) -> Self {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to(trigger))
            .cloned()
            .collect()
    }

    /// Whether any rule demands presence.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.rules.iter().any(Rule::is_required)
    }
}

impl From<Rule> for RuleSet {
    fn from(rule: Rule) -> Self {
        Self { rules: vec![rule] }
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl Extend<Rule> for RuleSet {
    fn extend<I: IntoIterator<Item = Rule>>(&mut self, iter: I) {
        self.rules.extend(iter);
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_needs_a_message() {
        let err = Rule::builder().required().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingMessage));
    }

    #[test]
    fn builtin_needs_a_check() {
        let err = Rule::builder().message("x").build().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRule));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = Rule::builder()
            .min(5.0)
            .max(2.0)
            .message("x")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedBounds { min, max } if min == 5.0 && max == 2.0));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = Rule::builder()
            .pattern("(unclosed")
            .message("x")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn custom_rules_build_without_message() {
        let rule = Rule::custom(|_, _, done| {
            done.pass();
            Ok(())
        })
        .build()
        .unwrap();
        assert!(rule.is_custom());
        assert_eq!(rule.message(), None);
    }

    #[test]
    fn empty_trigger_set_fires_on_everything() {
        let rule = Rule::builder().required().message("x").build().unwrap();
        assert!(rule.applies_to(None));
        assert!(rule.applies_to(Some(Trigger::Change)));
        assert!(rule.applies_to(Some(Trigger::Blur)));
    }

    #[test]
    fn trigger_set_filters() {
        let rule = Rule::builder()
            .required()
            .message("x")
            .trigger(Trigger::Blur)
            .build()
            .unwrap();
        assert!(rule.applies_to(None));
        assert!(rule.applies_to(Some(Trigger::Blur)));
        assert!(!rule.applies_to(Some(Trigger::Change)));
    }

    #[test]
    fn for_trigger_keeps_order() {
        let set: RuleSet = vec![
            Rule::builder().required().message("a").trigger(Trigger::Blur).build().unwrap(),
            Rule::builder().min(1.0).message("b").trigger(Trigger::Change).build().unwrap(),
            Rule::builder().max(9.0).message("c").build().unwrap(),
        ]
        .into();
        let change = set.for_trigger(Some(Trigger::Change));
        let messages: Vec<_> = change.iter().filter_map(Rule::message).collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert!(set.is_required());
        assert!(!change.is_required());
    }

    #[test]
    fn implied_required_message_names_path() {
        let rule = Rule::implied_required("email");
        assert!(rule.is_required());
        assert_eq!(rule.message(), Some("email is required"));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("Email".parse::<ValueType>().unwrap(), ValueType::Email);
        assert_eq!("BLUR".parse::<Trigger>().unwrap(), Trigger::Blur);
        assert!(matches!("decimal".parse::<ValueType>(), Err(ConfigError::UnknownType(_))));
        assert!(matches!("hover".parse::<Trigger>(), Err(ConfigError::UnknownTrigger(_))));
    }

    #[test]
    fn one_of_collects_values() {
        let rule = Rule::builder()
            .one_of([json!("a"), json!("b")])
            .message("x")
            .build()
            .unwrap();
        let RuleKind::Builtin(builtin) = rule.kind() else {
            panic!("expected builtin");
        };
        assert_eq!(builtin.one_of.as_deref(), Some(&[json!("a"), json!("b")][..]));
    }
}

#![forbid(unsafe_code)]

//! Rule tables from configuration.
//!
//! A table maps property paths to one rule or a list of rules, written the
//! way component props are: camelCase keys, `type`, `enum`, and a `trigger`
//! that is either a single name or a list.
//!
//! ```json
//! {
//!   "name": { "required": true, "message": "name is required", "trigger": "blur" },
//!   "age": [
//!     { "type": "integer", "message": "age must be a whole number" },
//!     { "min": 18, "message": "adults only", "trigger": ["change", "blur"] }
//!   ]
//! }
//! ```
//!
//! Custom validators cannot be written in JSON; add them with
//! [`FormRules::insert`] after loading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::rule::{Rule, RuleSet, Trigger, ValueType};

/// One value or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// Serialized form of a built-in rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub whitespace: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<OneOrMany<String>>,
}

impl TryFrom<RuleDef> for Rule {
    type Error = ConfigError;

    fn try_from(def: RuleDef) -> Result<Self, Self::Error> {
        let mut builder = Rule::builder();
        if def.required {
            builder = builder.required();
        }
        if let Some(name) = def.value_type {
            builder = builder.value_type(name.parse::<ValueType>()?);
        }
        if let Some(len) = def.len {
            builder = builder.len(len);
        }
        if let Some(min) = def.min {
            builder = builder.min(min);
        }
        if let Some(max) = def.max {
            builder = builder.max(max);
        }
        if let Some(pattern) = def.pattern {
            builder = builder.pattern(pattern);
        }
        if def.whitespace {
            builder = builder.whitespace();
        }
        if let Some(values) = def.one_of {
            builder = builder.one_of(values);
        }
        if let Some(message) = def.message {
            builder = builder.message(message);
        }
        for name in def.trigger.map(OneOrMany::into_vec).unwrap_or_default() {
            builder = builder.trigger(name.parse::<Trigger>()?);
        }
        builder.build()
    }
}

/// Form-level rule table: path to ordered rule list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, OneOrMany<RuleDef>>")]
pub struct FormRules {
    by_path: BTreeMap<String, RuleSet>,
}

impl FormRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON rule table.
    ///
    /// # Errors
    ///
    /// Shape errors as [`ConfigError::Json`]; a rule that fails to build as
    /// [`ConfigError::InRule`] naming its path and index.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        let defs: BTreeMap<String, OneOrMany<RuleDef>> = serde_json::from_value(value)?;
        Self::try_from(defs)
    }

    /// Parse a JSON rule table from text.
    ///
    /// # Errors
    ///
    /// See [`FormRules::from_json`].
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_json(serde_json::from_str(text)?)
    }

    /// Set the rules for `path`, replacing any previous entry.
    pub fn insert(&mut self, path: impl Into<String>, rules: impl Into<RuleSet>) {
        self.by_path.insert(path.into(), rules.into());
    }

    /// Chaining form of [`FormRules::insert`].
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, rules: impl Into<RuleSet>) -> Self {
        self.insert(path, rules);
        self
    }

    pub fn remove(&mut self, path: &str) -> Option<RuleSet> {
        self.by_path.remove(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&RuleSet> {
        self.by_path.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl TryFrom<BTreeMap<String, OneOrMany<RuleDef>>> for FormRules {
    type Error = ConfigError;

    fn try_from(defs: BTreeMap<String, OneOrMany<RuleDef>>) -> Result<Self, Self::Error> {
        let mut by_path = BTreeMap::new();
        for (path, defs) in defs {
            let mut rules = RuleSet::new();
            for (index, def) in defs.into_vec().into_iter().enumerate() {
                let rule = Rule::try_from(def).map_err(|source| ConfigError::InRule {
                    path: path.clone(),
                    index,
                    source: Box::new(source),
                })?;
                rules.push(rule);
            }
            by_path.insert(path, rules);
        }
        Ok(Self { by_path })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#![forbid(unsafe_code)]

//! Property paths and the externally owned data model.
//!
//! A form never owns its data. It holds a [`SharedModel`] handle and reads or
//! writes named paths through the [`Model`] trait. [`JsonModel`] is the stock
//! implementation over a `serde_json::Value` tree.
//!
//! # Path syntax
//!
//! Segments are separated by `.`; bracket indices are accepted as sugar, so
//! `items[0].name` and `items.0.name` address the same slot. A numeric segment
//! indexes an array, any segment keys an object.
//!
//! ```rust,ignore
//! use yform_core::{JsonModel, Model, PropPath};
//! use serde_json::json;
//!
//! let mut model = JsonModel::new(json!({ "user": { "tags": ["a", "b"] } }));
//! let path = PropPath::parse("user.tags[1]")?;
//! assert_eq!(model.get(&path), Some(json!("b")));
//! model.set(&path, json!("c"))?;
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde_json::Value;

use crate::error::PathError;

// ---------------------------------------------------------------------------
// PropPath
// ---------------------------------------------------------------------------

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropPath {
    raw: String,
    segments: Vec<String>,
}

impl PropPath {
    /// Parse a path such as `a.b`, `a[0].b` or `.a`.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let segments = parse_segments(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path exactly as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized segments, brackets removed.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Resolve the path against a JSON tree.
    #[must_use]
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match node {
                Value::Object(map) => map.get(segment.as_str()),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Write `value` at this path.
    ///
    /// Every intermediate container must already exist. The final segment may
    /// introduce a new object key but never grows an array.
    pub fn assign(&self, root: &mut Value, value: Value) -> Result<(), PathError> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(PathError::Empty);
        };

        let mut node = root;
        for segment in parents {
            node = match node {
                Value::Object(map) => map
                    .get_mut(segment.as_str())
                    .ok_or_else(|| self.missing(segment))?,
                Value::Array(items) => {
                    let index = self.index(segment, items.len())?;
                    &mut items[index]
                }
                _ => return Err(self.not_a_container(segment)),
            };
        }

        match node {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            Value::Array(items) => {
                let index = self.index(last, items.len())?;
                items[index] = value;
                Ok(())
            }
            _ => Err(self.not_a_container(last)),
        }
    }

    fn index(&self, segment: &str, len: usize) -> Result<usize, PathError> {
        match segment.parse::<usize>() {
            Ok(index) if index < len => Ok(index),
            _ => Err(PathError::IndexOutOfRange {
                path: self.raw.clone(),
                segment: segment.to_string(),
                len,
            }),
        }
    }

    fn missing(&self, segment: &str) -> PathError {
        PathError::Missing {
            path: self.raw.clone(),
            segment: segment.to_string(),
        }
    }

    fn not_a_container(&self, segment: &str) -> PathError {
        PathError::NotAContainer {
            path: self.raw.clone(),
            segment: segment.to_string(),
        }
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PropPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for PropPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn parse_segments(raw: &str) -> Result<Vec<String>, PathError> {
    let path = raw.strip_prefix('.').unwrap_or(raw);
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let empty_segment = || PathError::EmptySegment {
        path: raw.to_string(),
    };

    let mut segments = Vec::new();
    let mut current = String::new();
    // `a[0].b`: the dot after `]` closes nothing and is not an empty segment.
    let mut after_bracket = false;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if current.is_empty() && !after_bracket {
                    return Err(empty_segment());
                }
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                after_bracket = false;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(PathError::UnclosedBracket {
                        path: raw.to_string(),
                    });
                }
                let inner = inner.trim();
                if inner.is_empty() {
                    return Err(empty_segment());
                }
                segments.push(inner.to_string());
                after_bracket = true;
            }
            _ => {
                after_bracket = false;
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        segments.push(current);
    } else if !after_bracket {
        return Err(empty_segment());
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// The data a form is bound to.
///
/// Implementations are owned by the caller; the form only reads and writes
/// through this trait and never locks anything.
pub trait Model {
    /// Read the value at `path`. Missing paths read as `None`.
    fn get(&self, path: &PropPath) -> Option<Value>;

    /// Write `value` at `path`.
    fn set(&mut self, path: &PropPath, value: Value) -> Result<(), PathError>;
}

/// Shared handle to a caller-owned model.
pub type SharedModel = Rc<RefCell<dyn Model>>;

/// A [`Model`] over a JSON tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonModel {
    root: Value,
}

impl JsonModel {
    /// Wrap a JSON tree.
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The whole tree.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Move the model behind a [`SharedModel`] handle.
    #[must_use]
    pub fn into_shared(self) -> SharedModel {
        Rc::new(RefCell::new(self))
    }
}

impl From<Value> for JsonModel {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

impl Model for JsonModel {
    fn get(&self, path: &PropPath) -> Option<Value> {
        path.lookup(&self.root).cloned()
    }

    fn set(&mut self, path: &PropPath, value: Value) -> Result<(), PathError> {
        path.assign(&mut self.root, value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(raw: &str) -> Vec<String> {
        PropPath::parse(raw)
            .unwrap()
            .segments()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_dotted() {
        assert_eq!(segs("a.b.c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_brackets_as_sugar() {
        assert_eq!(segs("items[0].name"), vec!["items", "0", "name"]);
        assert_eq!(segs("items.0.name"), vec!["items", "0", "name"]);
        assert_eq!(segs("grid[1][2]"), vec!["grid", "1", "2"]);
    }

    #[test]
    fn parse_strips_leading_dot() {
        assert_eq!(segs(".name"), vec!["name"]);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(PropPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            PropPath::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PropPath::parse("a."),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PropPath::parse("a[]"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            PropPath::parse("a[0"),
            Err(PathError::UnclosedBracket { .. })
        ));
    }

    #[test]
    fn display_keeps_raw_text() {
        let path = PropPath::parse("items[0].name").unwrap();
        assert_eq!(path.to_string(), "items[0].name");
    }

    #[test]
    fn get_reads_nested_values() {
        let model = JsonModel::new(json!({ "user": { "tags": ["a", "b"] } }));
        let path = PropPath::parse("user.tags[1]").unwrap();
        assert_eq!(model.get(&path), Some(json!("b")));
    }

    #[test]
    fn get_missing_is_none() {
        let model = JsonModel::new(json!({ "user": {} }));
        assert_eq!(model.get(&PropPath::parse("user.name").unwrap()), None);
        assert_eq!(model.get(&PropPath::parse("nope.deeper").unwrap()), None);
    }

    #[test]
    fn set_inserts_new_key() {
        let mut model = JsonModel::new(json!({ "user": {} }));
        let path = PropPath::parse("user.name").unwrap();
        model.set(&path, json!("jack")).unwrap();
        assert_eq!(model.root(), &json!({ "user": { "name": "jack" } }));
    }

    #[test]
    fn set_replaces_array_slot() {
        let mut model = JsonModel::new(json!({ "tags": ["a", "b"] }));
        model
            .set(&PropPath::parse("tags[0]").unwrap(), json!("z"))
            .unwrap();
        assert_eq!(model.root(), &json!({ "tags": ["z", "b"] }));
    }

    #[test]
    fn set_fails_loudly() {
        let mut model = JsonModel::new(json!({ "tags": ["a"], "n": 1 }));
        assert!(matches!(
            model.set(&PropPath::parse("missing.x").unwrap(), json!(1)),
            Err(PathError::Missing { .. })
        ));
        assert!(matches!(
            model.set(&PropPath::parse("tags[3]").unwrap(), json!(1)),
            Err(PathError::IndexOutOfRange { len: 1, .. })
        ));
        assert!(matches!(
            model.set(&PropPath::parse("n.x").unwrap(), json!(1)),
            Err(PathError::NotAContainer { .. })
        ));
    }

    #[test]
    fn shared_handle_is_dyn_model() {
        let shared: SharedModel = JsonModel::new(json!({ "a": 1 })).into_shared();
        let path = PropPath::parse("a").unwrap();
        shared.borrow_mut().set(&path, json!(2)).unwrap();
        assert_eq!(shared.borrow().get(&path), Some(json!(2)));
    }
}

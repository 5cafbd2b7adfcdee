//! Property-based invariant tests for property paths.
//!
//! 1. A dotted path parses into exactly the segments it was joined from.
//! 2. Bracket indices are sugar: `a[0].b` and `a.0.b` have equal segments.
//! 3. Assigning through a path that exists and reading it back returns the
//!    written value and leaves sibling entries alone.
//! 4. Array segments past the end are rejected with `IndexOutOfRange`; the
//!    array never grows.
//! 5. A doubled or trailing dot is always an `EmptySegment` error.

use proptest::prelude::*;
use serde_json::{Value, json};
use yform_core::{PathError, PropPath};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    Key(String),
    Index(usize),
}

impl Step {
    fn segment(&self) -> String {
        match self {
            Step::Key(key) => key.clone(),
            Step::Index(i) => i.to_string(),
        }
    }
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        "[a-z_]{1,6}".prop_map(Step::Key),
        (0usize..4).prop_map(Step::Index),
    ]
}

fn dotted(steps: &[Step]) -> String {
    steps.iter().map(Step::segment).collect::<Vec<_>>().join(".")
}

fn bracketed(steps: &[Step]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        match step {
            Step::Index(index) => out.push_str(&format!("[{index}]")),
            Step::Key(key) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(key);
            }
        }
    }
    out
}

/// A tree in which every step of `steps` resolves, with a sibling
/// `"keep"` entry or trailing array slot next to each container.
fn tree_for(steps: &[Step], leaf: Value) -> Value {
    steps.iter().rev().fold(leaf, |child, step| match step {
        Step::Key(key) => {
            let mut map = serde_json::Map::new();
            map.insert("keep".into(), json!("sibling"));
            map.insert(key.clone(), child);
            Value::Object(map)
        }
        Step::Index(index) => {
            let mut items = vec![json!("sibling"); index + 2];
            items[*index] = child;
            Value::Array(items)
        }
    })
}

fn segments(path: &PropPath) -> Vec<String> {
    path.segments().map(str::to_string).collect()
}

// ═════════════════════════════════════════════════════════════════════════
// Parsing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dotted_paths_round_trip_their_segments(
        steps in proptest::collection::vec(step_strategy(), 1..6),
    ) {
        let path = PropPath::parse(&dotted(&steps)).expect("dotted path parses");
        let expected: Vec<String> = steps.iter().map(Step::segment).collect();
        prop_assert_eq!(segments(&path), expected);
    }

    #[test]
    fn bracket_and_dot_forms_agree(
        steps in proptest::collection::vec(step_strategy(), 1..6),
    ) {
        let dot = PropPath::parse(&dotted(&steps)).expect("dotted path parses");
        let bracket = PropPath::parse(&bracketed(&steps)).expect("bracket path parses");
        prop_assert_eq!(segments(&dot), segments(&bracket));
    }

    #[test]
    fn empty_segments_are_rejected(
        keys in proptest::collection::vec("[a-z]{1,4}", 1..4),
        trailing in any::<bool>(),
    ) {
        let raw = if trailing {
            format!("{}.", keys.join("."))
        } else {
            format!("{}..x", keys.join("."))
        };
        prop_assert!(
            matches!(PropPath::parse(&raw), Err(PathError::EmptySegment { .. })),
            "`{}` should not parse", raw
        );
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Assign / lookup
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn assign_then_lookup_returns_the_written_value(
        steps in proptest::collection::vec(step_strategy(), 1..6),
        written in any::<i64>(),
    ) {
        let mut root = tree_for(&steps, json!(null));
        let path = PropPath::parse(&bracketed(&steps)).expect("path parses");

        let expected = json!(written);
        path.assign(&mut root, expected.clone()).expect("every step exists");
        prop_assert_eq!(path.lookup(&root), Some(&expected));
        prop_assert_eq!(root, tree_for(&steps, json!(written)));
    }

    #[test]
    fn out_of_range_index_never_grows_the_array(
        len in 0usize..5,
        past in 0usize..5,
    ) {
        let mut root = json!({ "items": vec![json!(0); len] });
        let path = PropPath::parse(&format!("items[{}]", len + past)).expect("path parses");

        let result = path.assign(&mut root, json!(1));
        prop_assert!(
            matches!(result, Err(PathError::IndexOutOfRange { len: l, .. }) if l == len),
            "unexpected {:?}", result
        );
        prop_assert_eq!(root["items"].as_array().map(Vec::len), Some(len));
        prop_assert_eq!(path.lookup(&root), None);
    }
}

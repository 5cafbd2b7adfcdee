//! Property-based invariant tests for the rule engine.
//!
//! 1. Built-in-only runs settle synchronously, with at most one error per rule.
//! 2. Errors appear in rule order and carry the run's path.
//! 3. `first` reports exactly the first error a full run would report.
//! 4. Empty values never fail a rule that does not demand presence.
//! 5. String bounds count chars, not bytes.

use proptest::prelude::*;
use serde_json::{Value, json};
use yform_validation::{Rule, RuleSet, RunOptions, run, run_with};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Shape {
    Required,
    Min(u8),
    Max(u8),
    Whitespace,
    Digits,
}

fn shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::Required),
        (0u8..8).prop_map(Shape::Min),
        (0u8..8).prop_map(Shape::Max),
        Just(Shape::Whitespace),
        Just(Shape::Digits),
    ]
}

fn build(shapes: &[Shape]) -> RuleSet {
    shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| {
            let builder = Rule::builder().message(format!("rule {i}"));
            let builder = match shape {
                Shape::Required => builder.required(),
                Shape::Min(n) => builder.min(f64::from(*n)),
                Shape::Max(n) => builder.max(f64::from(*n)),
                Shape::Whitespace => builder.whitespace(),
                Shape::Digits => builder.pattern(r"^\d+$"),
            };
            builder.build().expect("generated rules are well-formed")
        })
        .collect()
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        "[a-z0-9 é日]{0,10}".prop_map(Value::from),
        (0i64..20).prop_map(Value::from),
        proptest::collection::vec(0i64..3, 0..6).prop_map(|v| json!(v)),
    ]
}

fn rule_index(message: &str) -> usize {
    message
        .strip_prefix("rule ")
        .and_then(|n| n.parse().ok())
        .expect("messages are `rule <index>`")
}

// ═════════════════════════════════════════════════════════════════════════
// Ordering and synchrony
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn builtin_runs_settle_synchronously_in_order(
        shapes in proptest::collection::vec(shape(), 0..8),
        value in value(),
    ) {
        let rules = build(&shapes);
        let run = run(&rules, &value, "field.path");
        prop_assert!(run.is_finished());
        let errors = run.errors();
        prop_assert!(errors.len() <= rules.len());

        let indices: Vec<usize> = errors.iter().map(|e| rule_index(&e.message)).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        prop_assert_eq!(&indices, &sorted);
        prop_assert!(errors.iter().all(|e| e.field == "field.path"));

        let outcome = run.completion().outcome().expect("settled");
        prop_assert_eq!(outcome.is_ok(), errors.is_empty());
    }

    #[test]
    fn first_reports_the_first_full_error(
        shapes in proptest::collection::vec(shape(), 0..8),
        value in value(),
    ) {
        let rules = build(&shapes);
        let full = run(&rules, &value, "p").errors();
        let first = run_with(&rules, &value, "p", RunOptions { first: true }).errors();
        prop_assert!(first.len() <= 1);
        prop_assert_eq!(first.first(), full.first());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Check semantics
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn empty_values_only_fail_presence(
        shapes in proptest::collection::vec(shape(), 1..8),
        empty in prop_oneof![Just(Value::Null), Just(json!("")), Just(json!([]))],
    ) {
        let rules = build(&shapes);
        for error in run(&rules, &empty, "p").errors() {
            let index = rule_index(&error.message);
            prop_assert!(matches!(shapes[index], Shape::Required));
        }
    }

    #[test]
    fn string_bounds_count_chars(text in "[a-zé日]{1,12}", bound in 1u8..12) {
        let rules = build(&[Shape::Max(bound)]);
        let failed = !run(&rules, &json!(text), "p").errors().is_empty();
        prop_assert_eq!(failed, text.chars().count() > usize::from(bound));
    }
}

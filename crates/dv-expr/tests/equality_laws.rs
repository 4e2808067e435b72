use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use dv_expr::{
    AggregateFunction, ArithmeticOp, ComparisonOp, SemanticExpr, SemanticFilter, expr_equals,
    filter_equals,
};
use proptest::prelude::*;

fn hash_of(expr: &SemanticExpr) -> u64 {
    let mut hasher = DefaultHasher::new();
    expr.hash(&mut hasher);
    hasher.finish()
}

fn leaf() -> impl Strategy<Value = SemanticExpr> {
    prop_oneof![
        "[A-Z][a-z]{0,5}".prop_map(|entity| SemanticExpr::entity(entity)),
        ("[A-Z][a-z]{0,5}", "[a-z]{1,5}").prop_map(|(entity, name)| SemanticExpr::column(entity, name)),
        ("[A-Z][a-z]{0,5}", "[a-z]{1,5}").prop_map(|(entity, name)| SemanticExpr::measure(entity, name)),
        any::<i64>().prop_map(|value| SemanticExpr::constant(value)),
        any::<f64>().prop_map(|value| SemanticExpr::constant(value)),
        "[a-z]{0,4}".prop_map(|value| SemanticExpr::constant(value)),
    ]
}

fn expr() -> impl Strategy<Value = SemanticExpr> {
    leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| SemanticExpr::compare(ComparisonOp::Eq, l, r)),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| SemanticExpr::arithmetic(ArithmeticOp::Add, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| SemanticExpr::and(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| SemanticExpr::or(l, r)),
            inner.clone().prop_map(SemanticExpr::not),
            inner
                .clone()
                .prop_map(|arg| SemanticExpr::aggregate(arg, AggregateFunction::Sum)),
            prop::collection::vec(inner, 0..3)
                .prop_map(|args| SemanticExpr::In { args, values: Vec::new() }),
        ]
    })
}

proptest! {
    #[test]
    fn equality_is_reflexive_across_rebuilt_trees(a in expr()) {
        let rebuilt = a.clone();
        prop_assert!(expr_equals(Some(&a), Some(&a)));
        prop_assert!(expr_equals(Some(&a), Some(&rebuilt)));
        prop_assert_eq!(hash_of(&a), hash_of(&rebuilt));
    }

    #[test]
    fn equality_is_symmetric(a in expr(), b in expr()) {
        prop_assert_eq!(a == b, b == a);
    }

    #[test]
    fn equal_trees_hash_alike(a in expr(), b in expr()) {
        if a == b {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn wrapping_distinguishes_trees(a in expr()) {
        let negated = SemanticExpr::not(a.clone());
        prop_assert_ne!(&negated, &a);
    }

    #[test]
    fn filter_equality_follows_targets_and_condition(
        targets in prop::collection::vec(expr(), 0..3),
        condition in expr(),
    ) {
        let first = SemanticFilter::new(targets.clone(), condition.clone());
        let second = SemanticFilter::new(targets, condition);
        prop_assert!(filter_equals(Some(&first), Some(&second)));

        let mut extended = second.clone();
        extended.targets.push(SemanticExpr::entity("Extra"));
        prop_assert!(!filter_equals(Some(&first), Some(&extended)));
    }
}

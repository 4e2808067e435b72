use serde::{Deserialize, Serialize};

use crate::SemanticExpr;

/// A filter over a composite key: `targets` are order-significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticFilter {
    #[serde(default)]
    pub targets: Vec<SemanticExpr>,
    pub condition: SemanticExpr,
}

impl SemanticFilter {
    #[must_use]
    pub fn new(targets: Vec<SemanticExpr>, condition: SemanticExpr) -> Self {
        Self { targets, condition }
    }
}

/// Filters are equal when their target sequences match pairwise, in order,
/// and their conditions are structurally equal.
#[must_use]
pub fn filter_equals(left: Option<&SemanticFilter>, right: Option<&SemanticFilter>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => {
            std::ptr::eq(left, right)
                || (targets_equal(left, right) && left.condition == right.condition)
        }
        _ => false,
    }
}

#[must_use]
pub fn targets_equal(left: &SemanticFilter, right: &SemanticFilter) -> bool {
    left.targets.len() == right.targets.len()
        && left
            .targets
            .iter()
            .zip(&right.targets)
            .all(|(l, r)| l == r)
}

/// Whether any filter in `filters` is structurally equal to `target`.
/// An absent or empty collection contains nothing.
#[must_use]
pub fn filters_contain(filters: Option<&[SemanticFilter]>, target: &SemanticFilter) -> bool {
    filters
        .unwrap_or_default()
        .iter()
        .any(|filter| filter_equals(Some(filter), Some(target)))
}

impl PartialEq for SemanticFilter {
    fn eq(&self, other: &Self) -> bool {
        filter_equals(Some(self), Some(other))
    }
}

impl Eq for SemanticFilter {}

#[cfg(test)]
mod tests {
    use crate::{ComparisonOp, SemanticExpr};

    use super::{SemanticFilter, filter_equals, filters_contain};

    fn region_filter(targets: &[(&str, &str)], value: &str) -> SemanticFilter {
        SemanticFilter::new(
            targets
                .iter()
                .map(|(entity, name)| SemanticExpr::column(*entity, *name))
                .collect(),
            SemanticExpr::compare(
                ComparisonOp::Eq,
                SemanticExpr::column("Geo", "Region"),
                SemanticExpr::constant(value),
            ),
        )
    }

    #[test]
    fn rebuilt_filters_are_equal() {
        let first = region_filter(&[("Geo", "Region"), ("Geo", "City")], "West");
        let second = region_filter(&[("Geo", "Region"), ("Geo", "City")], "West");
        assert!(filter_equals(Some(&first), Some(&second)));
        assert!(filter_equals(None, None));
        assert!(!filter_equals(Some(&first), None));
    }

    #[test]
    fn target_order_is_significant() {
        let first = region_filter(&[("Geo", "Region"), ("Geo", "City")], "West");
        let scrambled = region_filter(&[("Geo", "City"), ("Geo", "Region")], "West");
        assert_ne!(first, scrambled);
    }

    #[test]
    fn target_length_or_condition_change_breaks_equality() {
        let first = region_filter(&[("Geo", "Region"), ("Geo", "City")], "West");
        let shorter = region_filter(&[("Geo", "Region")], "West");
        let other_condition = region_filter(&[("Geo", "Region"), ("Geo", "City")], "East");
        let other_target = region_filter(&[("Geo", "Region"), ("Geo", "State")], "West");
        assert_ne!(first, shorter);
        assert_ne!(first, other_condition);
        assert_ne!(first, other_target);
    }

    #[test]
    fn contains_matches_structurally() {
        let filters = vec![
            region_filter(&[("Geo", "Region")], "East"),
            region_filter(&[("Geo", "Region")], "West"),
        ];
        let wanted = region_filter(&[("Geo", "Region")], "West");
        assert!(filters_contain(Some(filters.as_slice()), &wanted));
        assert!(!filters_contain(Some(&filters[..1]), &wanted));
        assert!(!filters_contain(Some(&[][..]), &wanted));
        assert!(!filters_contain(None, &wanted));
    }
}

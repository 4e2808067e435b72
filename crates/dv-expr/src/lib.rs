#![forbid(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;

pub use dv_columnar::{ArithmeticOp, ComparisonOp};
use dv_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fill_rule;
mod filter;
mod role_wildcard;

pub use fill_rule::{FillRule, RuleColorStop};
pub use filter::{SemanticFilter, filter_equals, filters_contain, targets_equal};
pub use role_wildcard::{RoleWildcard, role_wildcard_equals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountNonNull,
    Median,
}

/// An immutable node of a semantic query expression.
///
/// Trees are rebuilt by every binding pass, so two trees must be compared by
/// shape, never by address. `PartialEq` and `Hash` are structural and agree
/// with each other; constants compare with [`Scalar::semantic_eq`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticExpr {
    Entity {
        entity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    ColumnRef {
        source: Box<SemanticExpr>,
        name: String,
    },
    MeasureRef {
        source: Box<SemanticExpr>,
        name: String,
    },
    Aggregation {
        arg: Box<SemanticExpr>,
        function: AggregateFunction,
    },
    Constant {
        value: Scalar,
    },
    Compare {
        op: ComparisonOp,
        left: Box<SemanticExpr>,
        right: Box<SemanticExpr>,
    },
    And {
        left: Box<SemanticExpr>,
        right: Box<SemanticExpr>,
    },
    Or {
        left: Box<SemanticExpr>,
        right: Box<SemanticExpr>,
    },
    Not {
        expr: Box<SemanticExpr>,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<SemanticExpr>,
        right: Box<SemanticExpr>,
    },
    In {
        args: Vec<SemanticExpr>,
        values: Vec<Vec<SemanticExpr>>,
    },
    FillRule {
        input: Box<SemanticExpr>,
        rule: FillRule,
    },
}

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("role wildcard requires at least one role")]
    EmptyRoleWildcard,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SemanticExpr {
    #[must_use]
    pub fn entity(entity: impl Into<String>) -> Self {
        Self::Entity {
            entity: entity.into(),
            schema: None,
        }
    }

    #[must_use]
    pub fn column(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ColumnRef {
            source: Box::new(Self::entity(entity)),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn measure(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MeasureRef {
            source: Box::new(Self::entity(entity)),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn constant(value: impl Into<Scalar>) -> Self {
        Self::Constant {
            value: value.into(),
        }
    }

    #[must_use]
    pub fn aggregate(arg: Self, function: AggregateFunction) -> Self {
        Self::Aggregation {
            arg: Box::new(arg),
            function,
        }
    }

    #[must_use]
    pub fn compare(op: ComparisonOp, left: Self, right: Self) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn not(expr: Self) -> Self {
        Self::Not {
            expr: Box::new(expr),
        }
    }

    #[must_use]
    pub fn arithmetic(op: ArithmeticOp, left: Self, right: Self) -> Self {
        Self::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn fill_rule(input: Self, rule: FillRule) -> Self {
        Self::FillRule {
            input: Box::new(input),
            rule,
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, ExprError> {
        Ok(serde_json::from_str(input)?)
    }

    #[must_use]
    pub fn is_fill_rule(&self) -> bool {
        matches!(self, Self::FillRule { .. })
    }

    /// The input and rule of a fill-rule node.
    #[must_use]
    pub fn as_fill_rule(&self) -> Option<(&Self, &FillRule)> {
        match self {
            Self::FillRule { input, rule } => Some((input, rule)),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Entity { .. } => "entity",
            Self::ColumnRef { .. } => "column_ref",
            Self::MeasureRef { .. } => "measure_ref",
            Self::Aggregation { .. } => "aggregation",
            Self::Constant { .. } => "constant",
            Self::Compare { .. } => "compare",
            Self::And { .. } => "and",
            Self::Or { .. } => "or",
            Self::Not { .. } => "not",
            Self::Arithmetic { .. } => "arithmetic",
            Self::In { .. } => "in",
            Self::FillRule { .. } => "fill_rule",
        }
    }
}

/// Structural equality with absent operands folded to one empty value.
///
/// `expr_equals(None, None)` holds; an absent operand never equals a present
/// one.
#[must_use]
pub fn expr_equals(left: Option<&SemanticExpr>, right: Option<&SemanticExpr>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

impl PartialEq for SemanticExpr {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        match (self, other) {
            (
                Self::Entity {
                    entity: e1,
                    schema: s1,
                },
                Self::Entity {
                    entity: e2,
                    schema: s2,
                },
            ) => e1 == e2 && s1 == s2,
            (
                Self::ColumnRef {
                    source: src1,
                    name: n1,
                },
                Self::ColumnRef {
                    source: src2,
                    name: n2,
                },
            )
            | (
                Self::MeasureRef {
                    source: src1,
                    name: n1,
                },
                Self::MeasureRef {
                    source: src2,
                    name: n2,
                },
            ) => src1 == src2 && n1 == n2,
            (
                Self::Aggregation {
                    arg: a1,
                    function: f1,
                },
                Self::Aggregation {
                    arg: a2,
                    function: f2,
                },
            ) => f1 == f2 && a1 == a2,
            (Self::Constant { value: v1 }, Self::Constant { value: v2 }) => v1.semantic_eq(v2),
            (
                Self::Compare {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                Self::Compare {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && l1 == l2 && r1 == r2,
            (
                Self::Arithmetic {
                    op: o1,
                    left: l1,
                    right: r1,
                },
                Self::Arithmetic {
                    op: o2,
                    left: l2,
                    right: r2,
                },
            ) => o1 == o2 && l1 == l2 && r1 == r2,
            (Self::And { left: l1, right: r1 }, Self::And { left: l2, right: r2 })
            | (Self::Or { left: l1, right: r1 }, Self::Or { left: l2, right: r2 }) => {
                l1 == l2 && r1 == r2
            }
            (Self::Not { expr: e1 }, Self::Not { expr: e2 }) => e1 == e2,
            (
                Self::In {
                    args: a1,
                    values: v1,
                },
                Self::In {
                    args: a2,
                    values: v2,
                },
            ) => a1 == a2 && v1 == v2,
            (
                Self::FillRule {
                    input: i1,
                    rule: r1,
                },
                Self::FillRule {
                    input: i2,
                    rule: r2,
                },
            ) => i1 == i2 && r1 == r2,
            _ => false,
        }
    }
}

impl Eq for SemanticExpr {}

impl Hash for SemanticExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Entity { entity, schema } => {
                entity.hash(state);
                schema.hash(state);
            }
            Self::ColumnRef { source, name } | Self::MeasureRef { source, name } => {
                source.hash(state);
                name.hash(state);
            }
            Self::Aggregation { arg, function } => {
                function.hash(state);
                arg.hash(state);
            }
            Self::Constant { value } => hash_scalar(value, state),
            Self::Compare { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Self::Arithmetic { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            Self::And { left, right } | Self::Or { left, right } => {
                left.hash(state);
                right.hash(state);
            }
            Self::Not { expr } => expr.hash(state),
            Self::In { args, values } => {
                args.hash(state);
                values.hash(state);
            }
            Self::FillRule { input, rule } => {
                input.hash(state);
                rule.hash(state);
            }
        }
    }
}

fn hash_scalar<H: Hasher>(value: &Scalar, state: &mut H) {
    // Float NaN and the NaN null marker are semantically equal.
    if value.is_nan() {
        u8::MAX.hash(state);
        return;
    }
    mem::discriminant(value).hash(state);
    match value {
        Scalar::Null(kind) => kind.hash(state),
        Scalar::Bool(v) => v.hash(state),
        Scalar::Int64(v) => v.hash(state),
        Scalar::Float64(v) => Scalar::canonical_float_bits(*v).hash(state),
        Scalar::Utf8(v) => v.hash(state),
        Scalar::DateTime(v) => v.hash(state),
    }
}

impl fmt::Display for SemanticExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity { entity, schema } => match schema {
                Some(schema) => write!(f, "{schema}.{entity}"),
                None => f.write_str(entity),
            },
            Self::ColumnRef { source, name } | Self::MeasureRef { source, name } => {
                write!(f, "{source}.{name}")
            }
            Self::Aggregation { arg, function } => write!(f, "{function:?}({arg})"),
            Self::Constant { value } => match value {
                Scalar::Utf8(v) => write!(f, "'{v}'"),
                other => write!(f, "{other}"),
            },
            Self::Compare { op, left, right } => write!(f, "({left} {op:?} {right})"),
            Self::Arithmetic { op, left, right } => write!(f, "({left} {op:?} {right})"),
            Self::And { left, right } => write!(f, "({left} and {right})"),
            Self::Or { left, right } => write!(f, "({left} or {right})"),
            Self::Not { expr } => write!(f, "not {expr}"),
            Self::In { args, values } => write!(f, "in[{}x{}]", args.len(), values.len()),
            Self::FillRule { input, rule } => write!(f, "fill_rule({input}, {})", rule.kind_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use dv_types::{NullKind, Scalar};

    use super::{AggregateFunction, ComparisonOp, FillRule, SemanticExpr, expr_equals};

    fn hash_of(expr: &SemanticExpr) -> u64 {
        let mut hasher = DefaultHasher::new();
        expr.hash(&mut hasher);
        hasher.finish()
    }

    fn sales_over(threshold: f64) -> SemanticExpr {
        SemanticExpr::compare(
            ComparisonOp::Gt,
            SemanticExpr::aggregate(
                SemanticExpr::column("Sales", "Amount"),
                AggregateFunction::Sum,
            ),
            SemanticExpr::constant(threshold),
        )
    }

    #[test]
    fn absent_operands_fold_to_one_empty_value() {
        let expr = SemanticExpr::column("Sales", "Amount");
        assert!(expr_equals(None, None));
        assert!(!expr_equals(Some(&expr), None));
        assert!(!expr_equals(None, Some(&expr)));
    }

    #[test]
    fn identical_instance_is_equal() {
        let expr = sales_over(10.0);
        assert!(expr_equals(Some(&expr), Some(&expr)));
    }

    #[test]
    fn independently_rebuilt_trees_are_equal_and_hash_alike() {
        let first = sales_over(10.0);
        let second = sales_over(10.0);
        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));
    }

    #[test]
    fn any_changed_leaf_breaks_equality() {
        assert_ne!(sales_over(10.0), sales_over(11.0));
        assert_ne!(
            SemanticExpr::column("Sales", "Amount"),
            SemanticExpr::measure("Sales", "Amount")
        );
        assert_ne!(
            SemanticExpr::aggregate(
                SemanticExpr::column("Sales", "Amount"),
                AggregateFunction::Sum
            ),
            SemanticExpr::aggregate(
                SemanticExpr::column("Sales", "Amount"),
                AggregateFunction::Avg
            )
        );
    }

    #[test]
    fn nan_constants_are_reflexive() {
        let left = SemanticExpr::constant(f64::NAN);
        let right = SemanticExpr::Constant {
            value: Scalar::Null(NullKind::NaN),
        };
        assert_eq!(left, left.clone());
        assert_eq!(left, right);
        assert_eq!(hash_of(&left), hash_of(&right));
        assert_eq!(
            hash_of(&SemanticExpr::constant(-0.0)),
            hash_of(&SemanticExpr::constant(0.0))
        );
    }

    #[test]
    fn fill_rules_compare_by_rule_definition() {
        let input = SemanticExpr::column("Sales", "Amount");
        let red = SemanticExpr::fill_rule(
            input.clone(),
            FillRule::Solid {
                color: "#ff0000".to_owned(),
            },
        );
        let blue = SemanticExpr::fill_rule(
            input,
            FillRule::Solid {
                color: "#0000ff".to_owned(),
            },
        );
        assert!(red.is_fill_rule());
        assert_ne!(red, blue);
        assert_eq!(red, red.clone());
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let expr = sales_over(2.5);
        let json = serde_json::to_string(&expr).expect("serialize");
        let back = SemanticExpr::from_json_str(&json).expect("deserialize");
        assert_eq!(expr, back);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(sales_over(3.0).to_string(), "(Sum(Sales.Amount) Gt 3)");
    }
}

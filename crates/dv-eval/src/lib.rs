#![forbid(unsafe_code)]

use dv_color::{ColorAllocator, ColorAllocatorCache, format_hex_color};
use dv_columnar::{ComparisonOp, arithmetic_scalars, compare_scalars};
use dv_expr::SemanticExpr;
use dv_frame::{DataShape, DataShapeKind, DataShapeKinds, SelectTransform};
use dv_types::{NullKind, Scalar};
use peniko::Color;

mod categorical;
mod matrix;
mod table;

pub use categorical::CategoricalEvalContext;
pub use matrix::MatrixEvalContext;
pub use table::TableEvalContext;

/// Capability surface shared by every shape-specific context. A capability a
/// shape cannot serve answers `None`.
pub trait EvalContext {
    /// Value of `expr` at the current row; `None` before a row is selected
    /// or when the expression cannot be resolved.
    fn expr_value(&self, expr: &SemanticExpr) -> Option<Scalar>;

    /// Allocator registered for `fill_rule` in the pass's cache.
    fn color_allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator>;

    fn role_value(&self, role: &str) -> Option<Scalar>;
}

/// A context driven row by row.
pub trait RowEvalContext: EvalContext {
    /// Range is not checked; an out-of-range row resolves whatever the
    /// backing store yields for it, usually nothing.
    fn set_current_row_index(&mut self, index: usize);

    fn current_row_index(&self) -> Option<usize>;
}

/// One row of a shape, as seen by the expression evaluator.
pub(crate) trait RowScope {
    /// Stored value for an expression bound to a select or column.
    fn bound_value(&self, expr: &SemanticExpr) -> Option<Scalar>;

    fn allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator>;
}

/// Resolve `expr` against one row.
///
/// References resolve through the bound columns only. Operators are
/// evaluated over their resolved operands and an unresolvable operand makes
/// the whole node unresolvable.
pub(crate) fn evaluate<S: RowScope + ?Sized>(scope: &S, expr: &SemanticExpr) -> Option<Scalar> {
    match expr {
        SemanticExpr::Entity { .. }
        | SemanticExpr::ColumnRef { .. }
        | SemanticExpr::MeasureRef { .. }
        | SemanticExpr::Aggregation { .. } => scope.bound_value(expr),
        SemanticExpr::Constant { value } => Some(value.clone()),
        SemanticExpr::Compare { op, left, right } => {
            let left = evaluate(scope, left)?;
            let right = evaluate(scope, right)?;
            compare_scalars(&left, &right, *op).ok()
        }
        SemanticExpr::Arithmetic { op, left, right } => {
            let left = evaluate(scope, left)?;
            let right = evaluate(scope, right)?;
            arithmetic_scalars(&left, &right, *op).ok()
        }
        SemanticExpr::And { left, right } => {
            let left = evaluate(scope, left)?;
            let right = evaluate(scope, right)?;
            logical(&left, &right, |a, b| a && b)
        }
        SemanticExpr::Or { left, right } => {
            let left = evaluate(scope, left)?;
            let right = evaluate(scope, right)?;
            logical(&left, &right, |a, b| a || b)
        }
        SemanticExpr::Not { expr } => {
            let value = evaluate(scope, expr)?;
            if value.is_missing() {
                return Some(Scalar::Null(NullKind::Null));
            }
            value.as_bool().map(|v| Scalar::Bool(!v))
        }
        SemanticExpr::In { args, values } => {
            let args = args
                .iter()
                .map(|arg| evaluate(scope, arg))
                .collect::<Option<Vec<_>>>()?;
            if args.iter().any(Scalar::is_missing) {
                return Some(Scalar::Null(NullKind::Null));
            }
            let mut found = false;
            for tuple in values {
                if tuple.len() != args.len() {
                    continue;
                }
                let tuple = tuple
                    .iter()
                    .map(|value| evaluate(scope, value))
                    .collect::<Option<Vec<_>>>()?;
                if args.iter().zip(&tuple).all(|(a, b)| values_equal(a, b)) {
                    found = true;
                    break;
                }
            }
            Some(Scalar::Bool(found))
        }
        SemanticExpr::FillRule { input, .. } => {
            let allocator = scope.allocator(expr)?;
            let value = evaluate(scope, input)?;
            allocator
                .color(&value)
                .map(|color| Scalar::Utf8(format_hex_color(color)))
        }
    }
}

/// Row-level equality shared by `compare` and `in`: numbers match across
/// dtypes by value.
fn values_equal(left: &Scalar, right: &Scalar) -> bool {
    compare_scalars(left, right, ComparisonOp::Eq)
        .ok()
        .and_then(|out| out.as_bool())
        .unwrap_or(false)
}

fn logical(left: &Scalar, right: &Scalar, op: impl Fn(bool, bool) -> bool) -> Option<Scalar> {
    if left.is_missing() || right.is_missing() {
        return Some(Scalar::Null(NullKind::Null));
    }
    Some(Scalar::Bool(op(left.as_bool()?, right.as_bool()?)))
}

/// Color of the current row under `fill_rule`, skipping the hex round trip.
pub fn color_value<C: EvalContext + ?Sized>(ctx: &C, fill_rule: &SemanticExpr) -> Option<Color> {
    let (input, _) = fill_rule.as_fill_rule()?;
    let allocator = ctx.color_allocator(fill_rule)?;
    let value = ctx.expr_value(input)?;
    allocator.color(&value)
}

/// The context for whichever representation a consumer renders from.
#[derive(Debug)]
pub enum ShapeEvalContext<'a> {
    Categorical(CategoricalEvalContext<'a>),
    Table(TableEvalContext<'a>),
    Matrix(MatrixEvalContext<'a>),
}

impl ShapeEvalContext<'_> {
    #[must_use]
    pub fn kind(&self) -> DataShapeKind {
        match self {
            Self::Categorical(_) => DataShapeKind::Categorical,
            Self::Table(_) => DataShapeKind::Table,
            Self::Matrix(_) => DataShapeKind::Matrix,
        }
    }
}

/// Build a context over the first representation, in categorical, table,
/// matrix order, that `kinds` targets and `shape` carries.
#[must_use]
pub fn create_eval_context<'a>(
    shape: &'a DataShape,
    kinds: DataShapeKinds,
    selects: &'a [Option<SelectTransform>],
    cache: &'a ColorAllocatorCache,
) -> Option<ShapeEvalContext<'a>> {
    let targets = |kind: DataShapeKind| kinds.contains(kind);
    if let Some(categorical) = shape
        .categorical
        .as_ref()
        .filter(|_| targets(DataShapeKind::Categorical))
    {
        return Some(ShapeEvalContext::Categorical(CategoricalEvalContext::new(
            categorical,
            selects,
            cache,
        )));
    }
    if let Some(table) = shape.table.as_ref().filter(|_| targets(DataShapeKind::Table)) {
        return Some(ShapeEvalContext::Table(TableEvalContext::new(
            table, selects, cache,
        )));
    }
    if let Some(matrix) = shape.matrix.as_ref().filter(|_| targets(DataShapeKind::Matrix)) {
        return Some(ShapeEvalContext::Matrix(MatrixEvalContext::new(
            matrix, selects, cache,
        )));
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(?kinds, "shape carries no targeted representation");
    None
}

impl EvalContext for ShapeEvalContext<'_> {
    fn expr_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        match self {
            Self::Categorical(ctx) => ctx.expr_value(expr),
            Self::Table(ctx) => ctx.expr_value(expr),
            Self::Matrix(ctx) => ctx.expr_value(expr),
        }
    }

    fn color_allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        match self {
            Self::Categorical(ctx) => ctx.color_allocator(fill_rule),
            Self::Table(ctx) => ctx.color_allocator(fill_rule),
            Self::Matrix(ctx) => ctx.color_allocator(fill_rule),
        }
    }

    fn role_value(&self, role: &str) -> Option<Scalar> {
        match self {
            Self::Categorical(ctx) => ctx.role_value(role),
            Self::Table(ctx) => ctx.role_value(role),
            Self::Matrix(ctx) => ctx.role_value(role),
        }
    }
}

impl RowEvalContext for ShapeEvalContext<'_> {
    fn set_current_row_index(&mut self, index: usize) {
        match self {
            Self::Categorical(ctx) => ctx.set_current_row_index(index),
            Self::Table(ctx) => ctx.set_current_row_index(index),
            Self::Matrix(ctx) => ctx.set_current_row_index(index),
        }
    }

    fn current_row_index(&self) -> Option<usize> {
        match self {
            Self::Categorical(ctx) => ctx.current_row_index(),
            Self::Table(ctx) => ctx.current_row_index(),
            Self::Matrix(ctx) => ctx.current_row_index(),
        }
    }
}

#[cfg(test)]
mod tests {
    use dv_color::{ColorAllocatorCache, ColorAllocatorFactory, DefaultColorAllocatorFactory};
    use dv_columnar::Column;
    use dv_expr::{ComparisonOp, FillRule, RuleColorStop, SemanticExpr};
    use dv_frame::{
        CategoricalData, CategoryColumn, ColumnMetadata, DataShape, DataShapeKind,
        DataShapeKinds, SelectTransform, TableData, ValueColumn, ValueColumns,
    };
    use dv_runtime::RuntimePolicy;
    use dv_types::Scalar;

    use super::{EvalContext, RowEvalContext, color_value, create_eval_context};

    fn column(values: Vec<Scalar>) -> Column {
        Column::from_values(values).expect("column")
    }

    fn shape() -> DataShape {
        let region = ColumnMetadata::new("Region")
            .with_index(0)
            .with_role("Category")
            .with_expr(SemanticExpr::column("Geo", "Region"));
        let amount = ColumnMetadata::new("Amount")
            .with_index(1)
            .with_role("Y")
            .with_expr(SemanticExpr::column("Sales", "Amount"));
        let regions = column(vec![Scalar::from("East"), Scalar::from("West")]);
        let amounts = column(vec![Scalar::Int64(10), Scalar::Int64(90)]);
        DataShape {
            table: Some(
                TableData::new(
                    vec![region.clone(), amount.clone()],
                    vec![regions.clone(), amounts.clone()],
                )
                .expect("table"),
            ),
            categorical: Some(
                CategoricalData::new(
                    vec![CategoryColumn {
                        source: region,
                        values: regions,
                        identity_fields: Vec::new(),
                    }],
                    ValueColumns::new(
                        vec![ValueColumn {
                            source: amount,
                            values: amounts,
                            identity: None,
                        }],
                        None,
                        Vec::new(),
                    ),
                )
                .expect("categorical"),
            ),
            ..DataShape::default()
        }
    }

    fn selects() -> Vec<Option<SelectTransform>> {
        vec![
            Some(SelectTransform::new("Geo.Region", SemanticExpr::column("Geo", "Region"))),
            Some(SelectTransform::new("Sales.Amount", SemanticExpr::column("Sales", "Amount"))),
        ]
    }

    fn gradient() -> SemanticExpr {
        SemanticExpr::fill_rule(
            SemanticExpr::column("Sales", "Amount"),
            FillRule::LinearGradient2 {
                min: RuleColorStop::at("#000000", SemanticExpr::constant(0_i64)),
                max: RuleColorStop::at("#0000ff", SemanticExpr::constant(100_i64)),
                null_color: None,
            },
        )
    }

    fn cache_with_gradient() -> ColorAllocatorCache {
        let mut cache = ColorAllocatorCache::with_policy(RuntimePolicy::strict());
        let rule = gradient();
        let (_, fill) = rule.as_fill_rule().expect("fill rule");
        let allocator = DefaultColorAllocatorFactory
            .allocator_for(fill, None)
            .expect("allocator");
        cache.register(rule, allocator);
        cache
    }

    #[test]
    fn shape_context_prefers_categorical_representation() {
        let shape = shape();
        let selects = selects();
        let cache = cache_with_gradient();
        let ctx = create_eval_context(&shape, DataShapeKinds::all(), &selects, &cache)
            .expect("context");
        assert_eq!(ctx.kind(), DataShapeKind::Categorical);

        let table_only =
            create_eval_context(&shape, DataShapeKinds::only(DataShapeKind::Table), &selects, &cache)
                .expect("context");
        assert_eq!(table_only.kind(), DataShapeKind::Table);

        assert!(
            create_eval_context(&shape, DataShapeKinds::only(DataShapeKind::Matrix), &selects, &cache)
                .is_none()
        );
    }

    #[test]
    fn operators_evaluate_over_bound_columns() {
        let shape = shape();
        let selects = selects();
        let cache = cache_with_gradient();
        let mut ctx = create_eval_context(&shape, DataShapeKinds::all(), &selects, &cache)
            .expect("context");
        ctx.set_current_row_index(1);

        let over_50 = SemanticExpr::compare(
            ComparisonOp::Gt,
            SemanticExpr::column("Sales", "Amount"),
            SemanticExpr::constant(50_i64),
        );
        assert_eq!(ctx.expr_value(&over_50), Some(Scalar::Bool(true)));
        let west_and_big = SemanticExpr::and(
            over_50.clone(),
            SemanticExpr::compare(
                ComparisonOp::Eq,
                SemanticExpr::column("Geo", "Region"),
                SemanticExpr::constant("West"),
            ),
        );
        assert_eq!(ctx.expr_value(&west_and_big), Some(Scalar::Bool(true)));
        assert_eq!(
            ctx.expr_value(&SemanticExpr::not(over_50)),
            Some(Scalar::Bool(false))
        );
        let in_list = SemanticExpr::In {
            args: vec![SemanticExpr::column("Geo", "Region")],
            values: vec![
                vec![SemanticExpr::constant("North")],
                vec![SemanticExpr::constant("West")],
            ],
        };
        assert_eq!(ctx.expr_value(&in_list), Some(Scalar::Bool(true)));
        let unknown = SemanticExpr::compare(
            ComparisonOp::Gt,
            SemanticExpr::column("Sales", "Qty"),
            SemanticExpr::constant(50_i64),
        );
        assert_eq!(ctx.expr_value(&unknown), None);
    }

    #[test]
    fn in_and_compare_agree_across_numeric_dtypes() {
        let shape = shape();
        let selects = selects();
        let cache = cache_with_gradient();
        let mut ctx = create_eval_context(&shape, DataShapeKinds::all(), &selects, &cache)
            .expect("context");
        ctx.set_current_row_index(1);

        let amount = SemanticExpr::column("Sales", "Amount");
        let equal = SemanticExpr::compare(
            ComparisonOp::Eq,
            amount.clone(),
            SemanticExpr::constant(90.0),
        );
        assert_eq!(ctx.expr_value(&equal), Some(Scalar::Bool(true)));
        let listed = SemanticExpr::In {
            args: vec![amount.clone()],
            values: vec![vec![SemanticExpr::constant(90.0)]],
        };
        assert_eq!(ctx.expr_value(&listed), Some(Scalar::Bool(true)));
        let text = SemanticExpr::In {
            args: vec![amount],
            values: vec![vec![SemanticExpr::constant("90")]],
        };
        assert_eq!(ctx.expr_value(&text), Some(Scalar::Bool(false)));
    }

    #[test]
    fn fill_rule_resolves_through_cache() {
        let shape = shape();
        let selects = selects();
        let cache = cache_with_gradient();
        let mut ctx = create_eval_context(&shape, DataShapeKinds::all(), &selects, &cache)
            .expect("context");
        ctx.set_current_row_index(1);

        assert_eq!(ctx.expr_value(&gradient()), Some(Scalar::from("#0000e6")));
        let color = color_value(&ctx, &gradient()).expect("color");
        assert_eq!(dv_color::format_hex_color(color), "#0000e6");

        let unregistered = SemanticExpr::fill_rule(
            SemanticExpr::column("Sales", "Amount"),
            FillRule::Solid {
                color: "#ffffff".to_owned(),
            },
        );
        assert_eq!(ctx.expr_value(&unregistered), None);
        assert!(color_value(&ctx, &unregistered).is_none());
    }
}

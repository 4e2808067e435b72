use dv_color::{ColorAllocator, ColorAllocatorCache};
use dv_columnar::Column;
use dv_expr::SemanticExpr;
use dv_frame::{CategoricalData, ColumnMetadata, SelectTransform, select_index_for_expr};
use dv_types::Scalar;

use crate::{EvalContext, RowEvalContext, RowScope, evaluate};

/// Cursor over the categories of a categorical result; row `i` is the
/// `i`-th category.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalEvalContext<'a> {
    data: &'a CategoricalData,
    selects: &'a [Option<SelectTransform>],
    cache: &'a ColorAllocatorCache,
    current_row: Option<usize>,
}

impl<'a> CategoricalEvalContext<'a> {
    #[must_use]
    pub fn new(
        data: &'a CategoricalData,
        selects: &'a [Option<SelectTransform>],
        cache: &'a ColorAllocatorCache,
    ) -> Self {
        Self {
            data,
            selects,
            cache,
            current_row: None,
        }
    }

    /// Category columns first, then value columns.
    fn columns(&self) -> impl Iterator<Item = (&'a ColumnMetadata, &'a Column)> {
        let categories = self
            .data
            .categories
            .iter()
            .map(|category| (&category.source, &category.values));
        let values = self
            .data
            .values
            .columns()
            .iter()
            .map(|value| (&value.source, &value.values));
        categories.chain(values)
    }
}

struct CategoryRow<'c, 'a> {
    ctx: &'c CategoricalEvalContext<'a>,
    row: usize,
}

impl RowScope for CategoryRow<'_, '_> {
    fn bound_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let by_select = select_index_for_expr(self.ctx.selects, expr).and_then(|select| {
            self.ctx
                .columns()
                .find(|(source, _)| source.index == Some(select))
        });
        let (_, column) = by_select.or_else(|| {
            self.ctx
                .columns()
                .find(|(source, _)| source.expr.as_ref() == Some(expr))
        })?;
        column.value(self.row).cloned()
    }

    fn allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.ctx.cache.get(fill_rule)
    }
}

impl EvalContext for CategoricalEvalContext<'_> {
    fn expr_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let row = self.current_row?;
        evaluate(&CategoryRow { ctx: self, row }, expr)
    }

    fn color_allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.cache.get(fill_rule)
    }

    /// Current-row value of the first column bound to `role`.
    fn role_value(&self, role: &str) -> Option<Scalar> {
        let row = self.current_row?;
        let (_, column) = self.columns().find(|(source, _)| source.has_role(role))?;
        column.value(row).cloned()
    }
}

impl RowEvalContext for CategoricalEvalContext<'_> {
    fn set_current_row_index(&mut self, index: usize) {
        self.current_row = Some(index);
    }

    fn current_row_index(&self) -> Option<usize> {
        self.current_row
    }
}

#[cfg(test)]
mod tests {
    use dv_color::ColorAllocatorCache;
    use dv_columnar::Column;
    use dv_expr::SemanticExpr;
    use dv_frame::{CategoricalData, CategoryColumn, ColumnMetadata, ValueColumn, ValueColumns};
    use dv_runtime::RuntimePolicy;
    use dv_types::Scalar;

    use super::CategoricalEvalContext;
    use crate::{EvalContext, RowEvalContext};

    fn data() -> CategoricalData {
        CategoricalData::new(
            vec![CategoryColumn {
                source: ColumnMetadata::new("Month")
                    .with_index(0)
                    .with_role("Category")
                    .with_expr(SemanticExpr::column("Calendar", "Month")),
                values: Column::from_values(vec![Scalar::from("Jan"), Scalar::from("Feb")])
                    .expect("column"),
                identity_fields: Vec::new(),
            }],
            ValueColumns::new(
                vec![
                    ValueColumn {
                        source: ColumnMetadata::new("Sales")
                            .with_index(1)
                            .with_role("Y")
                            .with_expr(SemanticExpr::measure("Sales", "Total")),
                        values: Column::from_values(vec![Scalar::Int64(100), Scalar::Int64(140)])
                            .expect("column"),
                        identity: None,
                    },
                    ValueColumn {
                        source: ColumnMetadata::new("Target").with_index(2).with_role("Y"),
                        values: Column::from_values(vec![Scalar::Int64(90), Scalar::Int64(150)])
                            .expect("column"),
                        identity: None,
                    },
                ],
                None,
                Vec::new(),
            ),
        )
        .expect("categorical")
    }

    #[test]
    fn role_value_follows_current_category() {
        let data = data();
        let cache = ColorAllocatorCache::with_policy(RuntimePolicy::strict());
        let mut ctx = CategoricalEvalContext::new(&data, &[], &cache);

        assert_eq!(ctx.role_value("Category"), None);
        ctx.set_current_row_index(1);
        assert_eq!(ctx.role_value("Category"), Some(Scalar::from("Feb")));
        assert_eq!(ctx.role_value("Y"), Some(Scalar::Int64(140)));
        assert_eq!(ctx.role_value("Size"), None);
    }

    #[test]
    fn expressions_resolve_by_column_metadata() {
        let data = data();
        let cache = ColorAllocatorCache::with_policy(RuntimePolicy::strict());
        let mut ctx = CategoricalEvalContext::new(&data, &[], &cache);
        ctx.set_current_row_index(0);

        assert_eq!(
            ctx.expr_value(&SemanticExpr::measure("Sales", "Total")),
            Some(Scalar::Int64(100))
        );
        assert_eq!(
            ctx.expr_value(&SemanticExpr::column("Calendar", "Month")),
            Some(Scalar::from("Jan"))
        );
        assert_eq!(ctx.expr_value(&SemanticExpr::measure("Sales", "Cost")), None);
    }
}

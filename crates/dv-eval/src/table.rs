use dv_color::{ColorAllocator, ColorAllocatorCache};
use dv_expr::SemanticExpr;
use dv_frame::{SelectTransform, TableData, select_index_for_expr};
use dv_types::Scalar;

use crate::{EvalContext, RowEvalContext, RowScope, evaluate};

/// Row cursor over a table-shaped result.
///
/// Borrows the table, the select transforms and the pass's allocator cache;
/// owns only the current row index.
#[derive(Debug, Clone, Copy)]
pub struct TableEvalContext<'a> {
    table: &'a TableData,
    selects: &'a [Option<SelectTransform>],
    cache: &'a ColorAllocatorCache,
    current_row: Option<usize>,
}

impl<'a> TableEvalContext<'a> {
    #[must_use]
    pub fn new(
        table: &'a TableData,
        selects: &'a [Option<SelectTransform>],
        cache: &'a ColorAllocatorCache,
    ) -> Self {
        Self {
            table,
            selects,
            cache,
            current_row: None,
        }
    }

    #[must_use]
    pub fn table(&self) -> &'a TableData {
        self.table
    }
}

struct TableRow<'c, 'a> {
    ctx: &'c TableEvalContext<'a>,
    row: usize,
}

impl RowScope for TableRow<'_, '_> {
    fn bound_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let table = self.ctx.table;
        let position = select_index_for_expr(self.ctx.selects, expr)
            .and_then(|select| table.column_position_for_select(select))
            .or_else(|| table.column_position_for_expr(expr))?;
        table.value(self.row, position).cloned()
    }

    fn allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.ctx.cache.get(fill_rule)
    }
}

impl EvalContext for TableEvalContext<'_> {
    fn expr_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let row = self.current_row?;
        evaluate(&TableRow { ctx: self, row }, expr)
    }

    fn color_allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.cache.get(fill_rule)
    }

    /// Table rows are not addressable by role.
    fn role_value(&self, _role: &str) -> Option<Scalar> {
        None
    }
}

impl RowEvalContext for TableEvalContext<'_> {
    fn set_current_row_index(&mut self, index: usize) {
        self.current_row = Some(index);
    }

    fn current_row_index(&self) -> Option<usize> {
        self.current_row
    }
}

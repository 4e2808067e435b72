use dv_color::{ColorAllocator, ColorAllocatorCache};
use dv_expr::SemanticExpr;
use dv_frame::{MatrixData, MatrixNode, SelectTransform, select_index_for_expr};
use dv_types::Scalar;

use crate::{EvalContext, RowEvalContext, RowScope, evaluate};

/// Cursor over the leaf rows of a matrix, in depth-first order.
#[derive(Debug, Clone)]
pub struct MatrixEvalContext<'a> {
    matrix: &'a MatrixData,
    leaves: Vec<&'a MatrixNode>,
    selects: &'a [Option<SelectTransform>],
    cache: &'a ColorAllocatorCache,
    current_row: Option<usize>,
}

impl<'a> MatrixEvalContext<'a> {
    #[must_use]
    pub fn new(
        matrix: &'a MatrixData,
        selects: &'a [Option<SelectTransform>],
        cache: &'a ColorAllocatorCache,
    ) -> Self {
        Self {
            matrix,
            leaves: matrix.leaves(),
            selects,
            cache,
            current_row: None,
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

struct MatrixRow<'c, 'a> {
    ctx: &'c MatrixEvalContext<'a>,
    leaf: &'a MatrixNode,
}

impl RowScope for MatrixRow<'_, '_> {
    fn bound_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let sources = &self.ctx.matrix.value_sources;
        let position = select_index_for_expr(self.ctx.selects, expr)
            .and_then(|select| {
                sources
                    .iter()
                    .position(|source| source.index == Some(select))
            })
            .or_else(|| {
                sources
                    .iter()
                    .position(|source| source.expr.as_ref() == Some(expr))
            })?;
        self.leaf.values.get(&position).cloned()
    }

    fn allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.ctx.cache.get(fill_rule)
    }
}

impl EvalContext for MatrixEvalContext<'_> {
    fn expr_value(&self, expr: &SemanticExpr) -> Option<Scalar> {
        let leaf = *self.leaves.get(self.current_row?)?;
        evaluate(&MatrixRow { ctx: self, leaf }, expr)
    }

    fn color_allocator(&self, fill_rule: &SemanticExpr) -> Option<&dyn ColorAllocator> {
        self.cache.get(fill_rule)
    }

    fn role_value(&self, _role: &str) -> Option<Scalar> {
        None
    }
}

impl RowEvalContext for MatrixEvalContext<'_> {
    fn set_current_row_index(&mut self, index: usize) {
        self.current_row = Some(index);
    }

    fn current_row_index(&self) -> Option<usize> {
        self.current_row
    }
}

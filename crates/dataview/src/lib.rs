#![forbid(unsafe_code)]

//! Expression and formatting evaluation for data views.
//!
//! A visual binds semantic expressions to roles, asks for a reduced result
//! from the query service, prunes the columns it did not select and then
//! evaluates formatting expressions row by row against the shape it got
//! back. Each step lives in its own crate; this one re-exports them.

pub use dv_color::{
    ColorAllocator, ColorAllocatorCache, ColorAllocatorFactory, ColorError,
    DefaultColorAllocatorFactory, GradientStop, LinearGradient2Allocator,
    LinearGradient3Allocator, SolidAllocator, format_hex_color, parse_hex_color,
};
pub use dv_columnar::{Column, ColumnError};
pub use dv_eval::{
    CategoricalEvalContext, EvalContext, MatrixEvalContext, RowEvalContext, ShapeEvalContext,
    TableEvalContext, color_value, create_eval_context,
};
pub use dv_expr::{
    AggregateFunction, ArithmeticOp, ComparisonOp, ExprError, FillRule, RoleWildcard,
    RuleColorStop, SemanticExpr, SemanticFilter, expr_equals, filter_equals, filters_contain,
    role_wildcard_equals, targets_equal,
};
pub use dv_frame::{
    CategoricalData, CategoryColumn, ColumnMetadata, DataShape, DataShapeKind, DataShapeKinds,
    DataShapeMetadata, FrameError, MatrixData, MatrixNode, SelectTransform, TableData,
    ValueColumn, ValueColumnGroup, ValueColumns, select_index_for_expr,
};
pub use dv_groupby::{group_by_series, refresh_grouped};
pub use dv_reduction::{
    DataReduction, DataShapeReduction, ReductionAlgorithm, ReductionCount, ReductionError,
    ReductionIntent, WireCount, create_from, create_shape_reduction, to_wire_json,
};
pub use dv_runtime::{
    ConfigError, DecisionAction, EvidenceLedger, PreconditionViolation, RuntimeConfig,
    RuntimeError, RuntimeMode, RuntimePolicy, ViolationRecord, global_policy,
    install_global_policy,
};
pub use dv_select::{PruneReport, SelectInclusionSet, apply as prune_unselected};
pub use dv_types::{DType, NullKind, Scalar, TypeError};

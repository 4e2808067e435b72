#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use dv_columnar::{Column, ColumnError};
use dv_expr::SemanticExpr;
use dv_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column {column:?} has {actual} rows but the shape has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("{metadata} metadata columns but {storage} storage columns")]
    ColumnCountMismatch { metadata: usize, storage: usize },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Describes one column of a data shape and the query select it came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    /// Index of the originating select.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<SemanticExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Series value this column belongs to, for grouped value columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<Scalar>,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into(), true);
        self
    }

    #[must_use]
    pub fn with_expr(mut self, expr: SemanticExpr) -> Self {
        self.expr = Some(expr);
        self
    }

    #[must_use]
    pub fn with_group_name(mut self, group_name: impl Into<Scalar>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.get(role).copied().unwrap_or(false)
    }
}

/// Per-select information the binding layer hands to the render layer.
/// A select-transform list is indexed by select index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectTransform {
    pub query_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<SemanticExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SelectTransform {
    #[must_use]
    pub fn new(query_name: impl Into<String>, expr: SemanticExpr) -> Self {
        Self {
            query_name: query_name.into(),
            expr: Some(expr),
            ..Self::default()
        }
    }
}

/// Select index whose transform carries an expression structurally equal to
/// `expr`.
#[must_use]
pub fn select_index_for_expr(
    selects: &[Option<SelectTransform>],
    expr: &SemanticExpr,
) -> Option<usize> {
    selects.iter().position(|select| {
        select
            .as_ref()
            .and_then(|select| select.expr.as_ref())
            .is_some_and(|select_expr| select_expr == expr)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    columns: Vec<ColumnMetadata>,
    data: Vec<Column>,
}

impl TableData {
    pub fn new(columns: Vec<ColumnMetadata>, data: Vec<Column>) -> Result<Self, FrameError> {
        if columns.len() != data.len() {
            return Err(FrameError::ColumnCountMismatch {
                metadata: columns.len(),
                storage: data.len(),
            });
        }
        let expected = data.first().map_or(0, Column::len);
        for (meta, column) in columns.iter().zip(&data) {
            if column.len() != expected {
                return Err(FrameError::LengthMismatch {
                    column: meta.display_name.clone(),
                    expected,
                    actual: column.len(),
                });
            }
        }

        Ok(Self { columns, data })
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    #[must_use]
    pub fn data(&self) -> &[Column] {
        &self.data
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.data.first().map_or(0, Column::len)
    }

    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> Option<&Scalar> {
        self.data.get(column).and_then(|column| column.value(row))
    }

    #[must_use]
    pub fn column_position_for_select(&self, select_index: usize) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.index == Some(select_index))
    }

    #[must_use]
    pub fn column_position_for_expr(&self, expr: &SemanticExpr) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.expr.as_ref() == Some(expr))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryColumn {
    pub source: ColumnMetadata,
    pub values: Column,
    #[serde(default)]
    pub identity_fields: Vec<SemanticExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueColumn {
    pub source: ColumnMetadata,
    pub values: Column,
    /// Series value identifying this column within its group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Scalar>,
}

/// One entry of the grouped-by-series view: the value columns that share a
/// series value, referenced by position in [`ValueColumns::columns`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueColumnGroup {
    pub name: Option<Scalar>,
    pub identity: Option<Scalar>,
    pub column_indices: Vec<usize>,
}

/// Measure columns of a categorical shape plus the derived grouped view.
///
/// The grouped view is computed outside this type; whoever mutates
/// `columns_mut` or `source_mut` must store a fresh view with
/// [`ValueColumns::set_grouped`] before handing the shape on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueColumns {
    columns: Vec<ValueColumn>,
    /// Series source column, when the measures are split by series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<ColumnMetadata>,
    #[serde(default)]
    identity_fields: Vec<SemanticExpr>,
    #[serde(default)]
    grouped: Vec<ValueColumnGroup>,
}

impl ValueColumns {
    #[must_use]
    pub fn new(
        columns: Vec<ValueColumn>,
        source: Option<ColumnMetadata>,
        identity_fields: Vec<SemanticExpr>,
    ) -> Self {
        Self {
            columns,
            source,
            identity_fields,
            grouped: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[ValueColumn] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut Vec<ValueColumn> {
        &mut self.columns
    }

    #[must_use]
    pub fn source(&self) -> Option<&ColumnMetadata> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut Option<ColumnMetadata> {
        &mut self.source
    }

    #[must_use]
    pub fn identity_fields(&self) -> &[SemanticExpr] {
        &self.identity_fields
    }

    #[must_use]
    pub fn grouped(&self) -> &[ValueColumnGroup] {
        &self.grouped
    }

    pub fn set_grouped(&mut self, grouped: Vec<ValueColumnGroup>) {
        self.grouped = grouped;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalData {
    #[serde(default)]
    pub categories: Vec<CategoryColumn>,
    #[serde(default)]
    pub values: ValueColumns,
}

impl CategoricalData {
    pub fn new(categories: Vec<CategoryColumn>, values: ValueColumns) -> Result<Self, FrameError> {
        let expected = categories
            .first()
            .map(|category| category.values.len())
            .or_else(|| values.columns().first().map(|value| value.values.len()));

        if let Some(expected) = expected {
            let category_lengths = categories
                .iter()
                .map(|category| (&category.source, category.values.len()));
            let value_lengths = values
                .columns()
                .iter()
                .map(|value| (&value.source, value.values.len()));
            for (source, actual) in category_lengths.chain(value_lengths) {
                if actual != expected {
                    return Err(FrameError::LengthMismatch {
                        column: source.display_name.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }

        Ok(Self { categories, values })
    }

    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories
            .first()
            .map(|category| category.values.len())
            .or_else(|| self.values.columns().first().map(|value| value.values.len()))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatrixNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<usize>,
    /// Cell values keyed by position in [`MatrixData::value_sources`].
    #[serde(default)]
    pub values: BTreeMap<usize, Scalar>,
    #[serde(default)]
    pub children: Vec<MatrixNode>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatrixData {
    pub rows: MatrixNode,
    #[serde(default)]
    pub value_sources: Vec<ColumnMetadata>,
}

impl MatrixData {
    /// Leaf row nodes in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&MatrixNode> {
        let mut out = Vec::new();
        let mut stack = vec![&self.rows];
        while let Some(node) = stack.pop() {
            if node.children.is_empty() {
                out.push(node);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataShapeMetadata {
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
}

/// A query result in every representation the host produced for it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataShape {
    #[serde(default)]
    pub metadata: DataShapeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical: Option<CategoricalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataShapeKind {
    Categorical,
    Table,
    Matrix,
}

/// Set of representations a consumer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataShapeKinds {
    #[serde(default)]
    pub categorical: bool,
    #[serde(default)]
    pub table: bool,
    #[serde(default)]
    pub matrix: bool,
}

impl DataShapeKinds {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            categorical: false,
            table: false,
            matrix: false,
        }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self {
            categorical: true,
            table: true,
            matrix: true,
        }
    }

    #[must_use]
    pub const fn only(kind: DataShapeKind) -> Self {
        match kind {
            DataShapeKind::Categorical => Self {
                categorical: true,
                ..Self::none()
            },
            DataShapeKind::Table => Self {
                table: true,
                ..Self::none()
            },
            DataShapeKind::Matrix => Self {
                matrix: true,
                ..Self::none()
            },
        }
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            categorical: self.categorical || other.categorical,
            table: self.table || other.table,
            matrix: self.matrix || other.matrix,
        }
    }

    #[must_use]
    pub const fn contains(self, kind: DataShapeKind) -> bool {
        match kind {
            DataShapeKind::Categorical => self.categorical,
            DataShapeKind::Table => self.table,
            DataShapeKind::Matrix => self.matrix,
        }
    }
}

impl Default for DataShapeKinds {
    fn default() -> Self {
        Self::none()
    }
}

#![forbid(unsafe_code)]

use std::cmp::Ordering;

use dv_types::{DType, NullKind, Scalar, TypeError, cast_scalar_owned, common_dtype, infer_dtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl ComparisonOp {
    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("cannot order {left:?} against {right:?}")]
    Incomparable { left: DType, right: DType },
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    /// Takes ownership of the values vec so values that already have the
    /// correct dtype are moved rather than cloned.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let needs_coercion = values.iter().any(|v| {
            let d = v.dtype();
            d != dtype && d != DType::Null
        });

        let coerced = if needs_coercion {
            values
                .into_iter()
                .map(|value| cast_scalar_owned(value, dtype))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            // Only remap Null variants to the dtype-specific missing marker.
            values
                .into_iter()
                .map(|value| match value {
                    Scalar::Null(_) => Scalar::missing_for_dtype(dtype),
                    other => other,
                })
                .collect()
        };

        Ok(Self {
            dtype,
            values: coerced,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values)?;
        Self::new(dtype, values)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Scalar> {
        self.values.get(idx)
    }
}

/// Compare two row values.
///
/// A missing operand yields a missing result. Values of unrelated dtypes are
/// never equal; ordering them is an error.
pub fn compare_scalars(
    left: &Scalar,
    right: &Scalar,
    op: ComparisonOp,
) -> Result<Scalar, ColumnError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Scalar::Null(NullKind::Null));
    }

    let ordering = match (left, right) {
        (Scalar::Int64(a), Scalar::Int64(b)) => Some(a.cmp(b)),
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (Scalar::DateTime(a), Scalar::DateTime(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (
            Scalar::Bool(_) | Scalar::Int64(_) | Scalar::Float64(_),
            Scalar::Bool(_) | Scalar::Int64(_) | Scalar::Float64(_),
        ) => left.to_f64()?.partial_cmp(&right.to_f64()?),
        _ => None,
    };

    match ordering {
        Some(ordering) => Ok(Scalar::Bool(op.holds(ordering))),
        None => match op {
            ComparisonOp::Eq => Ok(Scalar::Bool(false)),
            ComparisonOp::Ne => Ok(Scalar::Bool(true)),
            _ => Err(ColumnError::Incomparable {
                left: left.dtype(),
                right: right.dtype(),
            }),
        },
    }
}

/// Apply a numeric operator to two row values with the same missing-value
/// propagation the column kernels use: NaN wins over plain nulls.
pub fn arithmetic_scalars(
    left: &Scalar,
    right: &Scalar,
    op: ArithmeticOp,
) -> Result<Scalar, ColumnError> {
    let mut out_dtype = common_dtype(left.dtype(), right.dtype())?;
    if matches!(out_dtype, DType::Bool) {
        out_dtype = DType::Int64;
    }
    if matches!(op, ArithmeticOp::Div) {
        out_dtype = DType::Float64;
    }

    if left.is_missing() || right.is_missing() {
        return Ok(if left.is_nan() || right.is_nan() {
            Scalar::Null(NullKind::NaN)
        } else {
            Scalar::missing_for_dtype(out_dtype)
        });
    }

    let lhs = left.to_f64()?;
    let rhs = right.to_f64()?;
    let result = match op {
        ArithmeticOp::Add => lhs + rhs,
        ArithmeticOp::Sub => lhs - rhs,
        ArithmeticOp::Mul => lhs * rhs,
        ArithmeticOp::Div => lhs / rhs,
    };

    if matches!(out_dtype, DType::Int64)
        && result.is_finite()
        && result == result.trunc()
        && result >= i64::MIN as f64
        && result <= i64::MAX as f64
    {
        Ok(Scalar::Int64(result as i64))
    } else {
        Ok(Scalar::Float64(result))
    }
}

#![forbid(unsafe_code)]

use dv_frame::{ValueColumn, ValueColumnGroup, ValueColumns};
use dv_types::{NullKind, Scalar};

/// Group value columns into runs that share a series identity.
///
/// Value columns are laid out series-major, so a new group starts whenever
/// the identity changes from one column to the next. Columns without an
/// identity form unnamed groups.
#[must_use]
pub fn group_by_series(values: &ValueColumns) -> Vec<ValueColumnGroup> {
    let mut groups: Vec<ValueColumnGroup> = Vec::new();
    let mut current: Option<Option<GroupKeyRef<'_>>> = None;

    for (position, column) in values.columns().iter().enumerate() {
        let key = column.identity.as_ref().map(GroupKeyRef::from_scalar);
        match (&current, groups.last_mut()) {
            (Some(current_key), Some(group)) if *current_key == key => {
                group.column_indices.push(position);
            }
            _ => {
                groups.push(new_group(column, position));
                current = Some(key);
            }
        }
    }

    groups
}

/// Recompute and store the grouped view of `values`.
pub fn refresh_grouped(values: &mut ValueColumns) {
    let grouped = group_by_series(values);
    values.set_grouped(grouped);
}

fn new_group(column: &ValueColumn, position: usize) -> ValueColumnGroup {
    let name = column.identity.as_ref().map(|_| {
        column
            .source
            .group_name
            .clone()
            .unwrap_or_else(|| Scalar::Utf8(column.source.display_name.clone()))
    });
    ValueColumnGroup {
        name,
        identity: column.identity.clone(),
        column_indices: vec![position],
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum GroupKeyRef<'a> {
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(&'a str),
    DateTime(i64),
    Null(NullKind),
}

impl<'a> GroupKeyRef<'a> {
    fn from_scalar(key: &'a Scalar) -> Self {
        match key {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) => Self::FloatBits(Scalar::canonical_float_bits(*v)),
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::DateTime(v) => Self::DateTime(v.and_utc().timestamp_micros()),
            Scalar::Null(kind) => Self::Null(*kind),
        }
    }
}

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use dv_frame::{DataShape, DataShapeKind, DataShapeKinds, ValueColumns};
use dv_groupby::refresh_grouped;
use serde::{Deserialize, Serialize};

/// Which selects survive a prune, by select index. A select that is absent
/// or marked `false` is excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectInclusionSet {
    selects: BTreeMap<usize, bool>,
}

impl SelectInclusionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(&mut self, select: usize) -> &mut Self {
        self.selects.insert(select, true);
        self
    }

    pub fn exclude(&mut self, select: usize) -> &mut Self {
        self.selects.insert(select, false);
        self
    }

    #[must_use]
    pub fn retains(&self, select: usize) -> bool {
        self.selects.get(&select).copied().unwrap_or(false)
    }
}

impl FromIterator<(usize, bool)> for SelectInclusionSet {
    fn from_iter<I: IntoIterator<Item = (usize, bool)>>(iter: I) -> Self {
        Self {
            selects: iter.into_iter().collect(),
        }
    }
}

/// What a prune changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Positions, before pruning, of the value columns removed; ascending.
    pub removed_columns: Vec<usize>,
    pub source_cleared: bool,
    pub regrouped: bool,
}

impl PruneReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.source_cleared || !self.removed_columns.is_empty()
    }
}

/// Drop value columns whose select is not retained from the categorical
/// representation of `shape`.
///
/// Nothing happens without an inclusion set, without a categorical
/// representation, or when `kinds` does not target it. Columns that carry no
/// select index are kept. Whenever the columns or the series source change,
/// the grouped-by-series view is recomputed before returning.
pub fn apply(
    shape: &mut DataShape,
    kinds: DataShapeKinds,
    selects_to_include: Option<&SelectInclusionSet>,
) -> PruneReport {
    let Some(selects) = selects_to_include else {
        return PruneReport::default();
    };
    if !kinds.contains(DataShapeKind::Categorical) {
        return PruneReport::default();
    }
    let Some(categorical) = shape.categorical.as_mut() else {
        return PruneReport::default();
    };
    prune_value_columns(&mut categorical.values, selects)
}

fn prune_value_columns(values: &mut ValueColumns, selects: &SelectInclusionSet) -> PruneReport {
    let mut report = PruneReport::default();

    let source = values.source_mut();
    if source
        .as_ref()
        .and_then(|source| source.index)
        .is_some_and(|select| !selects.retains(select))
    {
        *source = None;
        report.source_cleared = true;
    }

    // Back to front so removal does not shift positions still to visit.
    let columns = values.columns_mut();
    for position in (0..columns.len()).rev() {
        let excluded = columns[position]
            .source
            .index
            .is_some_and(|select| !selects.retains(select));
        if excluded {
            columns.remove(position);
            report.removed_columns.push(position);
        }
    }
    report.removed_columns.reverse();

    if report.changed() {
        refresh_grouped(values);
        report.regrouped = true;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            removed = report.removed_columns.len(),
            remaining = values.len(),
            source_cleared = report.source_cleared,
            "pruned unselected value columns"
        );
    }
    report
}

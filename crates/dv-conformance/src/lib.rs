#![forbid(unsafe_code)]

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use dv_color::ColorAllocatorCache;
use dv_columnar::Column;
use dv_eval::{EvalContext, RowEvalContext, TableEvalContext};
use dv_expr::{
    RoleWildcard, SemanticExpr, SemanticFilter, expr_equals, filter_equals, role_wildcard_equals,
};
use dv_frame::{
    CategoricalData, ColumnMetadata, DataShape, DataShapeKinds, FrameError, SelectTransform,
    TableData, ValueColumn, ValueColumns,
};
use dv_groupby::refresh_grouped;
use dv_reduction::{DataReduction, ReductionAlgorithm, create_from, to_wire_json};
use dv_runtime::{EvidenceLedger, RuntimeMode, RuntimePolicy};
use dv_select::{SelectInclusionSet, apply};
use dv_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    /// Run strict-mode fixtures under a strict policy. When off, every
    /// fixture runs hardened so a violated precondition is recorded instead
    /// of aborting the suite.
    pub strict_mode: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            strict_mode: true,
        }
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }

    #[must_use]
    pub fn policy_for(&self, mode: RuntimeMode) -> RuntimePolicy {
        match mode {
            RuntimeMode::Strict if self.strict_mode => RuntimePolicy::strict(),
            RuntimeMode::Strict | RuntimeMode::Hardened => RuntimePolicy::hardened(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_count: usize,
    pub strict_mode: bool,
}

#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    let fixture_count = list_fixture_files(&config.case_fixture_root()).map_or(0, |files| files.len());

    HarnessReport {
        suite: "smoke",
        fixture_count,
        strict_mode: config.strict_mode,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteOptions {
    /// Only run cases whose id starts with this prefix.
    pub case_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    ReductionSerialize,
    SelectPrune,
    FilterEquals,
    RoleWildcardEquals,
    ExprEquals,
    TableExprValue,
}

/// One table column: metadata plus its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    #[serde(default)]
    pub select: Option<usize>,
    #[serde(default)]
    pub expr: Option<SemanticExpr>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub values: Vec<Scalar>,
}

/// One categorical value column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureValueColumn {
    pub name: String,
    #[serde(default)]
    pub select: Option<usize>,
    #[serde(default)]
    pub series: Option<Scalar>,
    #[serde(default)]
    pub values: Vec<Scalar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceFixture {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: FixtureOperation,
    #[serde(default)]
    pub reduction: Option<ReductionAlgorithm>,
    #[serde(default)]
    pub value_columns: Vec<FixtureValueColumn>,
    #[serde(default)]
    pub series_source_select: Option<usize>,
    #[serde(default)]
    pub kinds: Option<DataShapeKinds>,
    #[serde(default)]
    pub selects_to_include: Option<SelectInclusionSet>,
    #[serde(default)]
    pub left_filter: Option<SemanticFilter>,
    #[serde(default)]
    pub right_filter: Option<SemanticFilter>,
    #[serde(default)]
    pub left_roles: Option<Vec<String>>,
    #[serde(default)]
    pub right_roles: Option<Vec<String>>,
    #[serde(default)]
    pub left_expr: Option<SemanticExpr>,
    #[serde(default)]
    pub right_expr: Option<SemanticExpr>,
    #[serde(default)]
    pub table: Vec<FixtureColumn>,
    /// Select transforms by select index; `null` marks an unused index.
    #[serde(default)]
    pub selects: Vec<Option<SemanticExpr>>,
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default)]
    pub expr: Option<SemanticExpr>,
    /// Absent means the reduction must produce nothing.
    #[serde(default)]
    pub expected_wire: Option<serde_json::Value>,
    #[serde(default)]
    pub expected_bool: Option<bool>,
    /// Absent means the expression must resolve to nothing.
    #[serde(default)]
    pub expected_value: Option<Scalar>,
    #[serde(default)]
    pub expected_columns: Option<Vec<String>>,
    #[serde(default)]
    pub expected_groups: Option<Vec<Vec<usize>>>,
    #[serde(default)]
    pub expected_source_cleared: Option<bool>,
    #[serde(default)]
    pub expected_evidence_records: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    pub evidence_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl ConformanceReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|result| matches!(result.status, CaseStatus::Fail))
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fixture {path}: {source}")]
    Fixture {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("suite {suite} is not green: {failed} of {fixture_count} cases failed")]
    NotGreen {
        suite: String,
        failed: usize,
        fixture_count: usize,
    },
}

pub fn run_fixture_suite(config: &HarnessConfig) -> Result<ConformanceReport, HarnessError> {
    run_fixture_suite_with_options(config, &SuiteOptions::default())
}

pub fn run_fixture_suite_with_options(
    config: &HarnessConfig,
    options: &SuiteOptions,
) -> Result<ConformanceReport, HarnessError> {
    let fixtures = load_fixtures(config, options.case_filter.as_deref())?;
    let suite = match &options.case_filter {
        Some(filter) => format!("cases:{filter}"),
        None => "cases".to_owned(),
    };
    Ok(build_report(config, suite, &fixtures))
}

/// Error unless every case passed and at least one ran.
pub fn enforce_green(report: &ConformanceReport) -> Result<(), HarnessError> {
    if report.is_green() {
        return Ok(());
    }
    Err(HarnessError::NotGreen {
        suite: report.suite.clone(),
        failed: report.failed,
        fixture_count: report.fixture_count,
    })
}

#[must_use]
pub fn run_fixture(config: &HarnessConfig, fixture: &ConformanceFixture) -> CaseResult {
    let policy = config.policy_for(fixture.mode);
    let mut ledger = EvidenceLedger::new();
    let mut mismatch = run_fixture_operation(fixture, &policy, &mut ledger).err();

    if mismatch.is_none()
        && let Some(expected) = fixture.expected_evidence_records
        && expected != ledger.records().len()
    {
        mismatch = Some(format!(
            "evidence mismatch: actual={}, expected={expected}",
            ledger.records().len()
        ));
    }

    CaseResult {
        case_id: fixture.case_id.clone(),
        mode: fixture.mode,
        operation: fixture.operation,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        evidence_records: ledger.records().len(),
    }
}

fn build_report(
    config: &HarnessConfig,
    suite: String,
    fixtures: &[ConformanceFixture],
) -> ConformanceReport {
    let results: Vec<CaseResult> = fixtures
        .iter()
        .map(|fixture| run_fixture(config, fixture))
        .collect();
    let failed = results
        .iter()
        .filter(|result| matches!(result.status, CaseStatus::Fail))
        .count();
    let passed = results.len().saturating_sub(failed);

    ConformanceReport {
        suite,
        fixture_count: results.len(),
        passed,
        failed,
        results,
    }
}

fn load_fixtures(
    config: &HarnessConfig,
    case_filter: Option<&str>,
) -> Result<Vec<ConformanceFixture>, HarnessError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());

    for fixture_path in fixture_files {
        let fixture = load_fixture(&fixture_path)?;
        if case_filter.is_none_or(|prefix| fixture.case_id.starts_with(prefix)) {
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

pub fn load_fixture(path: &Path) -> Result<ConformanceFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    serde_json::from_str(&body).map_err(|source| HarnessError::Fixture {
        path: path.display().to_string(),
        source,
    })
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn run_fixture_operation(
    fixture: &ConformanceFixture,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<(), String> {
    match fixture.operation {
        FixtureOperation::ReductionSerialize => {
            let actual = create_from(fixture.reduction.as_ref())
                .map(serde_json::to_value)
                .transpose()
                .map_err(|err| err.to_string())?;
            if actual != fixture.expected_wire {
                return Err(format!(
                    "wire mismatch: actual={}, expected={}",
                    render_wire(actual.as_ref()),
                    render_wire(fixture.expected_wire.as_ref())
                ));
            }
            Ok(())
        }
        FixtureOperation::SelectPrune => {
            let mut shape = build_categorical_shape(
                &fixture.value_columns,
                fixture.series_source_select,
            )
            .map_err(|err| format!("shape build failed: {err}"))?;
            let kinds = fixture.kinds.unwrap_or(DataShapeKinds::all());
            let report = apply(&mut shape, kinds, fixture.selects_to_include.as_ref());

            let values = shape
                .categorical
                .as_ref()
                .map(|categorical| &categorical.values)
                .ok_or("categorical representation disappeared")?;
            if let Some(expected) = &fixture.expected_columns {
                let actual: Vec<&str> = values
                    .columns()
                    .iter()
                    .map(|column| column.source.display_name.as_str())
                    .collect();
                if actual != *expected {
                    return Err(format!(
                        "column mismatch: actual={actual:?}, expected={expected:?}"
                    ));
                }
            }
            if let Some(expected) = &fixture.expected_groups {
                let actual: Vec<Vec<usize>> = values
                    .grouped()
                    .iter()
                    .map(|group| group.column_indices.clone())
                    .collect();
                if actual != *expected {
                    return Err(format!(
                        "grouping mismatch: actual={actual:?}, expected={expected:?}"
                    ));
                }
            }
            if let Some(expected) = fixture.expected_source_cleared
                && expected != report.source_cleared
            {
                return Err(format!(
                    "source_cleared mismatch: actual={}, expected={expected}",
                    report.source_cleared
                ));
            }
            Ok(())
        }
        FixtureOperation::FilterEquals => {
            let actual = filter_equals(fixture.left_filter.as_ref(), fixture.right_filter.as_ref());
            compare_bool("filter_equals", actual, fixture.expected_bool)
        }
        FixtureOperation::RoleWildcardEquals => {
            let left = fixture
                .left_roles
                .clone()
                .ok_or("left_roles is required for role_wildcard_equals")?;
            let right = fixture
                .right_roles
                .clone()
                .ok_or("right_roles is required for role_wildcard_equals")?;
            let left = RoleWildcard::from_roles_with_policy(left, policy, ledger);
            let right = RoleWildcard::from_roles_with_policy(right, policy, ledger);
            let actual = role_wildcard_equals(&left, &right);
            compare_bool("role_wildcard_equals", actual, fixture.expected_bool)
        }
        FixtureOperation::ExprEquals => {
            let left = fixture.left_expr.as_ref();
            let right = fixture.right_expr.as_ref();
            let actual = expr_equals(left, right);
            if actual
                && let (Some(left), Some(right)) = (left, right)
                && structural_hash(left) != structural_hash(right)
            {
                return Err("equal expressions hash differently".to_owned());
            }
            compare_bool("expr_equals", actual, fixture.expected_bool)
        }
        FixtureOperation::TableExprValue => {
            let table = build_table(&fixture.table).map_err(|err| format!("table build failed: {err}"))?;
            let selects: Vec<Option<SelectTransform>> = fixture
                .selects
                .iter()
                .map(|select| {
                    select
                        .as_ref()
                        .map(|expr| SelectTransform::new(expr.to_string(), expr.clone()))
                })
                .collect();
            let expr = fixture
                .expr
                .as_ref()
                .ok_or("expr is required for table_expr_value")?;
            let cache = ColorAllocatorCache::with_policy(*policy);
            let mut ctx = TableEvalContext::new(&table, &selects, &cache);
            if let Some(row) = fixture.row {
                ctx.set_current_row_index(row);
            }

            if ctx.role_value("Category").is_some() {
                return Err("table context answered a role lookup".to_owned());
            }
            let actual = ctx.expr_value(expr);
            let matches = match (&actual, &fixture.expected_value) {
                (None, None) => true,
                (Some(actual), Some(expected)) => actual.semantic_eq(expected),
                _ => false,
            };
            if !matches {
                return Err(format!(
                    "value mismatch: actual={actual:?}, expected={:?}",
                    fixture.expected_value
                ));
            }
            Ok(())
        }
    }
}

fn compare_bool(operation: &str, actual: bool, expected: Option<bool>) -> Result<(), String> {
    let expected = expected.ok_or_else(|| format!("expected_bool is required for {operation}"))?;
    if actual != expected {
        return Err(format!(
            "{operation} mismatch: actual={actual}, expected={expected}"
        ));
    }
    Ok(())
}

fn render_wire(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "<empty>".to_owned(), ToString::to_string)
}

fn structural_hash(expr: &SemanticExpr) -> u64 {
    let mut hasher = DefaultHasher::new();
    expr.hash(&mut hasher);
    hasher.finish()
}

fn build_column(values: &[Scalar]) -> Result<Column, FrameError> {
    Ok(Column::from_values(values.to_vec())?)
}

fn build_table(columns: &[FixtureColumn]) -> Result<TableData, FrameError> {
    let mut metadata = Vec::with_capacity(columns.len());
    let mut data = Vec::with_capacity(columns.len());
    for column in columns {
        let mut meta = ColumnMetadata::new(column.name.clone());
        meta.index = column.select;
        meta.expr = column.expr.clone();
        for role in &column.roles {
            meta = meta.with_role(role.clone());
        }
        metadata.push(meta);
        data.push(build_column(&column.values)?);
    }
    TableData::new(metadata, data)
}

/// A shape whose only representation is categorical, with its grouped view
/// already computed.
pub fn build_categorical_shape(
    columns: &[FixtureValueColumn],
    series_source_select: Option<usize>,
) -> Result<DataShape, FrameError> {
    let value_columns = columns
        .iter()
        .map(|column| {
            let mut source = ColumnMetadata::new(column.name.clone());
            source.index = column.select;
            if let Some(series) = &column.series {
                source = source.with_group_name(series.clone());
            }
            Ok(ValueColumn {
                source,
                values: build_column(&column.values)?,
                identity: column.series.clone(),
            })
        })
        .collect::<Result<Vec<_>, FrameError>>()?;
    let source = series_source_select.map(|select| ColumnMetadata::new("series").with_index(select));

    let mut values = ValueColumns::new(value_columns, source, Vec::new());
    refresh_grouped(&mut values);
    Ok(DataShape {
        categorical: Some(CategoricalData::new(Vec::new(), values)?),
        ..DataShape::default()
    })
}

/// Equality laws over a JSON-decoded expression. Undecodable input is
/// ignored.
pub fn fuzz_expr_equality_bytes(input: &[u8]) -> Result<(), String> {
    let Ok(expr) = serde_json::from_slice::<SemanticExpr>(input) else {
        return Ok(());
    };
    let rebuilt = expr.clone();
    if !expr_equals(Some(&expr), Some(&expr)) {
        return Err(format!("expression is not reflexive: {expr}"));
    }
    if expr != rebuilt || rebuilt != expr {
        return Err(format!("clone compares unequal: {expr}"));
    }
    if structural_hash(&expr) != structural_hash(&rebuilt) {
        return Err(format!("clone hashes differently: {expr}"));
    }
    if expr_equals(Some(&expr), None) {
        return Err("expression equals the empty value".to_owned());
    }
    Ok(())
}

/// A decoded intent serializes to a record with exactly one top-level kind
/// that decodes back to itself.
pub fn fuzz_reduction_bytes(input: &[u8]) -> Result<(), String> {
    let Ok(algorithm) = serde_json::from_slice::<ReductionAlgorithm>(input) else {
        return Ok(());
    };
    let Some(reduction) = create_from(Some(&algorithm)) else {
        if algorithm != ReductionAlgorithm::default() {
            return Err(format!("non-empty intent produced nothing: {algorithm:?}"));
        }
        return Ok(());
    };
    let wire = to_wire_json(&reduction).map_err(|err| err.to_string())?;
    let value: serde_json::Value = serde_json::from_str(&wire).map_err(|err| err.to_string())?;
    if value.as_object().map(serde_json::Map::len) != Some(1) {
        return Err(format!("wire record must have exactly one kind: {wire}"));
    }
    let decoded: DataReduction = serde_json::from_str(&wire).map_err(|err| err.to_string())?;
    if decoded != reduction {
        return Err(format!("wire record did not decode back: {wire}"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PruneInput {
    #[serde(default)]
    value_columns: Vec<FixtureValueColumn>,
    #[serde(default)]
    series_source_select: Option<usize>,
    #[serde(default)]
    selects_to_include: Option<SelectInclusionSet>,
}

/// After a prune every surviving column is retained or unindexed, and the
/// grouped view covers the surviving columns exactly once, in order.
pub fn fuzz_select_prune_bytes(input: &[u8]) -> Result<(), String> {
    let Ok(input) = serde_json::from_slice::<PruneInput>(input) else {
        return Ok(());
    };
    let Ok(mut shape) = build_categorical_shape(&input.value_columns, input.series_source_select)
    else {
        return Ok(());
    };
    let before = input.value_columns.len();
    let report = apply(
        &mut shape,
        DataShapeKinds::all(),
        input.selects_to_include.as_ref(),
    );
    let values = shape
        .categorical
        .as_ref()
        .map(|categorical| &categorical.values)
        .ok_or("categorical representation disappeared")?;

    if values.len() + report.removed_columns.len() != before {
        return Err("removed and surviving columns do not add up".to_owned());
    }
    match &input.selects_to_include {
        None => {
            if report.changed() {
                return Err("prune without an inclusion set changed the shape".to_owned());
            }
        }
        Some(selects) => {
            let stray = values.columns().iter().find(|column| {
                column
                    .source
                    .index
                    .is_some_and(|select| !selects.retains(select))
            });
            if let Some(stray) = stray {
                return Err(format!(
                    "excluded column survived: {}",
                    stray.source.display_name
                ));
            }
        }
    }

    let covered: Vec<usize> = values
        .grouped()
        .iter()
        .flat_map(|group| group.column_indices.iter().copied())
        .collect();
    if covered != (0..values.len()).collect::<Vec<_>>() {
        return Err(format!(
            "grouped view is stale: covers {covered:?} for {} columns",
            values.len()
        ));
    }
    Ok(())
}

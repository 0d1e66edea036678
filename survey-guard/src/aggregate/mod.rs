//! Grouped aggregation into flattened summary tables.
//!
//! [`summarize`] turns one table and one [`SummaryDef`] into a [`SummaryTable`]:
//!
//! 1. an optional row-wise sum column is materialized
//! 2. group-by columns are checked (missing ones abort the summary)
//! 3. high cardinality is detected and, where possible, remediated
//! 4. every requested function is evaluated per group
//!
//! Output rows are sorted by typed group key, so numeric keys sort
//! numerically. Rows with a missing key form one group labelled
//! [`MISSING_PLACEHOLDER`], which sorts after every present key. Each aggregated column is named
//! `"{column}\n{function}"`, with `count` shown as `records`, and is recorded
//! in the table's provenance so QA rules can find it without parsing names.

mod cardinality;
mod functions;

pub use cardinality::{CardinalityPolicy, Regrouping};
pub use functions::UNIQUE_SEPARATOR;

use crate::config::{AggFunction, FunctionSpec, SummaryDef};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{QaError, Result};
use crate::table::{Column, DataType, Table, Value};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

/// Group key used for rows whose group-by value is missing.
pub const MISSING_PLACEHOLDER: &str = "Missing";

/// Where an aggregated column came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedColumn {
    /// Flattened column name
    pub name: String,
    /// Column the values were aggregated from
    pub source: String,
    /// Function that produced the values
    pub function: AggFunction,
}

/// A flattened summary with provenance for its aggregated columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    table: Table,
    group_by: Vec<String>,
    provenance: Vec<GeneratedColumn>,
    qa_columns: Vec<String>,
}

impl SummaryTable {
    /// Wraps an aggregated table.
    pub fn new(table: Table, group_by: Vec<String>, provenance: Vec<GeneratedColumn>) -> Self {
        Self {
            table,
            group_by,
            provenance,
            qa_columns: Vec::new(),
        }
    }

    /// The summary data, including any QA columns.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Consumes the summary and returns its table.
    pub fn into_table(self) -> Table {
        self.table
    }

    /// Columns the rows are grouped by, after any remediation.
    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Aggregated columns in declared order.
    pub fn provenance(&self) -> &[GeneratedColumn] {
        &self.provenance
    }

    /// Looks up the aggregated column produced by `function` over `source`.
    pub fn generated(&self, source: &str, function: AggFunction) -> Option<&GeneratedColumn> {
        self.provenance
            .iter()
            .find(|g| g.source == source && g.function == function)
    }

    /// Names of the QA columns, in the order they were added.
    pub fn qa_columns(&self) -> &[String] {
        &self.qa_columns
    }

    /// Number of groups.
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Converts the summary to an Arrow record batch.
    pub fn to_record_batch(&self) -> Result<arrow::record_batch::RecordBatch> {
        self.table.to_record_batch()
    }

    /// Replaces the QA columns with `columns`.
    ///
    /// QA columns from a previous run that are not in `columns` are removed;
    /// the rest are replaced in place.
    pub(crate) fn set_qa_columns(&mut self, columns: Vec<Column>) -> Result<()> {
        let keep: BTreeSet<&str> = columns.iter().map(Column::name).collect();
        let stale: Vec<String> = self
            .qa_columns
            .iter()
            .filter(|name| !keep.contains(name.as_str()))
            .cloned()
            .collect();
        if !stale.is_empty() {
            let retained = self
                .table
                .columns()
                .iter()
                .filter(|c| !stale.iter().any(|s| s == c.name()))
                .cloned()
                .collect();
            self.table = Table::from_columns(self.table.name(), retained)?;
        }

        self.qa_columns = columns.iter().map(|c| c.name().to_string()).collect();
        for column in columns {
            self.table.upsert_column(column)?;
        }
        Ok(())
    }
}

/// Builds the summary described by `def` from `table`.
///
/// `name` identifies the summary in errors and diagnostics. The definition's
/// filter is not applied here.
///
/// # Errors
///
/// Returns [`QaError::MissingGroupColumns`] if a group-by column is absent.
///
/// # Examples
///
/// ```rust
/// use survey_guard::aggregate::{summarize, CardinalityPolicy};
/// use survey_guard::config::{AggFunction, SummaryDef};
/// use survey_guard::diagnostics::Diagnostics;
/// use survey_guard::table::{Table, Value};
///
/// let table = Table::new("VegCommunitySurvey")
///     .with_column("Site", vec![Value::from("A"), Value::Null, Value::from("A")])?
///     .with_column("Cover", vec![Value::from(10), Value::from(5), Value::from(20)])?;
/// let def = SummaryDef::new("VegCommunitySurvey", ["Site"]).aggregate("Cover", AggFunction::Sum);
///
/// let mut diagnostics = Diagnostics::new();
/// let summary = summarize("Cover", &def, &table, &CardinalityPolicy::default(), &mut diagnostics)?;
///
/// assert_eq!(summary.table().column_names(), vec!["Site", "Cover\nsum"]);
/// assert_eq!(summary.table().value(1, "Site"), Some(&Value::from("Missing")));
/// # Ok::<(), survey_guard::error::QaError>(())
/// ```
#[instrument(skip(def, table, policy, diagnostics), fields(table = %table.name(), rows = table.num_rows()))]
pub fn summarize(
    name: &str,
    def: &SummaryDef,
    table: &Table,
    policy: &CardinalityPolicy,
    diagnostics: &mut Diagnostics,
) -> Result<SummaryTable> {
    let mut working = table.clone();

    if let Some((columns, new_column)) = def.derived_sum() {
        let column = derived_sum(&working, columns, new_column, name, diagnostics);
        working.upsert_column(column)?;
    }

    let missing: Vec<String> = def
        .group_by
        .iter()
        .filter(|c| !working.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(QaError::MissingGroupColumns {
            summary: name.to_string(),
            table: table.name().to_string(),
            columns: missing,
        });
    }

    let groups = count_groups(&working, &def.group_by);
    info!(summary = %name, groups, "Counted summary groups");

    if policy.is_exceeded(groups) {
        diagnostics.warn(
            DiagnosticKind::Cardinality,
            name,
            format!(
                "{groups} groups exceeds the limit of {}; the grouping may be too granular",
                policy.max_groups
            ),
        );
        if let Some(regrouping) = policy.regroup(&def.group_by, &def.summary, &working) {
            let mut message = format!(
                "regrouping by [{}] instead of '{}'",
                regrouping.group_by.join(", "),
                policy.fine_column
            );
            if !regrouping.widened.is_empty() {
                message.push_str(&format!(
                    "; sum of [{}] reported as [min, max]",
                    regrouping.widened.join(", ")
                ));
            }
            diagnostics.info(DiagnosticKind::Cardinality, name, message);
            return aggregate(name, &working, &regrouping.group_by, &regrouping.summary, diagnostics);
        }
    }

    aggregate(name, &working, &def.group_by, &def.summary, diagnostics)
}

/// Groups `table` by `group_by` and evaluates `summary`.
///
/// Aggregation columns absent from `table` are skipped with a diagnostic.
///
/// # Errors
///
/// Returns [`QaError::MissingGroupColumns`] if a group-by column is absent.
pub fn aggregate(
    name: &str,
    table: &Table,
    group_by: &[String],
    summary: &IndexMap<String, FunctionSpec>,
    diagnostics: &mut Diagnostics,
) -> Result<SummaryTable> {
    let missing: Vec<String> = group_by
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(QaError::MissingGroupColumns {
            summary: name.to_string(),
            table: table.name().to_string(),
            columns: missing,
        });
    }
    let key_columns: Vec<&Column> = group_by.iter().filter_map(|c| table.column(c)).collect();

    let groups = group_rows(table, &key_columns);
    debug!(summary = %name, groups = groups.len(), "Grouped rows");

    let mut columns: Vec<Column> = key_columns
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let values = groups.keys().map(|k| k[i].to_value()).collect();
            Column::coerced(key.name(), values)
        })
        .collect();
    let mut provenance = Vec::new();

    for (source, spec) in summary.iter() {
        let Some(column) = table.column(source) else {
            diagnostics.warn(
                DiagnosticKind::Aggregation,
                name,
                format!("column '{source}' not found in table '{}'; aggregation skipped", table.name()),
            );
            continue;
        };

        for function in spec.functions() {
            let output = function.output_column(source);
            let values: Vec<Value> = if functions::supports(function, column.data_type()) {
                groups
                    .values()
                    .map(|rows| {
                        let cells: Vec<&Value> = rows.iter().filter_map(|&r| column.get(r)).collect();
                        functions::evaluate(function, &cells, column.data_type())
                    })
                    .collect()
            } else {
                diagnostics.warn(
                    DiagnosticKind::Aggregation,
                    name,
                    format!(
                        "cannot compute {function} of {} column '{source}'; values left empty",
                        column.data_type()
                    ),
                );
                vec![Value::Null; groups.len()]
            };
            columns.push(Column::coerced(output.clone(), values));
            provenance.push(GeneratedColumn {
                name: output,
                source: source.to_string(),
                function,
            });
        }
    }

    let table = Table::from_columns(table.name(), columns)?;
    Ok(SummaryTable::new(table, group_by.to_vec(), provenance))
}

fn derived_sum(
    table: &Table,
    columns: &[String],
    new_column: &str,
    scope: &str,
    diagnostics: &mut Diagnostics,
) -> Column {
    let mut inputs: Vec<&Column> = Vec::with_capacity(columns.len());
    for name in columns {
        match table.column(name) {
            Some(c) if c.data_type().is_numeric() || c.data_type() == DataType::Null => inputs.push(c),
            Some(c) => diagnostics.warn(
                DiagnosticKind::Aggregation,
                scope,
                format!("sum column '{name}' is {}, not numeric; skipped", c.data_type()),
            ),
            None => diagnostics.warn(
                DiagnosticKind::Aggregation,
                scope,
                format!("sum column '{name}' not found in table '{}'; skipped", table.name()),
            ),
        }
    }
    let all_integer = inputs.iter().all(|c| c.data_type() != DataType::Float);
    let slices: Vec<&[Value]> = inputs.iter().map(|c| c.values()).collect();
    Column::coerced(
        new_column,
        functions::row_sum(&slices, all_integer, table.num_rows()),
    )
}

/// One cell of a group key. Missing cells sort after every present value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Present(Value),
    Missing,
}

impl GroupKey {
    fn of(column: &Column, row: usize) -> Self {
        match column.get(row) {
            None | Some(Value::Null) => GroupKey::Missing,
            Some(Value::Str(s)) if s == MISSING_PLACEHOLDER => GroupKey::Missing,
            Some(value) => GroupKey::Present(value.clone()),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            GroupKey::Present(value) => value.clone(),
            GroupKey::Missing => Value::from(MISSING_PLACEHOLDER),
        }
    }
}

fn group_rows(table: &Table, key_columns: &[&Column]) -> BTreeMap<Vec<GroupKey>, Vec<usize>> {
    let mut groups: BTreeMap<Vec<GroupKey>, Vec<usize>> = BTreeMap::new();
    for row in 0..table.num_rows() {
        let key = key_columns.iter().map(|c| GroupKey::of(c, row)).collect();
        groups.entry(key).or_default().push(row);
    }
    groups
}

fn count_groups(table: &Table, group_by: &[String]) -> usize {
    let key_columns: Vec<&Column> = group_by.iter().filter_map(|c| table.column(c)).collect();
    (0..table.num_rows())
        .map(|row| {
            key_columns
                .iter()
                .map(|c| GroupKey::of(c, row))
                .collect::<Vec<_>>()
        })
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> Table {
        Table::new("VegCommunitySurvey")
            .with_column(
                "Site",
                vec![Value::from("B"), Value::Null, Value::from("A"), Value::from("B")],
            )
            .unwrap()
            .with_column("Year", vec![Value::from(2025); 4])
            .unwrap()
            .with_column(
                "Cover",
                vec![Value::from(10), Value::from(5), Value::Null, Value::from(30)],
            )
            .unwrap()
            .with_column(
                "ScientificName",
                vec![Value::from("Poa"), Value::from("Carex"), Value::from("Poa"), Value::from("Carex")],
            )
            .unwrap()
    }

    fn run(def: &SummaryDef) -> (Result<SummaryTable>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let result = summarize("test", def, &survey(), &CardinalityPolicy::default(), &mut diagnostics);
        (result, diagnostics)
    }

    #[test]
    fn test_flattened_naming_and_provenance() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site", "Year"])
            .aggregate("Cover", vec![AggFunction::Sum, AggFunction::Count])
            .aggregate("ScientificName", vec![AggFunction::Nunique, AggFunction::Unique]);
        let (summary, diagnostics) = run(&def);
        let summary = summary.unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(
            summary.table().column_names(),
            vec![
                "Site",
                "Year",
                "Cover\nsum",
                "Cover\nrecords",
                "ScientificName\nnunique",
                "ScientificName\nunique"
            ]
        );
        assert_eq!(summary.provenance().len(), 4);
        assert_eq!(
            summary.generated("Cover", AggFunction::Count).unwrap().name,
            "Cover\nrecords"
        );
        assert!(summary.qa_columns().is_empty());
    }

    #[test]
    fn test_null_keys_form_missing_group_and_rows_are_sorted() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("Cover", AggFunction::Sum)
            .aggregate("ScientificName", AggFunction::Unique);
        let summary = run(&def).0.unwrap();
        let table = summary.table();

        assert_eq!(
            table.column("Site").unwrap().values(),
            &[Value::from("A"), Value::from("B"), Value::from("Missing")]
        );
        assert_eq!(
            table.column("Cover\nsum").unwrap().values(),
            &[Value::Int(0), Value::Int(40), Value::Int(5)]
        );
        assert_eq!(table.value(1, "ScientificName\nunique"), Some(&Value::from("Carex; Poa")));
    }

    #[test]
    fn test_numeric_keys_sort_numerically_with_missing_last() {
        let table = Table::new("t")
            .with_column(
                "Plot",
                vec![Value::from(10), Value::from(2), Value::Null, Value::from(9)],
            )
            .unwrap()
            .with_column("v", vec![Value::from(1), Value::from(2), Value::from(3), Value::from(4)])
            .unwrap();
        let def = SummaryDef::new("t", ["Plot"]).aggregate("v", AggFunction::Sum);
        let mut diagnostics = Diagnostics::new();
        let summary =
            summarize("s", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();

        let plots: Vec<String> = summary
            .table()
            .column("Plot")
            .unwrap()
            .values()
            .iter()
            .map(Value::to_string)
            .collect();
        assert_eq!(plots, vec!["2", "9", "10", "Missing"]);
        assert_eq!(
            summary.table().column("v\nsum").unwrap().values(),
            &[Value::Int(2), Value::Int(4), Value::Int(1), Value::Int(3)]
        );
    }

    #[test]
    fn test_numeric_keys_without_missing_stay_numeric() {
        let table = Table::new("t")
            .with_column("Plot", vec![Value::from(10), Value::from(2), Value::from(10)])
            .unwrap()
            .with_column("v", vec![Value::from(1); 3])
            .unwrap();
        let def = SummaryDef::new("t", ["Plot"]).aggregate("v", AggFunction::Count);
        let mut diagnostics = Diagnostics::new();
        let summary =
            summarize("s", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();

        let plot = summary.table().column("Plot").unwrap();
        assert_eq!(plot.data_type(), DataType::Int);
        assert_eq!(plot.values(), &[Value::Int(2), Value::Int(10)]);
    }

    #[test]
    fn test_missing_group_column_is_fatal() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site", "TransectID"])
            .aggregate("Cover", AggFunction::Count);
        let err = run(&def).0.unwrap_err();
        match err {
            QaError::MissingGroupColumns { summary, table, columns } => {
                assert_eq!(summary, "test");
                assert_eq!(table, "VegCommunitySurvey");
                assert_eq!(columns, vec!["TransectID"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_and_incompatible_aggregations_are_diagnosed() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("Absent", AggFunction::Count)
            .aggregate("ScientificName", AggFunction::Mean);
        let (summary, diagnostics) = run(&def);
        let summary = summary.unwrap();

        assert_eq!(diagnostics.of_kind(DiagnosticKind::Aggregation).count(), 2);
        assert_eq!(summary.table().column_names(), vec!["Site", "ScientificName\nmean"]);
        assert_eq!(summary.table().column("ScientificName\nmean").unwrap().null_count(), 3);
    }

    #[test]
    fn test_derived_sum_column() {
        let table = Table::new("VegRecruitment")
            .with_column("Unit", vec![Value::from("U1"), Value::from("U1"), Value::from("U2")])
            .unwrap()
            .with_column("Stage0", vec![Value::from(1), Value::Null, Value::from(4)])
            .unwrap()
            .with_column("Stage1", vec![Value::from(2), Value::from(3), Value::Null])
            .unwrap();
        let def = SummaryDef::new("VegRecruitment", ["Unit"])
            .with_sum_columns(["Stage0", "Stage1", "Stage9"], "Total")
            .aggregate("Total", AggFunction::Sum);
        let mut diagnostics = Diagnostics::new();
        let summary =
            summarize("Recruits", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();

        assert_eq!(
            summary.table().column("Total\nsum").unwrap().values(),
            &[Value::Int(6), Value::Int(4)]
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.entries()[0].message.contains("'Stage9'"));
    }

    #[test]
    fn test_high_cardinality_regroups() {
        let n = 60;
        let units: Vec<Value> = (0..n).map(|i| Value::from(format!("Q{i:02}"))).collect();
        let points: Vec<Value> = (0..n).map(|i| Value::from(format!("P{}", i % 3))).collect();
        let transects: Vec<Value> = (0..n).map(|i| Value::from(format!("T{}", i % 2))).collect();
        let cover: Vec<Value> = (0..n).map(|i| Value::from(i as i64)).collect();
        let table = Table::new("VegCommunitySurvey")
            .with_column("SamplingUnitID", units)
            .unwrap()
            .with_column("SamplePointName", points)
            .unwrap()
            .with_column("TransectID", transects)
            .unwrap()
            .with_column("Cover", cover)
            .unwrap();
        let def = SummaryDef::new("VegCommunitySurvey", ["SamplingUnitID"])
            .aggregate("Cover", AggFunction::Sum);

        let mut diagnostics = Diagnostics::new();
        let summary =
            summarize("Cover", &def, &table, &CardinalityPolicy::default(), &mut diagnostics).unwrap();

        assert_eq!(summary.group_by(), &["SamplePointName", "TransectID"]);
        assert_eq!(
            summary.table().column_names(),
            vec!["SamplePointName", "TransectID", "Cover\nmin", "Cover\nmax"]
        );
        assert_eq!(summary.num_rows(), 6);
        assert_eq!(summary.table().value(0, "Cover\nmin"), Some(&Value::Int(0)));
        assert_eq!(diagnostics.of_kind(DiagnosticKind::Cardinality).count(), 2);
    }

    #[test]
    fn test_set_qa_columns_replaces_previous_run() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"]).aggregate("Cover", AggFunction::Max);
        let mut summary = run(&def).0.unwrap();
        let qa = |name: &str| Column::coerced(name, vec![Value::from("\u{2713}"); 3]);

        summary.set_qa_columns(vec![qa("QA Check\na"), qa("QA Check\nb")]).unwrap();
        summary.set_qa_columns(vec![qa("QA Check\nb")]).unwrap();

        assert_eq!(summary.table().column_names(), vec!["Site", "Cover\nmax", "QA Check\nb"]);
        assert_eq!(summary.qa_columns(), &["QA Check\nb"]);
    }
}

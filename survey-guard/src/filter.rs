//! Row filtering with [`FilterSpec`]s.
//!
//! Terms are applied in order and combined with AND. A term that cannot be
//! evaluated against the table is dropped with a diagnostic; the remaining
//! terms still apply.

use crate::config::{FilterCondition, FilterSpec, Predicate};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::logging::{truncate_field, LogConfig};
use crate::table::{DataType, Table, Value};
use tracing::{debug, instrument};

/// A predicate whose literals have been coerced to the column type.
#[derive(Debug)]
enum Resolved {
    IsNull,
    IsNotNull,
    LessThan(Value),
    GreaterThan(Value),
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

impl Resolved {
    /// Missing cells never satisfy `<`, `>`, `==` or `in`.
    fn matches(&self, cell: &Value) -> bool {
        match self {
            Resolved::IsNull => cell.is_null(),
            Resolved::IsNotNull => !cell.is_null(),
            Resolved::NotEquals(v) => cell.is_null() || v.is_null() || cell != v,
            Resolved::NotIn(vs) => cell.is_null() || !vs.iter().any(|v| !v.is_null() && v == cell),
            _ if cell.is_null() => false,
            Resolved::LessThan(v) => cell < v,
            Resolved::GreaterThan(v) => cell > v,
            Resolved::Equals(v) => !v.is_null() && cell == v,
            Resolved::In(vs) => vs.iter().any(|v| !v.is_null() && v == cell),
        }
    }
}

/// Converts a literal so it compares meaningfully with a column of `data_type`.
fn comparable(literal: &Value, data_type: DataType) -> Option<Value> {
    if literal.is_null() || data_type == DataType::Null {
        return Some(literal.clone());
    }
    if literal.data_type().is_numeric() && data_type.is_numeric() {
        return Some(literal.clone());
    }
    literal.coerce_to(data_type)
}

fn resolve(predicate: &Predicate, data_type: DataType) -> Result<Resolved, String> {
    let single = |v: &Value| {
        comparable(v, data_type)
            .ok_or_else(|| format!("cannot compare '{v}' with a {data_type} column"))
    };
    let list = |vs: &[Value]| vs.iter().map(single).collect::<Result<Vec<_>, _>>();
    match predicate {
        Predicate::LessThan(v) | Predicate::GreaterThan(v) if v.is_null() => {
            Err(format!("'{}' needs a non-null operand", predicate.operator()))
        }
        Predicate::LessThan(v) => single(v).map(Resolved::LessThan),
        Predicate::GreaterThan(v) => single(v).map(Resolved::GreaterThan),
        Predicate::Equals(v) => single(v).map(Resolved::Equals),
        Predicate::NotEquals(v) => single(v).map(Resolved::NotEquals),
        Predicate::In(vs) => list(vs).map(Resolved::In),
        Predicate::NotIn(vs) => list(vs).map(Resolved::NotIn),
        Predicate::Unsupported { operator, reason } => {
            Err(format!("unsupported operator '{operator}': {reason}"))
        }
    }
}

/// Returns the rows of `table` that satisfy every evaluable term of `spec`.
///
/// `scope` names the summary or plot the filter belongs to and is used for
/// diagnostics only.
///
/// # Examples
///
/// ```rust
/// use survey_guard::config::FilterSpec;
/// use survey_guard::diagnostics::Diagnostics;
/// use survey_guard::filter::apply_filter;
/// use survey_guard::table::{Table, Value};
///
/// let table = Table::new("VegCommunitySurvey")
///     .with_column("TransectID", vec![Value::from("T1"), Value::Null])?;
///
/// let mut diagnostics = Diagnostics::new();
/// let plots = apply_filter(&FilterSpec::new().is_null("TransectID"), &table, "Plots", &mut diagnostics);
/// assert_eq!(plots.num_rows(), 1);
/// # Ok::<(), survey_guard::error::QaError>(())
/// ```
#[instrument(skip(spec, table, diagnostics), fields(table = %table.name(), rows = table.num_rows()))]
pub fn apply_filter(
    spec: &FilterSpec,
    table: &Table,
    scope: &str,
    diagnostics: &mut Diagnostics,
) -> Table {
    let mut keep = vec![true; table.num_rows()];

    for (column_name, condition) in spec.terms() {
        let Some(column) = table.column(column_name) else {
            diagnostics.warn(
                DiagnosticKind::Filter,
                scope,
                format!(
                    "filter column '{column_name}' not found in table '{}'; term skipped",
                    table.name()
                ),
            );
            continue;
        };

        let resolved = match condition {
            FilterCondition::IsNull => vec![Resolved::IsNull],
            FilterCondition::IsNotNull => vec![Resolved::IsNotNull],
            FilterCondition::Unsupported(raw) => {
                diagnostics.warn(
                    DiagnosticKind::Filter,
                    scope,
                    format!(
                        "unsupported filter condition {} on '{column_name}'; term skipped",
                        truncate_field(raw, LogConfig::default().max_field_length)
                    ),
                );
                continue;
            }
            FilterCondition::Predicates(predicates) => predicates
                .iter()
                .filter_map(|p| match resolve(p, column.data_type()) {
                    Ok(r) => Some(r),
                    Err(reason) => {
                        diagnostics.warn(
                            DiagnosticKind::Filter,
                            scope,
                            format!("{reason} on '{column_name}'; term skipped"),
                        );
                        None
                    }
                })
                .collect(),
        };

        for (row, cell) in column.values().iter().enumerate() {
            if keep[row] && !resolved.iter().all(|r| r.matches(cell)) {
                keep[row] = false;
            }
        }
    }

    let rows: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(row, &k)| k.then_some(row))
        .collect();
    debug!(kept = rows.len(), "Applied filter");
    table.take(&rows)
}

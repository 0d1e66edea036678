//! Table joins.
//!
//! [`join_tables`] resolves an ordered list of [`JoinSpec`]s against a
//! workbook. Each spec's result replaces its left table, and later specs see
//! that enriched version whether the table appears on their left or right, so
//! joins can be chained.

use crate::config::{JoinSpec, JoinType};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{QaError, Result};
use crate::table::{self, Column, Table, Value, Workbook};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Applies `specs` in order and returns every table of `tables`, with joined
/// tables replacing their originals.
///
/// A spec whose tables or key columns are missing is skipped with a
/// diagnostic.
#[instrument(skip_all, fields(tables = tables.len(), joins = specs.len()))]
pub fn join_tables(tables: &Workbook, specs: &[JoinSpec], diagnostics: &mut Diagnostics) -> Workbook {
    let mut joined = Workbook::new();

    for spec in specs {
        let scope = spec.to_string();
        let lookup = |name: &str| {
            table::lookup(&joined, name).or_else(|_| table::lookup(tables, name))
        };
        let (left, right) = match lookup(&spec.left).and_then(|l| Ok((l, lookup(&spec.right)?))) {
            Ok(pair) => pair,
            Err(e) => {
                diagnostics.warn(DiagnosticKind::Join, scope, format!("{e}; join skipped"));
                continue;
            }
        };

        match merge(left, right, &spec.on, spec.how) {
            Ok(result) => {
                info!(
                    join = %scope,
                    rows = result.num_rows(),
                    columns = result.num_columns(),
                    "Joined tables"
                );
                joined.insert(spec.left.clone(), result);
            }
            Err(e) => diagnostics.warn(DiagnosticKind::Join, scope, format!("{e}; join skipped")),
        }
    }

    tables
        .iter()
        .map(|(name, table)| {
            let table = joined.shift_remove(name).unwrap_or_else(|| table.clone());
            (name.clone(), table)
        })
        .collect()
}

/// Joins `right` onto `left` by equality of the `on` columns.
///
/// Missing keys match each other. The result keeps `left`'s name and columns,
/// followed by the non-key columns of `right`; a non-key name present on both
/// sides is suffixed `_x` on the left and `_y` on the right.
///
/// Inner and left joins follow the left row order, right joins the right row
/// order, and outer joins append unmatched right rows after the left join.
///
/// # Errors
///
/// Returns a configuration error when `on` is empty or a key column is absent
/// from either table.
pub fn merge(left: &Table, right: &Table, on: &[String], how: JoinType) -> Result<Table> {
    if on.is_empty() {
        return Err(QaError::configuration("join has no key columns"));
    }
    for (table, side) in [(left, "left"), (right, "right")] {
        let missing: Vec<&str> = on
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(QaError::configuration(format!(
                "key columns {missing:?} not found in {side} table '{}'",
                table.name()
            )));
        }
    }

    let left_keys = row_keys(left, on);
    let right_keys = row_keys(right, on);
    let pairs = match_rows(&left_keys, &right_keys, how);
    debug!(left = left.num_rows(), right = right.num_rows(), output = pairs.len(), "Matched rows");

    let is_key = |name: &str| on.iter().any(|k| k == name);
    let mut columns = Vec::with_capacity(left.num_columns() + right.num_columns());

    for column in left.columns() {
        let name = column.name();
        let values: Vec<Value> = if is_key(name) {
            let key_index = on.iter().position(|k| k == name).unwrap_or(0);
            pairs
                .iter()
                .map(|&(l, r)| match (l, r) {
                    (Some(l), _) => column.get(l).cloned().unwrap_or(Value::Null),
                    (None, Some(r)) => right_keys[r][key_index].clone(),
                    (None, None) => Value::Null,
                })
                .collect()
        } else {
            pairs
                .iter()
                .map(|&(l, _)| cell(column, l))
                .collect()
        };
        let name = if !is_key(name) && right.has_column(name) {
            format!("{name}_x")
        } else {
            name.to_string()
        };
        columns.push(Column::coerced(name, values));
    }

    for column in right.columns().iter().filter(|c| !is_key(c.name())) {
        let values = pairs.iter().map(|&(_, r)| cell(column, r)).collect();
        let name = if left.has_column(column.name()) {
            format!("{}_y", column.name())
        } else {
            column.name().to_string()
        };
        columns.push(Column::coerced(name, values));
    }

    Table::from_columns(left.name(), columns)
}

fn cell(column: &Column, row: Option<usize>) -> Value {
    row.and_then(|r| column.get(r)).cloned().unwrap_or(Value::Null)
}

fn row_keys(table: &Table, on: &[String]) -> Vec<Vec<Value>> {
    let key_columns: Vec<&Column> = on.iter().filter_map(|c| table.column(c)).collect();
    (0..table.num_rows())
        .map(|row| key_columns.iter().map(|c| cell(c, Some(row))).collect())
        .collect()
}

fn index(keys: &[Vec<Value>]) -> BTreeMap<&[Value], Vec<usize>> {
    let mut index: BTreeMap<&[Value], Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        index.entry(key.as_slice()).or_default().push(row);
    }
    index
}

type RowPair = (Option<usize>, Option<usize>);

fn match_rows(left: &[Vec<Value>], right: &[Vec<Value>], how: JoinType) -> Vec<RowPair> {
    let mut pairs = Vec::new();

    if how == JoinType::Right {
        let left_index = index(left);
        for (r, key) in right.iter().enumerate() {
            match left_index.get(key.as_slice()) {
                Some(rows) => pairs.extend(rows.iter().map(|&l| (Some(l), Some(r)))),
                None => pairs.push((None, Some(r))),
            }
        }
        return pairs;
    }

    let right_index = index(right);
    let mut right_matched = vec![false; right.len()];
    for (l, key) in left.iter().enumerate() {
        match right_index.get(key.as_slice()) {
            Some(rows) => {
                for &r in rows {
                    right_matched[r] = true;
                    pairs.push((Some(l), Some(r)));
                }
            }
            None if how != JoinType::Inner => pairs.push((Some(l), None)),
            None => {}
        }
    }

    if how == JoinType::Outer {
        pairs.extend(
            right_matched
                .iter()
                .enumerate()
                .filter(|(_, matched)| !**matched)
                .map(|(r, _)| (None, Some(r))),
        );
    }
    pairs
}

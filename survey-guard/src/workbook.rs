//! Workbook preparation applied before joining.
//!
//! Loaders hand over every sheet of a workbook as a [`Workbook`]. Two steps can
//! run before the pipeline sees it: a [`DateWindow`] that restricts dated
//! tables to a reporting period, and [`split_by_group`], which turns a
//! multi-group workbook into one workbook per group.

use crate::error::{QaError, Result};
use crate::table::{Column, DataType, Table, Value, Workbook};
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Date columns looked up in this order.
pub const DATE_COLUMNS: [&str; 2] = ["SampleDate", "date"];

/// Default group column.
pub const GROUP_COLUMN: &str = "GroupName";

/// Group used for workbooks without a group column.
pub const DEFAULT_GROUP: &str = "QA";

/// An inclusive reporting period.
///
/// # Examples
///
/// ```rust
/// use chrono::NaiveDate;
/// use survey_guard::table::{Table, Value, Workbook};
/// use survey_guard::workbook::DateWindow;
///
/// let day = |d| NaiveDate::from_ymd_opt(2024, 10, d).unwrap();
/// let mut workbook = Workbook::new();
/// workbook.insert(
///     "VegCommunitySurvey".to_string(),
///     Table::new("VegCommunitySurvey")
///         .with_column("SampleDate", vec![Value::from(day(1)), Value::from(day(20))])?,
/// );
///
/// let window = DateWindow::new(day(1), day(10))?;
/// let windowed = window.apply(&workbook)?;
/// let survey = windowed.get("VegCommunitySurvey").unwrap();
/// assert_eq!(survey.num_rows(), 1);
/// assert_eq!(survey.value(0, "Month"), Some(&Value::Int(10)));
/// # Ok::<(), survey_guard::error::QaError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    /// First day kept
    pub start: NaiveDate,
    /// Last day kept
    pub end: NaiveDate,
}

impl DateWindow {
    /// Creates a window, rejecting one that ends before it starts.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(QaError::configuration(format!(
                "date window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Returns true if `date` is within the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Restricts every dated table to the window and adds `Year` and `Month`.
    ///
    /// A table is dated when it has a `SampleDate` column, or failing that a
    /// `date` column, holding dates or `%Y-%m-%d` strings. Rows whose date is
    /// missing or unparseable are dropped. Other tables pass through unchanged.
    #[instrument(skip(self, workbook), fields(start = %self.start, end = %self.end))]
    pub fn apply(&self, workbook: &Workbook) -> Result<Workbook> {
        let mut windowed = Workbook::new();
        for (name, table) in workbook.iter() {
            let table = match date_column(table) {
                Some(column) => self.restrict(table, column)?,
                None => {
                    debug!(table = %name, "No date column; table kept whole");
                    table.clone()
                }
            };
            windowed.insert(name.clone(), table);
        }
        Ok(windowed)
    }

    fn restrict(&self, table: &Table, column: &Column) -> Result<Table> {
        let dates: Vec<Option<NaiveDate>> = column
            .values()
            .iter()
            .map(|v| v.coerce_to(DataType::Date).and_then(|d| d.as_date()))
            .collect();
        let rows: Vec<usize> = dates
            .iter()
            .enumerate()
            .filter_map(|(row, date)| date.filter(|d| self.contains(*d)).map(|_| row))
            .collect();

        let kept: Vec<NaiveDate> = rows.iter().filter_map(|&row| dates[row]).collect();
        let mut restricted = table.take(&rows);
        restricted.upsert_column(Column::new(
            column.name(),
            kept.iter().copied().map(Value::from).collect(),
        )?)?;
        restricted.upsert_column(Column::new(
            "Year",
            kept.iter().map(|d| Value::Int(i64::from(d.year()))).collect(),
        )?)?;
        restricted.upsert_column(Column::new(
            "Month",
            kept.iter().map(|d| Value::Int(i64::from(d.month()))).collect(),
        )?)?;

        debug!(
            table = %table.name(),
            date_column = %column.name(),
            before = table.num_rows(),
            after = restricted.num_rows(),
            "Applied date window"
        );
        Ok(restricted)
    }
}

fn date_column(table: &Table) -> Option<&Column> {
    DATE_COLUMNS
        .iter()
        .find_map(|name| table.column(name))
        .filter(|c| matches!(c.data_type(), DataType::Date | DataType::Str | DataType::Null))
}

/// Splits a workbook into one workbook per group.
///
/// With `explicit_group` only that group is produced. Otherwise the groups are
/// the distinct non-null values of `column` in `source_table`, in sorted order;
/// when the source table or column is absent, or holds no values, the single
/// group [`DEFAULT_GROUP`] is produced. Within each group's workbook, every
/// table that has `column` keeps only that group's rows; other tables are
/// shared unchanged.
///
/// # Examples
///
/// ```rust
/// use survey_guard::table::{Table, Value, Workbook};
/// use survey_guard::workbook::split_by_group;
///
/// let mut workbook = Workbook::new();
/// workbook.insert(
///     "FishSurveyEffort".to_string(),
///     Table::new("FishSurveyEffort")
///         .with_column("GroupName", vec![Value::from("North"), Value::from("South")])?,
/// );
///
/// let groups = split_by_group(&workbook, "GroupName", "FishSurveyEffort", None);
/// assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["North", "South"]);
/// # Ok::<(), survey_guard::error::QaError>(())
/// ```
#[instrument(skip(workbook))]
pub fn split_by_group(
    workbook: &Workbook,
    column: &str,
    source_table: &str,
    explicit_group: Option<&str>,
) -> IndexMap<String, Workbook> {
    let groups: Vec<String> = match explicit_group {
        Some(group) => vec![group.to_string()],
        None => {
            let found: BTreeSet<&Value> = workbook
                .get(source_table)
                .and_then(|t| t.column(column))
                .map(|c| c.values().iter().filter(|v| !v.is_null()).collect())
                .unwrap_or_default();
            if found.is_empty() {
                vec![DEFAULT_GROUP.to_string()]
            } else {
                found.into_iter().map(Value::to_string).collect()
            }
        }
    };
    info!(groups = ?groups, "Splitting workbook by group");

    groups
        .into_iter()
        .map(|group| {
            let tables = workbook
                .iter()
                .map(|(name, table)| (name.clone(), rows_for_group(table, column, &group)))
                .collect();
            (group, tables)
        })
        .collect()
}

fn rows_for_group(table: &Table, column: &str, group: &str) -> Table {
    let Some(values) = table.column(column).map(Column::values) else {
        return table.clone();
    };
    let rows: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(row, v)| (!v.is_null() && v.to_string() == group).then_some(row))
        .collect();
    table.take(&rows)
}

//! Summary definitions and aggregation functions.

use super::FilterSpec;
use crate::error::{QaError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation functions available to summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunction {
    /// Number of non-missing values
    Count,
    /// Number of distinct non-missing values
    Nunique,
    /// Sum of values
    Sum,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Arithmetic mean
    Mean,
    /// Sorted distinct values joined into one string
    Unique,
    /// First non-missing value
    First,
}

impl AggFunction {
    /// Name as written in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            AggFunction::Count => "count",
            AggFunction::Nunique => "nunique",
            AggFunction::Sum => "sum",
            AggFunction::Min => "min",
            AggFunction::Max => "max",
            AggFunction::Mean => "mean",
            AggFunction::Unique => "unique",
            AggFunction::First => "first",
        }
    }

    /// Name used in flattened column names; `count` reads as `records`.
    pub fn display_name(&self) -> &'static str {
        match self {
            AggFunction::Count => "records",
            other => other.name(),
        }
    }

    /// Returns true for functions that only make sense on numbers.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggFunction::Sum | AggFunction::Mean)
    }

    /// Flattened output column name for `column`.
    pub fn output_column(&self, column: &str) -> String {
        format!("{column}\n{}", self.display_name())
    }
}

impl fmt::Display for AggFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One function or a list of functions applied to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionSpec {
    /// A single function
    Single(AggFunction),
    /// Several functions, each producing its own column
    List(Vec<AggFunction>),
}

impl FunctionSpec {
    /// Functions in declared order, without duplicates.
    pub fn functions(&self) -> Vec<AggFunction> {
        match self {
            FunctionSpec::Single(f) => vec![*f],
            FunctionSpec::List(fs) => {
                let mut out: Vec<AggFunction> = Vec::with_capacity(fs.len());
                for f in fs {
                    if !out.contains(f) {
                        out.push(*f);
                    }
                }
                out
            }
        }
    }

    /// Returns true if `function` is requested.
    pub fn contains(&self, function: AggFunction) -> bool {
        self.functions().contains(&function)
    }

    /// Replaces `sum` with `min` and `max`, keeping the position of the sum.
    ///
    /// Returns `None` when the spec has no `sum`.
    pub fn widen_sum(&self) -> Option<FunctionSpec> {
        if !self.contains(AggFunction::Sum) {
            return None;
        }
        let mut widened = Vec::new();
        for f in self.functions() {
            let replacement: &[AggFunction] = if f == AggFunction::Sum {
                &[AggFunction::Min, AggFunction::Max]
            } else {
                std::slice::from_ref(&f)
            };
            for r in replacement {
                if !widened.contains(r) {
                    widened.push(*r);
                }
            }
        }
        Some(FunctionSpec::List(widened))
    }
}

impl From<AggFunction> for FunctionSpec {
    fn from(f: AggFunction) -> Self {
        FunctionSpec::Single(f)
    }
}

impl From<Vec<AggFunction>> for FunctionSpec {
    fn from(fs: Vec<AggFunction>) -> Self {
        FunctionSpec::List(fs)
    }
}

/// A grouped summary of one table.
///
/// # Examples
///
/// ```rust
/// use survey_guard::config::{AggFunction, FilterSpec, SummaryDef};
///
/// let def = SummaryDef::new("VegCommunitySurvey", ["Year", "Month", "SamplePointName"])
///     .aggregate("SamplingUnitID", vec![AggFunction::Nunique, AggFunction::Count])
///     .with_filter(FilterSpec::new().is_null("TransectID"));
///
/// assert!(def.validate("Plot effort").is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDef {
    /// Source table (after joins)
    pub table: String,
    /// Grouping columns
    pub group_by: Vec<String>,
    /// Aggregations in declared order
    pub summary: IndexMap<String, FunctionSpec>,
    /// Row filter applied before grouping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSpec>,
    /// Columns summed row-wise into `new_column_name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_columns: Option<Vec<String>>,
    /// Name of the row-wise sum column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
    /// Free-text guidance shown with the summary in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SummaryDef {
    /// Creates a summary of `table` grouped by `group_by` with no aggregations.
    pub fn new<I, S>(table: impl Into<String>, group_by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            group_by: group_by.into_iter().map(Into::into).collect(),
            summary: IndexMap::new(),
            filter: None,
            sum_columns: None,
            new_column_name: None,
            note: None,
        }
    }

    /// Adds an aggregation of `column`.
    pub fn aggregate(mut self, column: impl Into<String>, spec: impl Into<FunctionSpec>) -> Self {
        self.summary.insert(column.into(), spec.into());
        self
    }

    /// Sets the row filter.
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Materializes `new_column` as the row-wise sum of `columns` before grouping.
    pub fn with_sum_columns<I, S>(mut self, columns: I, new_column: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sum_columns = Some(columns.into_iter().map(Into::into).collect());
        self.new_column_name = Some(new_column.into());
        self
    }

    /// Sets the report note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The row-wise sum to materialize, when both parts are configured.
    pub fn derived_sum(&self) -> Option<(&[String], &str)> {
        match (&self.sum_columns, &self.new_column_name) {
            (Some(columns), Some(name)) => Some((columns.as_slice(), name.as_str())),
            _ => None,
        }
    }

    /// Checks the definition's shape.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the group-by list or the aggregation
    /// map is empty, a function list is empty, or only one of `sum_columns` and
    /// `new_column_name` is set.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.group_by.is_empty() {
            return Err(QaError::configuration(format!(
                "summary '{name}' has no group_by columns"
            )));
        }
        if self.summary.is_empty() {
            return Err(QaError::configuration(format!(
                "summary '{name}' has no aggregations"
            )));
        }
        if let Some((column, _)) = self
            .summary
            .iter()
            .find(|(_, spec)| spec.functions().is_empty())
        {
            return Err(QaError::configuration(format!(
                "summary '{name}' lists no functions for column '{column}'"
            )));
        }
        if self.sum_columns.is_some() != self.new_column_name.is_some() {
            return Err(QaError::configuration(format!(
                "summary '{name}' must set both sum_columns and new_column_name"
            )));
        }
        Ok(())
    }
}

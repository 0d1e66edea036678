//! High-cardinality detection and regrouping.
//!
//! Surveys laid out as many tiny quadrats produce one `SamplingUnitID` per
//! quadrat, which makes per-unit summaries too granular to read. When a summary
//! would produce more groups than the policy allows, the fine identifier is
//! replaced by the coarser sample-point and transect columns, and every `sum`
//! is widened into a `[min, max]` range.

use crate::config::FunctionSpec;
use crate::error::{QaError, Result};
use crate::table::Table;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Threshold and column names used for cardinality remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityPolicy {
    /// Largest number of groups accepted without remediation
    pub max_groups: usize,
    /// Fine-grained identifier column that is replaced
    pub fine_column: String,
    /// Coarser columns substituted for the identifier
    pub coarse_columns: Vec<String>,
}

impl Default for CardinalityPolicy {
    fn default() -> Self {
        Self {
            max_groups: 50,
            fine_column: "SamplingUnitID".to_string(),
            coarse_columns: vec!["SamplePointName".to_string(), "TransectID".to_string()],
        }
    }
}

/// The grouping and aggregations to use after remediation.
#[derive(Debug, Clone, PartialEq)]
pub struct Regrouping {
    /// New group-by columns
    pub group_by: Vec<String>,
    /// Aggregations with every `sum` widened
    pub summary: IndexMap<String, FunctionSpec>,
    /// Columns whose `sum` was widened
    pub widened: Vec<String>,
}

impl CardinalityPolicy {
    /// Sets the group threshold.
    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    /// Returns true if `groups` exceeds the threshold.
    pub fn is_exceeded(&self, groups: usize) -> bool {
        groups > self.max_groups
    }

    /// Checks the policy's shape.
    pub fn validate(&self) -> Result<()> {
        if self.coarse_columns.is_empty() {
            return Err(QaError::configuration(
                "cardinality policy needs at least one coarse column",
            ));
        }
        if self.coarse_columns.contains(&self.fine_column) {
            return Err(QaError::configuration(format!(
                "cardinality policy lists '{}' as both fine and coarse",
                self.fine_column
            )));
        }
        Ok(())
    }

    /// Computes the regrouping for `group_by`, if it applies.
    ///
    /// Applies when `group_by` contains the fine column and every coarse column
    /// exists in `table`. Coarse columns already grouped on are not repeated.
    pub fn regroup(
        &self,
        group_by: &[String],
        summary: &IndexMap<String, FunctionSpec>,
        table: &Table,
    ) -> Option<Regrouping> {
        if !group_by.contains(&self.fine_column)
            || !self.coarse_columns.iter().all(|c| table.has_column(c))
        {
            return None;
        }

        let mut regrouped: Vec<String> = group_by
            .iter()
            .filter(|c| **c != self.fine_column)
            .cloned()
            .collect();
        for coarse in &self.coarse_columns {
            if !regrouped.contains(coarse) {
                regrouped.push(coarse.clone());
            }
        }

        let mut widened = Vec::new();
        let summary = summary
            .iter()
            .map(|(column, spec)| match spec.widen_sum() {
                Some(range) => {
                    widened.push(column.clone());
                    (column.clone(), range)
                }
                None => (column.clone(), spec.clone()),
            })
            .collect();

        Some(Regrouping {
            group_by: regrouped,
            summary,
            widened,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggFunction;
    use crate::table::Value;

    fn table(with_transect: bool) -> Table {
        let mut table = Table::new("VegCommunitySurvey")
            .with_column("SamplingUnitID", vec![Value::from("Q1")])
            .unwrap()
            .with_column("SamplePointName", vec![Value::from("P1")])
            .unwrap();
        if with_transect {
            table = table.with_column("TransectID", vec![Value::from("T1")]).unwrap();
        }
        table
    }

    fn summary() -> IndexMap<String, FunctionSpec> {
        let mut summary = IndexMap::new();
        summary.insert("TotalCover".to_string(), FunctionSpec::Single(AggFunction::Sum));
        summary.insert("SampleDate".to_string(), FunctionSpec::Single(AggFunction::Count));
        summary
    }

    #[test]
    fn test_regroup_replaces_fine_column_and_widens_sums() {
        let group_by = vec!["Year".to_string(), "SamplingUnitID".to_string()];
        let regrouping = CardinalityPolicy::default()
            .regroup(&group_by, &summary(), &table(true))
            .unwrap();

        assert_eq!(regrouping.group_by, vec!["Year", "SamplePointName", "TransectID"]);
        assert_eq!(regrouping.widened, vec!["TotalCover"]);
        assert_eq!(
            regrouping.summary.get("TotalCover"),
            Some(&FunctionSpec::List(vec![AggFunction::Min, AggFunction::Max]))
        );
        assert_eq!(
            regrouping.summary.get("SampleDate"),
            Some(&FunctionSpec::Single(AggFunction::Count))
        );
    }

    #[test]
    fn test_coarse_columns_not_repeated() {
        let group_by = vec!["SamplePointName".to_string(), "SamplingUnitID".to_string()];
        let regrouping = CardinalityPolicy::default()
            .regroup(&group_by, &summary(), &table(true))
            .unwrap();
        assert_eq!(regrouping.group_by, vec!["SamplePointName", "TransectID"]);
    }

    #[test]
    fn test_no_regroup_without_coarse_columns_or_fine_column() {
        let policy = CardinalityPolicy::default();
        let fine = vec!["SamplingUnitID".to_string()];
        assert!(policy.regroup(&fine, &summary(), &table(false)).is_none());
        let coarse = vec!["SamplePointName".to_string()];
        assert!(policy.regroup(&coarse, &summary(), &table(true)).is_none());
    }

    #[test]
    fn test_policy_from_partial_json() {
        let policy: CardinalityPolicy = serde_json::from_str(r#"{"max_groups": 10}"#).unwrap();
        assert_eq!(policy.max_groups, 10);
        assert_eq!(policy.fine_column, "SamplingUnitID");
        assert!(policy.is_exceeded(11));
        assert!(!policy.is_exceeded(10));
        assert!(policy.validate().is_ok());
    }
}

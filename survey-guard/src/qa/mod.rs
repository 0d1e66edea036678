//! QA annotation of summary tables.
//!
//! The [`QaEngine`] walks a summary's provenance in declared order, looks up
//! the rules that apply to each aggregated column in the rule table, and
//! appends one verdict column per triggered rule. Rules never look at column
//! names to decide what a column is, so running the engine on its own output
//! recomputes the same columns instead of stacking new ones.
//!
//! ```rust
//! use survey_guard::aggregate::{summarize, CardinalityPolicy};
//! use survey_guard::config::{AggFunction, SummaryDef};
//! use survey_guard::diagnostics::Diagnostics;
//! use survey_guard::qa::QaEngine;
//! use survey_guard::table::{Table, Value};
//!
//! let table = Table::new("VegCommunitySurvey")
//!     .with_column("Site", vec![Value::from("A"), Value::from("B")])?
//!     .with_column("PercentCover", vec![Value::from(40.0), Value::from(130.0)])?;
//! let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
//!     .aggregate("PercentCover", AggFunction::Max);
//!
//! let mut diagnostics = Diagnostics::new();
//! let mut summary = summarize("Cover", &def, &table, &CardinalityPolicy::default(), &mut diagnostics)?;
//! QaEngine::default().apply("Cover", &mut summary, &mut diagnostics)?;
//!
//! let qa = summary.table().column(&summary.qa_columns()[0]).unwrap();
//! assert_eq!(qa.values()[1], Value::from("PercentCover_max > 101%"));
//! # Ok::<(), survey_guard::error::QaError>(())
//! ```

mod outliers;
mod rules;
mod verdict;

pub use outliers::{quantile, IqrBounds, Position};
pub use rules::{applicable_rules, RuleInput, RuleKind};
pub use verdict::{qa_column_name, Verdict, CHECKMARK, QA_PREFIX};

use crate::aggregate::SummaryTable;
use crate::config::AggFunction;
use crate::diagnostics::Diagnostics;
use crate::error::{QaError, Result};
use crate::logging::LogConfig;
use crate::table::{Column, DataType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Parameters of the QA rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaSettings {
    /// Largest accepted percent cover; one point above 100 allows for rounding
    pub cover_upper_bound: f64,
    /// Longest survey, in days, between the earliest and latest sample date
    pub max_survey_days: i64,
    /// IQR multiplier for outlier fences
    pub iqr_multiplier: f64,
    /// Column whose record count soil moisture records are compared with
    pub soil_moisture_reference: String,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            cover_upper_bound: 101.0,
            max_survey_days: 7,
            iqr_multiplier: 1.5,
            soil_moisture_reference: "QuadratPlotID".to_string(),
        }
    }
}

impl QaSettings {
    /// Checks that the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if !self.cover_upper_bound.is_finite() || self.cover_upper_bound < 0.0 {
            return Err(QaError::configuration(
                "cover_upper_bound must be a non-negative number",
            ));
        }
        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier < 0.0 {
            return Err(QaError::configuration(
                "iqr_multiplier must be a non-negative number",
            ));
        }
        if self.max_survey_days < 0 {
            return Err(QaError::configuration("max_survey_days must not be negative"));
        }
        Ok(())
    }
}

/// Applies the QA rule table to summary tables.
#[derive(Debug, Clone, Default)]
pub struct QaEngine {
    settings: QaSettings,
    log_config: LogConfig,
}

impl QaEngine {
    /// Creates an engine with the given rule parameters.
    pub fn new(settings: QaSettings) -> Self {
        Self {
            settings,
            log_config: LogConfig::default(),
        }
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Rule parameters.
    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }

    /// Recomputes the QA columns of `summary` in place.
    ///
    /// `name` identifies the summary in diagnostics. Rules that cannot be
    /// evaluated are skipped with a diagnostic.
    #[instrument(skip(self, summary, diagnostics), fields(rows = summary.num_rows()))]
    pub fn apply(&self, name: &str, summary: &mut SummaryTable, diagnostics: &mut Diagnostics) -> Result<()> {
        let columns = self.evaluate(name, summary, diagnostics);
        info!(summary = %name, qa_columns = columns.len(), "Applied QA rules");
        summary.set_qa_columns(columns)
    }

    /// Consumes `summary` and returns it annotated.
    pub fn annotate(
        &self,
        name: &str,
        mut summary: SummaryTable,
        diagnostics: &mut Diagnostics,
    ) -> Result<SummaryTable> {
        self.apply(name, &mut summary, diagnostics)?;
        Ok(summary)
    }

    fn evaluate(&self, name: &str, summary: &SummaryTable, diagnostics: &mut Diagnostics) -> Vec<Column> {
        let provenance = summary.provenance();
        let reference_count = provenance.iter().find(|g| g.function == AggFunction::Count);
        let ctx = rules::RuleContext {
            summary,
            settings: &self.settings,
            scope: name,
        };

        let mut columns: IndexMap<String, Column> = IndexMap::new();
        for generated in provenance {
            let declared: Vec<AggFunction> = provenance
                .iter()
                .filter(|g| g.source == generated.source)
                .map(|g| g.function)
                .collect();
            let data_type = summary
                .table()
                .column(&generated.name)
                .map_or(DataType::Null, Column::data_type);
            let input = RuleInput {
                column: generated,
                data_type,
                declared: &declared,
                reference_count,
            };

            for kind in applicable_rules(&input) {
                crate::log_rule!(
                    self.log_config,
                    column = %generated.name,
                    rule = %kind,
                    "Evaluating QA rule"
                );
                if let Some(column) = rules::evaluate(kind, generated, reference_count, &ctx, diagnostics) {
                    columns.insert(column.name().to_string(), column);
                }
            }
        }
        columns.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, summarize, CardinalityPolicy};
    use crate::config::{FunctionSpec, SummaryDef};
    use crate::diagnostics::DiagnosticKind;
    use crate::table::{Table, Value};
    use chrono::NaiveDate;

    fn survey() -> Table {
        let date = |d| Value::Date(NaiveDate::from_ymd_opt(2025, 4, d).unwrap());
        Table::new("VegCommunitySurvey")
            .with_column(
                "Site",
                vec![
                    Value::from("A"),
                    Value::from("A"),
                    Value::from("B"),
                    Value::from("C"),
                    Value::from("C"),
                ],
            )
            .unwrap()
            .with_column(
                "SamplingUnitID",
                vec![
                    Value::from("U1"),
                    Value::from("U1"),
                    Value::from("U2"),
                    Value::from("U3"),
                    Value::from("U4"),
                ],
            )
            .unwrap()
            .with_column("SampleDate", vec![date(1), date(2), date(3), date(1), date(20)])
            .unwrap()
            .with_column(
                "QuadratPlotID",
                vec![Value::from(1), Value::from(2), Value::from(3), Value::from(4), Value::from(5)],
            )
            .unwrap()
            .with_column(
                "SoilMoisture",
                vec![Value::from(0.2), Value::Null, Value::from(0.3), Value::from(0.1), Value::from(0.4)],
            )
            .unwrap()
    }

    fn effort() -> SummaryDef {
        SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("SamplingUnitID", vec![AggFunction::Count, AggFunction::Nunique])
            .aggregate("SampleDate", vec![AggFunction::Min, AggFunction::Max])
            .aggregate("QuadratPlotID", AggFunction::Count)
            .aggregate("SoilMoisture", AggFunction::Count)
    }

    fn summary(def: &SummaryDef) -> SummaryTable {
        let mut diagnostics = Diagnostics::new();
        summarize("Effort", def, &survey(), &CardinalityPolicy::default(), &mut diagnostics).unwrap()
    }

    fn qa_values<'a>(summary: &'a SummaryTable, title: &str) -> &'a [Value] {
        summary
            .table()
            .column(title)
            .unwrap_or_else(|| panic!("missing QA column {title:?}"))
            .values()
    }

    #[test]
    fn test_nan_cover_reads_missing() {
        let table = Table::new("VegSpeciesAbundance")
            .with_column("Site", vec![Value::from("A"), Value::from("B")])
            .unwrap()
            .with_column("PercentCover", vec![Value::Float(f64::NAN), Value::Float(40.0)])
            .unwrap();
        let mut spec = IndexMap::new();
        spec.insert("PercentCover".to_string(), FunctionSpec::Single(AggFunction::Max));
        let mut diagnostics = Diagnostics::new();
        let mut summary =
            aggregate("Cover", &table, &["Site".to_string()], &spec, &mut diagnostics).unwrap();
        QaEngine::default().apply("Cover", &mut summary, &mut diagnostics).unwrap();

        assert_eq!(
            qa_values(&summary, "QA Check\nPercentCover_max\nrange 0-101%"),
            &[Value::from("PercentCover_max missing"), Value::from(CHECKMARK)]
        );
    }

    #[test]
    fn test_effort_summary_annotations() {
        let mut summary = summary(&effort());
        let mut diagnostics = Diagnostics::new();
        QaEngine::default().apply("Effort", &mut summary, &mut diagnostics).unwrap();

        assert!(summary.qa_columns().iter().all(|c| c.starts_with(QA_PREFIX)));
        assert_eq!(
            qa_values(&summary, "QA Check\nSamplingUnitID\nunique = records"),
            &[Value::from("mismatched"), Value::from(CHECKMARK), Value::from(CHECKMARK)]
        );
        assert_eq!(
            qa_values(&summary, "QA Check\nSampleDate\nsurvey length <= 7 days"),
            &[
                Value::from(CHECKMARK),
                Value::from(CHECKMARK),
                Value::from("long survey (19 days)")
            ]
        );
        assert_eq!(
            qa_values(&summary, "QA Check\nQuadratPlotID_records\n= SamplingUnitID_records"),
            &[Value::from(CHECKMARK), Value::from(CHECKMARK), Value::from(CHECKMARK)]
        );
        assert_eq!(
            qa_values(&summary, "QA Check\nSoilMoisture records\nvs QuadratPlotID records"),
            &[Value::from("mismatched"), Value::from(CHECKMARK), Value::from(CHECKMARK)]
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let engine = QaEngine::default();
        let mut diagnostics = Diagnostics::new();

        let first = engine.annotate("Effort", summary(&effort()), &mut diagnostics).unwrap();
        let second = engine.annotate("Effort", first.clone(), &mut diagnostics).unwrap();
        assert_eq!(first, second);

        let again = engine.annotate("Effort", summary(&effort()), &mut diagnostics).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_missing_siblings_are_diagnosed() {
        let def = SummaryDef::new("VegCommunitySurvey", ["Site"])
            .aggregate("SampleDate", AggFunction::Max)
            .aggregate("SoilMoisture", AggFunction::Count);
        let mut summary = summary(&def);
        let mut diagnostics = Diagnostics::new();
        QaEngine::default().apply("Effort", &mut summary, &mut diagnostics).unwrap();

        assert_eq!(diagnostics.of_kind(DiagnosticKind::QaRule).count(), 2);
        assert!(!summary
            .qa_columns()
            .iter()
            .any(|c| c.contains("survey length") || c.contains("vs QuadratPlotID")));
    }

    #[test]
    fn test_outlier_column_for_count() {
        let table = Table::new("VegSpeciesAbundance")
            .with_column(
                "Site",
                (0..5).map(|i| Value::from(format!("S{i}"))).collect(),
            )
            .unwrap()
            .with_column("Count", vec![1, 1, 1, 1, 100].into_iter().map(Value::from).collect())
            .unwrap();
        let mut spec = IndexMap::new();
        spec.insert("Count".to_string(), FunctionSpec::Single(AggFunction::Sum));
        let mut diagnostics = Diagnostics::new();
        let mut summary =
            aggregate("Abundance", &table, &["Site".to_string()], &spec, &mut diagnostics).unwrap();
        QaEngine::default().apply("Abundance", &mut summary, &mut diagnostics).unwrap();

        assert_eq!(summary.qa_columns(), &["QA Check\nCount_sum\noutliers IQR\n[1.0, 1.0]"]);
        let verdicts = qa_values(&summary, &summary.qa_columns()[0]);
        assert_eq!(verdicts[4], Value::from("high Count_sum"));
        assert!(verdicts[..4].iter().all(|v| *v == Value::from(CHECKMARK)));
    }

    #[test]
    fn test_settings_validation() {
        assert!(QaSettings::default().validate().is_ok());
        let bad = QaSettings {
            iqr_multiplier: f64::NAN,
            ..QaSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}

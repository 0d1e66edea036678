//! The QA rule table.
//!
//! Each entry pairs a [`RuleKind`] with a predicate over one aggregated
//! column's provenance and type. The engine evaluates the table once per
//! aggregated column in declared order; a column may trigger several rules.

use super::outliers::{IqrBounds, Position};
use super::verdict::{qa_column_name, Verdict};
use super::QaSettings;
use crate::aggregate::{GeneratedColumn, SummaryTable};
use crate::config::AggFunction;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::table::{Column, DataType, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::debug;

// Patterns are compile-time constants and known to be valid.
#[allow(clippy::expect_used)]
static COVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cover").expect("valid pattern"));
#[allow(clippy::expect_used)]
static SOIL_MOISTURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)soil[\s_]*moisture").expect("valid pattern"));
#[allow(clippy::expect_used)]
static SPECIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(scientific[\s_]*name|species|taxon)").expect("valid pattern")
});
#[allow(clippy::expect_used)]
static DATE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"Date|^date$").expect("valid pattern"));

/// The QA checks the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Percent cover within `0..=upper bound`
    CoverRange,
    /// Maximum of a non-cover measure above zero
    PositiveMax,
    /// Survey spread between earliest and latest date
    DateRange,
    /// Record count equals distinct count for the same column
    CountVsNunique,
    /// Record count equals the first declared record count
    CountConsistency,
    /// Soil moisture records equal plot records
    SoilMoisture,
    /// Value inside the IQR fences of its column
    Outlier,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::CoverRange => "cover range",
            RuleKind::PositiveMax => "positive max",
            RuleKind::DateRange => "date range",
            RuleKind::CountVsNunique => "count vs nunique",
            RuleKind::CountConsistency => "count consistency",
            RuleKind::SoilMoisture => "soil moisture count",
            RuleKind::Outlier => "IQR outliers",
        };
        f.write_str(name)
    }
}

/// What a rule predicate sees about one aggregated column.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    /// The aggregated column
    pub column: &'a GeneratedColumn,
    /// Its data type in the summary table
    pub data_type: DataType,
    /// Every function declared for the same source column
    pub declared: &'a [AggFunction],
    /// The first declared `count` column of the summary
    pub reference_count: Option<&'a GeneratedColumn>,
}

struct RuleDef {
    kind: RuleKind,
    applies: fn(&RuleInput<'_>) -> bool,
}

fn numeric_or_empty(data_type: DataType) -> bool {
    data_type.is_numeric() || data_type == DataType::Null
}

const RULES: &[RuleDef] = &[
    RuleDef {
        kind: RuleKind::CoverRange,
        applies: |input| {
            matches!(
                input.column.function,
                AggFunction::Sum | AggFunction::Max | AggFunction::Min
            ) && COVER.is_match(&input.column.source)
                && numeric_or_empty(input.data_type)
        },
    },
    RuleDef {
        kind: RuleKind::PositiveMax,
        applies: |input| {
            input.column.function == AggFunction::Max
                && !COVER.is_match(&input.column.source)
                && numeric_or_empty(input.data_type)
        },
    },
    RuleDef {
        kind: RuleKind::DateRange,
        applies: |input| input.column.function == AggFunction::Max && input.data_type == DataType::Date,
    },
    RuleDef {
        kind: RuleKind::CountVsNunique,
        applies: |input| {
            input.column.function == AggFunction::Count
                && input.declared.contains(&AggFunction::Nunique)
        },
    },
    RuleDef {
        kind: RuleKind::CountConsistency,
        applies: |input| {
            input.column.function == AggFunction::Count
                && input
                    .reference_count
                    .is_some_and(|reference| reference.source != input.column.source)
        },
    },
    RuleDef {
        kind: RuleKind::SoilMoisture,
        applies: |input| {
            input.column.function == AggFunction::Count && SOIL_MOISTURE.is_match(&input.column.source)
        },
    },
    RuleDef {
        kind: RuleKind::Outlier,
        applies: |input| match input.column.function {
            AggFunction::Count | AggFunction::Sum | AggFunction::Mean => true,
            AggFunction::Nunique => {
                SPECIES.is_match(&input.column.source) || DATE_NAME.is_match(&input.column.source)
            }
            _ => false,
        },
    },
];

/// Rules that apply to `input`, in evaluation order.
pub fn applicable_rules(input: &RuleInput<'_>) -> Vec<RuleKind> {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(input))
        .map(|rule| rule.kind)
        .collect()
}

/// Everything a rule needs to produce its column.
pub(crate) struct RuleContext<'a> {
    pub summary: &'a SummaryTable,
    pub settings: &'a QaSettings,
    pub scope: &'a str,
}

impl RuleContext<'_> {
    fn values(&self, column: &GeneratedColumn) -> Option<&[Value]> {
        self.summary.table().column(&column.name).map(Column::values)
    }

    fn sibling(&self, column: &GeneratedColumn, function: AggFunction) -> Option<&GeneratedColumn> {
        self.summary.generated(&column.source, function)
    }
}

/// Label used in verdicts: `{source}_{function}`, with `count` shown as `records`.
fn label(column: &GeneratedColumn) -> String {
    format!("{}_{}", column.source, column.function.display_name())
}

/// Evaluates `kind` for `column`.
///
/// Returns `None`, after recording a diagnostic where useful, when the rule
/// cannot be evaluated.
pub(crate) fn evaluate(
    kind: RuleKind,
    column: &GeneratedColumn,
    reference_count: Option<&GeneratedColumn>,
    ctx: &RuleContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<Column> {
    let values = ctx.values(column)?;
    match kind {
        RuleKind::CoverRange => Some(cover_range(column, values, ctx.settings)),
        RuleKind::PositiveMax => Some(positive_max(column, values)),
        RuleKind::DateRange => {
            let Some(min) = ctx.sibling(column, AggFunction::Min).and_then(|m| ctx.values(m)) else {
                diagnostics.warn(
                    DiagnosticKind::QaRule,
                    ctx.scope,
                    format!(
                        "{kind} check for '{}' needs a 'min' aggregation of the same column; skipped",
                        column.source
                    ),
                );
                return None;
            };
            Some(date_range(column, min, values, ctx.settings))
        }
        RuleKind::CountVsNunique => {
            let nunique = ctx.sibling(column, AggFunction::Nunique)?;
            let other = ctx.values(nunique)?;
            let title = qa_column_name(&[&column.source, "unique = records"]);
            Some(equality(title, values, other))
        }
        RuleKind::CountConsistency => {
            let reference = reference_count?;
            let other = ctx.values(reference)?;
            let title = qa_column_name(&[&label(column), &format!("= {}", label(reference))]);
            Some(equality(title, values, other))
        }
        RuleKind::SoilMoisture => {
            let reference = &ctx.settings.soil_moisture_reference;
            let Some(other) = ctx
                .summary
                .generated(reference, AggFunction::Count)
                .and_then(|r| ctx.values(r))
            else {
                diagnostics.warn(
                    DiagnosticKind::QaRule,
                    ctx.scope,
                    format!(
                        "{kind} check for '{}' needs a count of '{reference}'; skipped",
                        column.source
                    ),
                );
                return None;
            };
            let title = qa_column_name(&[
                &format!("{} records", column.source),
                &format!("vs {reference} records"),
            ]);
            Some(equality(title, values, other))
        }
        RuleKind::Outlier => {
            let data_type = ctx
                .summary
                .table()
                .column(&column.name)
                .map_or(DataType::Null, Column::data_type);
            let Some(bounds) = IqrBounds::from_values(values, ctx.settings.iqr_multiplier) else {
                debug!(column = %column.name, "No numeric values for outlier bounds");
                return None;
            };
            Some(outliers(column, values, &bounds, data_type.is_integer()))
        }
    }
}

fn verdict_column(title: String, verdicts: impl Iterator<Item = Verdict>) -> Column {
    Column::coerced(title, verdicts.map(Value::from).collect())
}

fn cover_range(column: &GeneratedColumn, values: &[Value], settings: &QaSettings) -> Column {
    let label = label(column);
    let upper = settings.cover_upper_bound;
    let title = qa_column_name(&[&label, &format!("range 0-{upper}%")]);
    verdict_column(
        title,
        values.iter().map(|v| match v.as_f64() {
            None => Verdict::flag(format!("{label} missing")),
            Some(x) if x < 0.0 => Verdict::flag(format!("{label} negative")),
            Some(x) if x > upper => Verdict::flag(format!("{label} > {upper}%")),
            Some(x) if x == 0.0 && column.function == AggFunction::Max => {
                Verdict::flag(format!("{label} is 0"))
            }
            Some(_) => Verdict::Pass,
        }),
    )
}

fn positive_max(column: &GeneratedColumn, values: &[Value]) -> Column {
    let label = label(column);
    let title = qa_column_name(&[&label, "max > 0"]);
    verdict_column(
        title,
        values.iter().map(|v| match v.as_f64() {
            None => Verdict::flag("missing"),
            Some(x) if x > 0.0 => Verdict::Pass,
            Some(x) if x == 0.0 => Verdict::flag(format!("{label} is 0")),
            Some(_) => Verdict::Empty,
        }),
    )
}

fn date_range(column: &GeneratedColumn, min: &[Value], max: &[Value], settings: &QaSettings) -> Column {
    let limit = settings.max_survey_days;
    let title = qa_column_name(&[&column.source, &format!("survey length <= {limit} days")]);
    verdict_column(
        title,
        min.iter().zip(max).map(|(lo, hi)| match (lo.as_date(), hi.as_date()) {
            (Some(lo), Some(hi)) => {
                let days = (hi - lo).num_days();
                Verdict::check(days <= limit, format!("long survey ({days} days)"))
            }
            _ => Verdict::flag("missing"),
        }),
    )
}

fn equality(title: String, values: &[Value], reference: &[Value]) -> Column {
    verdict_column(
        title,
        values
            .iter()
            .zip(reference)
            .map(|(a, b)| Verdict::check(!a.is_null() && a == b, "mismatched")),
    )
}

fn outliers(column: &GeneratedColumn, values: &[Value], bounds: &IqrBounds, integer: bool) -> Column {
    let label = label(column);
    let title = qa_column_name(&[&label, "outliers IQR", &bounds.label(integer)]);
    let is_count = column.function == AggFunction::Count;
    verdict_column(
        title,
        values.iter().map(|v| match v.as_f64() {
            None => Verdict::flag("no data"),
            Some(x) if is_count && x == 0.0 => Verdict::flag("no data"),
            Some(x) => match bounds.position(x) {
                Position::High => Verdict::flag(format!("high {label}")),
                Position::Low => Verdict::flag(format!("low {label}")),
                Position::Within => Verdict::Pass,
            },
        }),
    )
}

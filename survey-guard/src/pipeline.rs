//! End-to-end summary runs.
//!
//! A [`SummaryPipeline`] joins the workbook once, then filters, summarizes and
//! QA-annotates every configured summary in declared order. A summary that
//! fails is recorded in [`PipelineRun::failures`] and the run continues with
//! the next one.

use crate::aggregate::{summarize, SummaryTable};
use crate::config::{PipelineConfig, SummaryDef};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{QaError, Result};
use crate::filter::apply_filter;
use crate::join::join_tables;
use crate::logging::LogConfig;
use crate::log_table_op;
use crate::qa::QaEngine;
use crate::table::{self, Table, Workbook};
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{error, info, instrument};

/// One computed summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    /// Table the summary was computed from
    pub source: String,
    /// Annotated summary
    pub summary: SummaryTable,
    /// Guidance text from the definition
    pub note: Option<String>,
}

/// A summary that could not be computed.
#[derive(Debug)]
pub struct SummaryFailure {
    /// Summary name
    pub name: String,
    /// Why it failed
    pub error: QaError,
}

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct PipelineRun {
    joined: Workbook,
    summaries: IndexMap<String, SummaryOutput>,
    failures: Vec<SummaryFailure>,
    diagnostics: Diagnostics,
    elapsed_ms: u64,
}

impl PipelineRun {
    /// Input tables after joins.
    pub fn joined(&self) -> &Workbook {
        &self.joined
    }

    /// Computed summaries in declared order.
    pub fn summaries(&self) -> &IndexMap<String, SummaryOutput> {
        &self.summaries
    }

    /// Looks up a computed summary by name.
    pub fn summary(&self, name: &str) -> Option<&SummaryTable> {
        self.summaries.get(name).map(|output| &output.summary)
    }

    /// Summaries that failed.
    pub fn failures(&self) -> &[SummaryFailure] {
        &self.failures
    }

    /// Diagnostics in the order they were raised.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Wall-clock duration of the run.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Returns true when no summary failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Resolves a plot data source: joined tables first, then summaries.
    pub fn data_source(&self, name: &str) -> Option<&Table> {
        self.joined
            .get(name)
            .or_else(|| self.summary(name).map(SummaryTable::table))
    }
}

/// Runs the configured joins and summaries over a workbook.
///
/// # Examples
///
/// ```rust
/// use survey_guard::config::{AggFunction, PipelineConfig, SummaryDef};
/// use survey_guard::pipeline::SummaryPipeline;
/// use survey_guard::table::{Table, Value, Workbook};
///
/// let config = PipelineConfig::new().with_summary(
///     "Cover by site",
///     SummaryDef::new("VegCommunitySurvey", ["Site"])
///         .aggregate("PercentCover", vec![AggFunction::Min, AggFunction::Max]),
/// );
///
/// let mut workbook = Workbook::new();
/// workbook.insert(
///     "VegCommunitySurvey".to_string(),
///     Table::new("VegCommunitySurvey")
///         .with_column("Site", vec![Value::from("A"), Value::from("B")])?
///         .with_column("PercentCover", vec![Value::from(40), Value::from(120)])?,
/// );
///
/// let run = SummaryPipeline::new(config)?.run(&workbook);
/// assert!(run.is_success());
///
/// let summary = run.summary("Cover by site").unwrap();
/// let check = "QA Check\nPercentCover_max\nrange 0-101%";
/// assert_eq!(summary.table().value(1, check), Some(&Value::from("PercentCover_max > 101%")));
/// # Ok::<(), survey_guard::error::QaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SummaryPipeline {
    config: PipelineConfig,
    qa: QaEngine,
    log_config: LogConfig,
}

impl SummaryPipeline {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let qa = QaEngine::new(config.engine.qa.clone());
        Ok(Self {
            config,
            qa,
            log_config: LogConfig::default(),
        })
    }

    /// Sets the logging configuration for this pipeline and its QA engine.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.qa = self.qa.with_log_config(log_config.clone());
        self.log_config = log_config;
        self
    }

    /// The configuration being run.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every join and summary over `tables`.
    #[instrument(skip(self, tables), fields(
        tables = tables.len(),
        joins = self.config.joins.len(),
        summaries = self.config.summaries.len()
    ))]
    pub fn run(&self, tables: &Workbook) -> PipelineRun {
        let start_time = Instant::now();
        let mut diagnostics = Diagnostics::new();

        let joined = join_tables(tables, &self.config.joins, &mut diagnostics);

        let mut summaries = IndexMap::new();
        let mut failures = Vec::new();
        for (name, def) in self.config.summaries.iter() {
            match self.run_summary(name, def, &joined, &mut diagnostics) {
                Ok(Some(output)) => {
                    summaries.insert(name.clone(), output);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(summary = %name, error = %e, "Summary failed");
                    failures.push(SummaryFailure {
                        name: name.to_string(),
                        error: e,
                    });
                }
            }
        }

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            summaries = summaries.len(),
            failures = failures.len(),
            warnings = diagnostics.warning_count(),
            elapsed_ms,
            "Summary pipeline completed"
        );

        PipelineRun {
            joined,
            summaries,
            failures,
            diagnostics,
            elapsed_ms,
        }
    }

    fn run_summary(
        &self,
        name: &str,
        def: &SummaryDef,
        joined: &Workbook,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<SummaryOutput>> {
        let table = match table::lookup(joined, &def.table) {
            Ok(table) => table,
            Err(e) => {
                diagnostics.warn(DiagnosticKind::Summary, name, format!("{e}; summary skipped"));
                return Ok(None);
            }
        };

        let filtered;
        let input = match &def.filter {
            Some(spec) if !spec.is_empty() => {
                filtered = apply_filter(spec, table, name, diagnostics);
                log_table_op!(
                    self.log_config,
                    summary = %name,
                    table = %def.table,
                    before = table.num_rows(),
                    after = filtered.num_rows(),
                    "Filtered summary input"
                );
                &filtered
            }
            _ => table,
        };

        let summary = summarize(name, def, input, &self.config.engine.cardinality, diagnostics)?;
        let summary = self.qa.annotate(name, summary, diagnostics)?;
        log_table_op!(
            self.log_config,
            summary = %name,
            rows = summary.num_rows(),
            qa_columns = summary.qa_columns().len(),
            "Computed summary"
        );

        Ok(Some(SummaryOutput {
            source: def.table.clone(),
            summary,
            note: def.note.clone(),
        }))
    }
}

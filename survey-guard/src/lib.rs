//! # survey-guard
//!
//! Config-driven summaries of survey tables with automatic QA annotation.
//!
//! survey-guard takes the sheets of a survey workbook as in-memory tables,
//! joins related tables, and computes grouped summaries described in a JSON
//! configuration. Every summary is then annotated with "QA Check" columns whose
//! rules are picked from what each column is: a sum of percent cover gets a
//! range check, a pair of `count` and `nunique` columns gets a mismatch check,
//! counts and sums get outlier checks against their interquartile range.
//!
//! ## Quick Start
//!
//! ```rust
//! use survey_guard::prelude::*;
//!
//! let config = PipelineConfig::from_json_str(r#"{
//!     "joins": {
//!         "VegCommunitySurvey": {"right": "VegSamplingUnits", "on": ["SamplingUnitID"], "how": "left"}
//!     },
//!     "summaries": {
//!         "Survey effort": {
//!             "table": "VegCommunitySurvey",
//!             "group_by": ["SamplePointName"],
//!             "summary": {"SamplingUnitID": ["count", "nunique"]}
//!         }
//!     }
//! }"#)?;
//!
//! let mut workbook = Workbook::new();
//! workbook.insert(
//!     "VegCommunitySurvey".to_string(),
//!     Table::new("VegCommunitySurvey")
//!         .with_column("SamplingUnitID", vec![Value::from("SU1"), Value::from("SU1"), Value::from("SU2")])?,
//! );
//! workbook.insert(
//!     "VegSamplingUnits".to_string(),
//!     Table::new("VegSamplingUnits")
//!         .with_column("SamplingUnitID", vec![Value::from("SU1"), Value::from("SU2")])?
//!         .with_column("SamplePointName", vec![Value::from("P1"), Value::from("P2")])?,
//! );
//!
//! let run = SummaryPipeline::new(config)?.run(&workbook);
//! let effort = run.summary("Survey effort").unwrap();
//!
//! // P1 has two records of a single sampling unit.
//! let check = "QA Check\nSamplingUnitID\nunique = records";
//! assert_eq!(effort.table().value(0, check), Some(&Value::from("mismatched")));
//! assert_eq!(effort.table().value(1, check), Some(&Value::from("\u{2713}")));
//! # Ok::<(), survey_guard::error::QaError>(())
//! ```
//!
//! ## Modules
//!
//! - [`table`]: typed columnar tables and Arrow interop
//! - [`workbook`]: date windows and group splitting before a run
//! - [`join`], [`filter`], [`aggregate`]: the summary stages
//! - [`qa`]: the QA rule table and IQR outlier bounds
//! - [`pipeline`]: runs all of the above from a [`config::PipelineConfig`]
//! - [`palette`]: stable colors for categorical plot series
//!
//! Recoverable problems never abort a run; they are collected as
//! [`diagnostics::Diagnostic`]s and logged through `tracing`. See
//! [`logging::setup::init_logging`] to install a subscriber.

pub mod aggregate;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod join;
pub mod logging;
pub mod palette;
pub mod pipeline;
pub mod prelude;
pub mod qa;
pub mod table;
pub mod workbook;

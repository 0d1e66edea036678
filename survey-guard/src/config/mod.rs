//! Pipeline configuration.
//!
//! A configuration document has an ordered `joins` object keyed by the left
//! table, an ordered `summaries` object keyed by summary name, and an optional
//! `engine` section with tuning parameters:
//!
//! ```json
//! {
//!   "joins": {
//!     "VegCommunitySurvey": {"right": "VegSamplingUnits", "on": ["SamplingUnitID"], "how": "left"}
//!   },
//!   "summaries": {
//!     "Survey effort": {
//!       "table": "VegCommunitySurvey",
//!       "group_by": ["Year", "SamplePointName"],
//!       "summary": {"SampleDate": ["min", "max"], "SamplingUnitID": ["count", "nunique"]}
//!     }
//!   }
//! }
//! ```
//!
//! Unknown aggregation functions and malformed definitions are rejected when the
//! document is loaded. Problems that depend on the data (missing tables,
//! unknown filter operators) are reported later as diagnostics.

mod filter;
mod join;
mod summary;

pub use filter::{FilterCondition, FilterSpec, Predicate};
pub use join::{JoinSpec, JoinTarget, JoinType};
pub use summary::{AggFunction, FunctionSpec, SummaryDef};

use crate::aggregate::CardinalityPolicy;
use crate::error::{QaError, Result};
use crate::qa::QaSettings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

/// Tuning parameters for the aggregation and QA stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// High-cardinality detection and remediation
    pub cardinality: CardinalityPolicy,
    /// QA rule parameters
    pub qa: QaSettings,
}

/// A validated pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPipelineConfig", into = "RawPipelineConfig")]
pub struct PipelineConfig {
    /// Joins in declared order
    pub joins: Vec<JoinSpec>,
    /// Summaries in declared order; this order is the output order
    pub summaries: IndexMap<String, SummaryDef>,
    /// Engine parameters
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPipelineConfig {
    #[serde(default)]
    joins: IndexMap<String, JoinTarget>,
    #[serde(default)]
    summaries: IndexMap<String, SummaryDef>,
    #[serde(default)]
    engine: EngineSettings,
}

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = QaError;

    fn try_from(raw: RawPipelineConfig) -> Result<Self> {
        let config = Self {
            joins: raw
                .joins
                .into_iter()
                .map(|(left, target)| JoinSpec::from_target(left, target))
                .collect(),
            summaries: raw.summaries,
            engine: raw.engine,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<PipelineConfig> for RawPipelineConfig {
    fn from(config: PipelineConfig) -> Self {
        Self {
            joins: config
                .joins
                .iter()
                .map(|spec| (spec.left.clone(), spec.target()))
                .collect(),
            summaries: config.summaries,
            engine: config.engine,
        }
    }
}

impl PipelineConfig {
    /// Creates an empty configuration with default engine settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a join. A later join with the same left table replaces the earlier one.
    pub fn with_join(mut self, spec: JoinSpec) -> Self {
        match self.joins.iter_mut().find(|j| j.left == spec.left) {
            Some(existing) => *existing = spec,
            None => self.joins.push(spec),
        }
        self
    }

    /// Adds a summary definition. Re-adding a name keeps its position.
    pub fn with_summary(mut self, name: impl Into<String>, def: SummaryDef) -> Self {
        self.summaries.insert(name.into(), def);
        self
    }

    /// Replaces the engine settings.
    pub fn with_engine(mut self, engine: EngineSettings) -> Self {
        self.engine = engine;
        self
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads, parses and validates a JSON configuration file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&contents)?;
        debug!(
            joins = config.joins.len(),
            summaries = config.summaries.len(),
            "Loaded pipeline configuration"
        );
        Ok(config)
    }

    /// Checks every join and summary definition.
    pub fn validate(&self) -> Result<()> {
        for spec in &self.joins {
            if spec.on.is_empty() {
                return Err(QaError::configuration(format!(
                    "join of '{}' onto '{}' has no key columns",
                    spec.right, spec.left
                )));
            }
        }
        for (name, def) in self.summaries.iter() {
            def.validate(name)?;
        }
        self.engine.cardinality.validate()?;
        self.engine.qa.validate()
    }
}

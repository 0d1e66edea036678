//! Prelude for commonly used types in survey-guard.

pub use crate::aggregate::{summarize, CardinalityPolicy, SummaryTable};
pub use crate::config::{
    AggFunction, FilterSpec, FunctionSpec, JoinSpec, JoinType, PipelineConfig, Predicate,
    SummaryDef,
};
pub use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use crate::error::{QaError, Result};
pub use crate::logging::LogConfig;
pub use crate::pipeline::{PipelineRun, SummaryPipeline};
pub use crate::qa::{QaEngine, QaSettings, Verdict};
pub use crate::table::{Column, DataType, Table, Value, Workbook};

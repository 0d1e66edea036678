//! Join definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of joins supported between workbook tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// Inner join - only rows that match in both tables
    Inner,
    /// Left join - all rows from left table, matching rows from right
    Left,
    /// Right join - all rows from right table, matching rows from left
    Right,
    /// Full outer join - all rows from both tables
    #[serde(alias = "full")]
    Outer,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
        };
        f.write_str(name)
    }
}

/// The right-hand side of a join, as written in configuration under the left
/// table's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTarget {
    /// Table joined onto the left table
    pub right: String,
    /// Key columns present in both tables
    pub on: Vec<String>,
    /// Join type
    pub how: JoinType,
}

/// A join of `right` onto `left` by the `on` columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Table being enriched; its name keys the joined result
    pub left: String,
    /// Table joined onto `left`
    pub right: String,
    /// Key columns present in both tables
    pub on: Vec<String>,
    /// Join type
    pub how: JoinType,
}

impl JoinSpec {
    /// Creates a join specification.
    pub fn new<I, S>(left: impl Into<String>, right: impl Into<String>, on: I, how: JoinType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            left: left.into(),
            right: right.into(),
            on: on.into_iter().map(Into::into).collect(),
            how,
        }
    }

    /// Builds the spec from a configuration entry keyed by the left table.
    pub fn from_target(left: impl Into<String>, target: JoinTarget) -> Self {
        Self {
            left: left.into(),
            right: target.right,
            on: target.on,
            how: target.how,
        }
    }

    /// The configuration entry for this spec, without the left table name.
    pub fn target(&self) -> JoinTarget {
        JoinTarget {
            right: self.right.clone(),
            on: self.on.clone(),
            how: self.how,
        }
    }
}

impl fmt::Display for JoinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} join {} on [{}]",
            self.left,
            self.how,
            self.right,
            self.on.join(", ")
        )
    }
}

//! QA verdict values.

use crate::table::Value;
use std::fmt;

/// Verdict text for a passing row.
pub const CHECKMARK: &str = "\u{2713}";

/// Prefix shared by every QA column name.
pub const QA_PREFIX: &str = "QA Check\n";

/// The outcome of one rule for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The row passes
    Pass,
    /// The row is flagged with a message
    Flag(String),
    /// The rule has nothing to say about the row
    Empty,
}

impl Verdict {
    /// Creates a flag.
    pub fn flag(message: impl Into<String>) -> Self {
        Verdict::Flag(message.into())
    }

    /// Passes when `ok`, otherwise flags with `message`.
    pub fn check(ok: bool, message: impl Into<String>) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::flag(message)
        }
    }

    /// Returns true for [`Verdict::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Verdict text as stored in a QA column.
    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Pass => CHECKMARK,
            Verdict::Flag(message) => message,
            Verdict::Empty => "",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Verdict> for Value {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Flag(message) => Value::Str(message),
            other => Value::from(other.as_str()),
        }
    }
}

/// Builds a QA column name from its title lines.
pub fn qa_column_name(lines: &[&str]) -> String {
    format!("{QA_PREFIX}{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_values() {
        assert_eq!(Value::from(Verdict::Pass), Value::from("\u{2713}"));
        assert_eq!(Value::from(Verdict::flag("mismatched")), Value::from("mismatched"));
        assert_eq!(Value::from(Verdict::Empty), Value::from(""));
        assert!(Verdict::check(true, "unused").is_pass());
        assert_eq!(Verdict::check(false, "mismatched").to_string(), "mismatched");
    }

    #[test]
    fn test_qa_column_name() {
        assert_eq!(
            qa_column_name(&["SampleDate", "unique = records"]),
            "QA Check\nSampleDate\nunique = records"
        );
    }
}

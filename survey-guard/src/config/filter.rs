//! Declarative row filters.
//!
//! A filter is written as a JSON object mapping a column to either a sentinel
//! string or an object of operator-value pairs:
//!
//! ```json
//! {
//!   "TransectID": "is not null",
//!   "Year": {">": 2020, "<": 2026},
//!   "Stratum": {"not in": ["Ground", "Emergent"]}
//! }
//! ```
//!
//! Anything the engine does not understand is kept as an `Unsupported` entry
//! so it can be reported when the filter is applied instead of failing the
//! whole configuration.

use crate::table::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One operator-value comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column < value`
    LessThan(Value),
    /// `column > value`
    GreaterThan(Value),
    /// `column == value`
    Equals(Value),
    /// `column != value`
    NotEquals(Value),
    /// `column` is one of the values
    In(Vec<Value>),
    /// `column` is none of the values
    NotIn(Vec<Value>),
    /// An operator or operand the engine cannot evaluate
    Unsupported {
        /// Operator as written
        operator: String,
        /// Why it cannot be evaluated
        reason: String,
    },
}

impl Predicate {
    /// Operator as written in configuration.
    pub fn operator(&self) -> &str {
        match self {
            Predicate::LessThan(_) => "<",
            Predicate::GreaterThan(_) => ">",
            Predicate::Equals(_) => "==",
            Predicate::NotEquals(_) => "!=",
            Predicate::In(_) => "in",
            Predicate::NotIn(_) => "not in",
            Predicate::Unsupported { operator, .. } => operator,
        }
    }

    fn parse(operator: &str, operand: &JsonValue) -> Self {
        let unsupported = |reason: &str| Predicate::Unsupported {
            operator: operator.to_string(),
            reason: reason.to_string(),
        };
        match operator {
            "<" | ">" | "==" | "!=" => match literal(operand) {
                Some(value) => match operator {
                    "<" => Predicate::LessThan(value),
                    ">" => Predicate::GreaterThan(value),
                    "==" => Predicate::Equals(value),
                    _ => Predicate::NotEquals(value),
                },
                None => unsupported("operand must be a number, string or null"),
            },
            "in" | "not in" => {
                let values = operand
                    .as_array()
                    .map(|items| items.iter().map(literal).collect::<Option<Vec<_>>>());
                match values {
                    Some(Some(values)) if operator == "in" => Predicate::In(values),
                    Some(Some(values)) => Predicate::NotIn(values),
                    _ => unsupported("operand must be a list of numbers or strings"),
                }
            }
            _ => unsupported("unknown operator"),
        }
    }

    fn to_json(&self) -> (String, JsonValue) {
        let operand = match self {
            Predicate::LessThan(v)
            | Predicate::GreaterThan(v)
            | Predicate::Equals(v)
            | Predicate::NotEquals(v) => to_json_literal(v),
            Predicate::In(vs) | Predicate::NotIn(vs) => {
                JsonValue::Array(vs.iter().map(to_json_literal).collect())
            }
            Predicate::Unsupported { .. } => JsonValue::Null,
        };
        (self.operator().to_string(), operand)
    }
}

/// The condition applied to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Keep rows where the column is missing
    IsNull,
    /// Keep rows where the column is present
    IsNotNull,
    /// Keep rows satisfying every predicate
    Predicates(Vec<Predicate>),
    /// A condition of a shape the engine cannot evaluate
    Unsupported(String),
}

impl FilterCondition {
    fn parse(raw: &JsonValue) -> Self {
        match raw {
            JsonValue::String(s) if s.trim().eq_ignore_ascii_case("is null") => FilterCondition::IsNull,
            JsonValue::String(s) if s.trim().eq_ignore_ascii_case("is not null") => {
                FilterCondition::IsNotNull
            }
            JsonValue::Object(ops) => FilterCondition::Predicates(
                ops.iter().map(|(op, operand)| Predicate::parse(op, operand)).collect(),
            ),
            other => FilterCondition::Unsupported(other.to_string()),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            FilterCondition::IsNull => JsonValue::String("is null".to_string()),
            FilterCondition::IsNotNull => JsonValue::String("is not null".to_string()),
            FilterCondition::Predicates(predicates) => {
                JsonValue::Object(predicates.iter().map(Predicate::to_json).collect())
            }
            FilterCondition::Unsupported(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.clone()))
            }
        }
    }
}

/// Per-column filter conditions in declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "IndexMap<String, JsonValue>",
    into = "IndexMap<String, JsonValue>"
)]
pub struct FilterSpec {
    terms: IndexMap<String, FilterCondition>,
}

impl FilterSpec {
    /// Creates an empty filter that keeps every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the condition on `column`, replacing an earlier one in place.
    pub fn with(mut self, column: impl Into<String>, condition: FilterCondition) -> Self {
        self.terms.insert(column.into(), condition);
        self
    }

    /// Keeps rows where `column` is missing.
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.with(column, FilterCondition::IsNull)
    }

    /// Keeps rows where `column` is present.
    pub fn is_not_null(self, column: impl Into<String>) -> Self {
        self.with(column, FilterCondition::IsNotNull)
    }

    /// Keeps rows satisfying `predicate` on `column`.
    pub fn predicate(self, column: impl Into<String>, predicate: Predicate) -> Self {
        self.with(column, FilterCondition::Predicates(vec![predicate]))
    }

    /// Conditions keyed by column, in order.
    pub fn terms(&self) -> &IndexMap<String, FilterCondition> {
        &self.terms
    }

    /// Returns true when the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl From<IndexMap<String, JsonValue>> for FilterSpec {
    fn from(raw: IndexMap<String, JsonValue>) -> Self {
        Self {
            terms: raw
                .into_iter()
                .map(|(column, condition)| {
                    let condition = FilterCondition::parse(&condition);
                    (column, condition)
                })
                .collect(),
        }
    }
}

impl From<FilterSpec> for IndexMap<String, JsonValue> {
    fn from(spec: FilterSpec) -> Self {
        spec.terms
            .into_iter()
            .map(|(column, condition)| (column, condition.to_json()))
            .collect()
    }
}

fn literal(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Null => Some(Value::Null),
        JsonValue::String(s) => Some(Value::Str(s.clone())),
        JsonValue::Number(n) => n.as_i64().map(Value::Int).or_else(|| n.as_f64().map(Value::from)),
        _ => None,
    }
}

fn to_json_literal(value: &Value) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

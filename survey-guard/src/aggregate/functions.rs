//! Per-group evaluation of aggregation functions.

use crate::config::AggFunction;
use crate::table::{DataType, Value};
use std::collections::BTreeSet;

/// Separator for `unique` output.
pub const UNIQUE_SEPARATOR: &str = "; ";

/// Returns true if `function` can be computed over a column of `data_type`.
///
/// All-null columns accept every function.
pub fn supports(function: AggFunction, data_type: DataType) -> bool {
    !function.requires_numeric() || data_type.is_numeric() || data_type == DataType::Null
}

/// Evaluates `function` over the values of one group.
///
/// `data_type` is the declared type of the source column; it decides whether
/// `sum` yields an integer.
pub fn evaluate(function: AggFunction, values: &[&Value], data_type: DataType) -> Value {
    let present = values.iter().copied().filter(|v| !v.is_null());
    match function {
        AggFunction::Count => Value::Int(present.count() as i64),
        AggFunction::Nunique => Value::Int(present.collect::<BTreeSet<_>>().len() as i64),
        AggFunction::Sum => sum(present, data_type),
        AggFunction::Min => present.min().cloned().unwrap_or(Value::Null),
        AggFunction::Max => present.max().cloned().unwrap_or(Value::Null),
        AggFunction::Mean => {
            let numbers: Vec<f64> = present.filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggFunction::First => present.cloned().next().unwrap_or(Value::Null),
        AggFunction::Unique => {
            let distinct: BTreeSet<String> = present
                .map(ToString::to_string)
                .filter(|s| !s.is_empty())
                .collect();
            Value::Str(distinct.into_iter().collect::<Vec<_>>().join(UNIQUE_SEPARATOR))
        }
    }
}

fn sum<'a>(values: impl Iterator<Item = &'a Value>, data_type: DataType) -> Value {
    if data_type == DataType::Float {
        Value::from(values.filter_map(Value::as_f64).sum::<f64>())
    } else {
        Value::Int(values.filter_map(Value::as_i64).fold(0i64, i64::saturating_add))
    }
}

/// Row-wise sum of several columns; missing cells count as zero.
///
/// The result is an integer when every input is an integer column.
pub fn row_sum(columns: &[&[Value]], all_integer: bool, rows: usize) -> Vec<Value> {
    (0..rows)
        .map(|row| {
            let cells = columns.iter().filter_map(|c| c.get(row));
            if all_integer {
                Value::Int(cells.filter_map(Value::as_i64).fold(0i64, i64::saturating_add))
            } else {
                Value::from(cells.filter_map(Value::as_f64).sum::<f64>())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(function: AggFunction, values: &[Value], data_type: DataType) -> Value {
        let refs: Vec<&Value> = values.iter().collect();
        evaluate(function, &refs, data_type)
    }

    #[test]
    fn test_counting_functions_skip_nulls() {
        let values = [Value::from("a"), Value::Null, Value::from("b"), Value::from("a")];
        assert_eq!(eval(AggFunction::Count, &values, DataType::Str), Value::Int(3));
        assert_eq!(eval(AggFunction::Nunique, &values, DataType::Str), Value::Int(2));
        assert_eq!(eval(AggFunction::First, &[Value::Null, Value::from("x")], DataType::Str), Value::from("x"));
    }

    #[test]
    fn test_sum_keeps_integer_type() {
        let ints = [Value::Int(2), Value::Null, Value::Int(5)];
        assert!(matches!(eval(AggFunction::Sum, &ints, DataType::Int), Value::Int(7)));

        let floats = [Value::Float(0.5), Value::Float(1.25)];
        assert_eq!(eval(AggFunction::Sum, &floats, DataType::Float), Value::Float(1.75));

        assert_eq!(eval(AggFunction::Sum, &[Value::Null], DataType::Int), Value::Int(0));
    }

    #[test]
    fn test_min_max_mean() {
        let values = [Value::Int(4), Value::Null, Value::Int(-2), Value::Int(7)];
        assert_eq!(eval(AggFunction::Min, &values, DataType::Int), Value::Int(-2));
        assert_eq!(eval(AggFunction::Max, &values, DataType::Int), Value::Int(7));
        assert_eq!(eval(AggFunction::Mean, &values, DataType::Int), Value::Float(3.0));
        assert_eq!(eval(AggFunction::Max, &[Value::Null], DataType::Int), Value::Null);
        assert_eq!(eval(AggFunction::Mean, &[], DataType::Float), Value::Null);
    }

    #[test]
    fn test_unique_is_sorted_and_filtered() {
        let values = [
            Value::from("Poa annua"),
            Value::Null,
            Value::from(""),
            Value::from("Acacia dealbata"),
            Value::from("Poa annua"),
        ];
        assert_eq!(
            eval(AggFunction::Unique, &values, DataType::Str),
            Value::from("Acacia dealbata; Poa annua")
        );
    }

    #[test]
    fn test_supports() {
        assert!(supports(AggFunction::Sum, DataType::Int));
        assert!(supports(AggFunction::Sum, DataType::Null));
        assert!(!supports(AggFunction::Mean, DataType::Str));
        assert!(supports(AggFunction::Max, DataType::Date));
    }

    #[test]
    fn test_row_sum() {
        let a = [Value::Int(1), Value::Null];
        let b = [Value::Int(2), Value::Int(3)];
        assert_eq!(row_sum(&[&a, &b], true, 2), vec![Value::Int(3), Value::Int(3)]);
        assert_eq!(row_sum(&[], true, 1), vec![Value::Int(0)]);
    }
}

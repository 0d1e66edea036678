//! Interquartile-range outlier bounds.
//!
//! Quartiles use linear interpolation between closest ranks: for `n` sorted
//! values the `p` quantile sits at index `p * (n - 1)`.

use crate::table::Value;

/// Where a value falls relative to the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Below the lower bound
    Low,
    /// Within the bounds, inclusive
    Within,
    /// Above the upper bound
    High,
}

/// IQR fences computed from one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    /// First quartile
    pub q1: f64,
    /// Third quartile
    pub q3: f64,
    /// `q1 - multiplier * iqr`
    pub lower: f64,
    /// `q3 + multiplier * iqr`
    pub upper: f64,
}

impl IqrBounds {
    /// Computes bounds over the numeric values; `None` when there are none.
    pub fn from_values(values: &[Value], multiplier: f64) -> Option<Self> {
        let mut numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        numbers.sort_by(f64::total_cmp);
        let q1 = quantile(&numbers, 0.25)?;
        let q3 = quantile(&numbers, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Interquartile range.
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Classifies `value`.
    pub fn position(&self, value: f64) -> Position {
        if value > self.upper {
            Position::High
        } else if value < self.lower {
            Position::Low
        } else {
            Position::Within
        }
    }

    /// Bounds formatted for a column title, with one decimal for integer
    /// columns and two otherwise.
    pub fn label(&self, integer: bool) -> String {
        if integer {
            format!("[{:.1}, {:.1}]", self.lower, self.upper)
        } else {
            format!("[{:.2}, {:.2}]", self.lower, self.upper)
        }
    }
}

/// Linearly interpolated quantile of already sorted values.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let weight = idx - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.25), Some(1.75));
        assert_eq!(quantile(&values, 0.75), Some(3.25));
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&[7.0], 0.5), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_single_extreme_value_is_high() {
        let values: Vec<Value> = [1, 1, 1, 1, 100].into_iter().map(Value::from).collect();
        let bounds = IqrBounds::from_values(&values, 1.5).unwrap();
        assert_eq!((bounds.q1, bounds.q3), (1.0, 1.0));
        assert_eq!((bounds.lower, bounds.upper), (1.0, 1.0));
        assert_eq!(bounds.position(100.0), Position::High);
        assert_eq!(bounds.position(1.0), Position::Within);
        assert_eq!(bounds.label(true), "[1.0, 1.0]");
    }

    #[test]
    fn test_bounds_ignore_nulls() {
        let values = vec![
            Value::Float(2.0),
            Value::Null,
            Value::Float(4.0),
            Value::Float(6.0),
            Value::Float(8.0),
        ];
        let bounds = IqrBounds::from_values(&values, 1.5).unwrap();
        assert_eq!(bounds.iqr(), 3.0);
        assert_eq!(bounds.label(false), "[-1.00, 11.00]");
        assert_eq!(bounds.position(-1.5), Position::Low);
        assert!(IqrBounds::from_values(&[Value::Null], 1.5).is_none());
    }
}

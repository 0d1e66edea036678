//! Consistent colors for categorical plot series.
//!
//! Renderers look colors up in a [`CategoryPalette`] built once from the data,
//! so the same category gets the same color in every plot of a report.

use crate::table::Value;
use std::collections::BTreeMap;

/// The ten-color categorical cycle.
pub const CATEGORY_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// A value to color table.
///
/// # Examples
///
/// ```rust
/// use survey_guard::palette::CategoryPalette;
/// use survey_guard::table::Value;
///
/// let values = [Value::from("Wet"), Value::Null, Value::from("Dry"), Value::from("Wet")];
/// let palette = CategoryPalette::from_values(&values);
///
/// assert_eq!(palette.len(), 2);
/// assert_eq!(palette.color(&Value::from("Wet")), Some("#1f77b4"));
/// assert_eq!(palette.color(&Value::from("Dry")), Some("#ff7f0e"));
/// assert_eq!(palette.color(&Value::Null), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPalette {
    order: Vec<Value>,
    colors: BTreeMap<Value, &'static str>,
}

impl CategoryPalette {
    /// Assigns colors to the distinct non-null values in first-seen order,
    /// cycling after ten.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut palette = Self::default();
        for value in values {
            if value.is_null() || palette.colors.contains_key(value) {
                continue;
            }
            let color = CATEGORY_COLORS[palette.order.len() % CATEGORY_COLORS.len()];
            palette.colors.insert(value.clone(), color);
            palette.order.push(value.clone());
        }
        palette
    }

    /// Color assigned to `value`.
    pub fn color(&self, value: &Value) -> Option<&'static str> {
        self.colors.get(value).copied()
    }

    /// Categories with their colors, in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &'static str)> {
        self.order
            .iter()
            .filter_map(|v| self.colors.get(v).map(|color| (v, *color)))
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true when there are no categories.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

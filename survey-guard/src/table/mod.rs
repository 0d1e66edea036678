//! In-memory columnar tables.
//!
//! A [`Table`] is a named, ordered set of equally long [`Column`]s. Every column
//! has a single declared [`DataType`] inferred from its non-null values, so
//! downstream code can rely on a column being "numeric" or "date" without
//! inspecting each cell.
//!
//! ```rust
//! use survey_guard::table::{DataType, Table, Value};
//!
//! let table = Table::new("VegSamplingUnits")
//!     .with_column("SamplingUnitID", vec![Value::from("SU1"), Value::from("SU2")])?
//!     .with_column("Elevation", vec![Value::from(12), Value::Null])?;
//!
//! assert_eq!(table.num_rows(), 2);
//! assert_eq!(table.column("Elevation").unwrap().data_type(), DataType::Int);
//! # Ok::<(), survey_guard::error::QaError>(())
//! ```

mod interop;
mod value;

pub use value::{DataType, Value};

use crate::error::{QaError, Result};
use indexmap::IndexMap;
use serde::Serialize;

/// Tables of one workbook keyed by name, in the order the loader produced them.
pub type Workbook = IndexMap<String, Table>;

/// Looks up the table called `name`.
///
/// # Errors
///
/// Returns [`QaError::TableNotFound`] if `workbook` has no such table.
pub fn lookup<'a>(workbook: &'a Workbook, name: &str) -> Result<&'a Table> {
    workbook
        .get(name)
        .ok_or_else(|| QaError::table_not_found(name))
}

/// A named column of values sharing one data type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    data_type: DataType,
    values: Vec<Value>,
}

impl Column {
    /// Creates a column, inferring its type from the non-null values.
    ///
    /// Integers and floats may be mixed (the column becomes `Float`); any other
    /// mix of types is rejected.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        let data_type = infer_type(&values).ok_or_else(|| {
            QaError::invalid_data(format!("column '{name}' mixes incompatible value types"))
        })?;
        Ok(Self::normalized(name, data_type, values))
    }

    /// Creates a column, rendering every non-null value as a string when the
    /// values do not share a type.
    pub fn coerced(name: impl Into<String>, values: Vec<Value>) -> Self {
        let name = name.into();
        match infer_type(&values) {
            Some(data_type) => Self::normalized(name, data_type, values),
            None => {
                let values = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Null => Value::Null,
                        Value::Float(x) if x.is_nan() => Value::Null,
                        other => Value::Str(other.to_string()),
                    })
                    .collect();
                Self {
                    name,
                    data_type: DataType::Str,
                    values,
                }
            }
        }
    }

    /// NaN is stored as a missing value.
    fn normalized(name: String, data_type: DataType, values: Vec<Value>) -> Self {
        let values = values
            .into_iter()
            .map(|v| match v {
                Value::Float(x) if x.is_nan() => Value::Null,
                Value::Int(i) if data_type == DataType::Float => Value::Float(i as f64),
                other => other,
            })
            .collect();
        Self {
            name,
            data_type,
            values,
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// All values in row order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at `row`.
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of missing values.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Returns the column under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            data_type: self.data_type,
            values: rows
                .iter()
                .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        }
    }
}

/// Infers the column type; `None` when the values mix incompatible types.
fn infer_type(values: &[Value]) -> Option<DataType> {
    let mut data_type = DataType::Null;
    for value in values {
        data_type = match (data_type, value.data_type()) {
            (current, DataType::Null) => current,
            (DataType::Null, next) => next,
            (current, next) if current == next => current,
            (DataType::Int, DataType::Float) | (DataType::Float, DataType::Int) => DataType::Float,
            _ => return None,
        };
    }
    Some(data_type)
}

/// A named, ordered collection of equally long columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Creates a table from columns, checking lengths and name uniqueness.
    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new(name);
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Adds a column built from `values` and returns the table.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        self.push_column(Column::new(name, values)?)?;
        Ok(self)
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if a column with the same name exists or the
    /// length differs from the table's row count.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(column.name()) {
            return Err(QaError::invalid_data(format!(
                "column '{}' already exists in table '{}'",
                column.name(),
                self.name
            )));
        }
        self.check_length(&column)?;
        self.columns.push(column);
        Ok(())
    }

    /// Replaces the column with the same name in place, or appends it.
    pub fn upsert_column(&mut self, column: Column) -> Result<()> {
        self.check_length(&column)?;
        match self.columns.iter_mut().find(|c| c.name() == column.name()) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    fn check_length(&self, column: &Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(QaError::invalid_data(format!(
                "column '{}' has {} rows but table '{}' has {}",
                column.name(),
                column.len(),
                self.name,
                self.num_rows()
            )));
        }
        Ok(())
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Returns true if the column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Value at (`row`, `column`).
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.get(row))
    }

    /// Returns a table with the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }
}

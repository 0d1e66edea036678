//! Conversion between [`Table`] and Arrow [`RecordBatch`].
//!
//! Loaders hand workbook sheets over as record batches and exporters take
//! summaries back the same way. Integer and float arrays of any width are
//! widened to 64 bits, strings of either offset size become `Str`, and
//! date/timestamp arrays become `Date`.

use super::{Column, DataType, Table, Value};
use crate::error::{QaError, Result};
use ::arrow::array::{
    Array, ArrayRef, Date32Array, Float64Array, Int64Array, NullArray, StringArray,
};
use ::arrow::compute::cast;
use ::arrow::datatypes::{DataType as ArrowType, Field, Schema};
use ::arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use std::sync::Arc;

impl Table {
    /// Builds a table from a record batch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for Arrow types with no [`DataType`] counterpart
    /// (lists, structs, binary, ...).
    pub fn from_record_batch(name: impl Into<String>, batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let values = array_values(field.name(), array)?;
            columns.push(Column::new(field.name().clone(), values)?);
        }
        Table::from_columns(name, columns)
    }

    /// Converts the table to a record batch. Every field is nullable.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.num_columns());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.num_columns());
        for column in self.columns() {
            let (arrow_type, array) = column_array(column)?;
            fields.push(Field::new(column.name(), arrow_type, true));
            arrays.push(array);
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

fn array_values(name: &str, array: &ArrayRef) -> Result<Vec<Value>> {
    let values = match array.data_type() {
        ArrowType::Null => vec![Value::Null; array.len()],
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32
        | ArrowType::UInt64
        | ArrowType::Boolean => {
            let widened = cast(array, &ArrowType::Int64)?;
            let ints = downcast::<Int64Array>(name, &widened)?;
            (0..ints.len())
                .map(|i| {
                    if ints.is_null(i) {
                        Value::Null
                    } else {
                        Value::Int(ints.value(i))
                    }
                })
                .collect()
        }
        ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 | ArrowType::Decimal128(_, _) => {
            let widened = cast(array, &ArrowType::Float64)?;
            let floats = downcast::<Float64Array>(name, &widened)?;
            (0..floats.len())
                .map(|i| {
                    if floats.is_null(i) {
                        Value::Null
                    } else {
                        Value::from(floats.value(i))
                    }
                })
                .collect()
        }
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => {
            let strings = cast(array, &ArrowType::Utf8)?;
            let strings = downcast::<StringArray>(name, &strings)?;
            (0..strings.len())
                .map(|i| {
                    if strings.is_null(i) {
                        Value::Null
                    } else {
                        Value::Str(strings.value(i).to_string())
                    }
                })
                .collect()
        }
        ArrowType::Date32 | ArrowType::Date64 | ArrowType::Timestamp(_, _) => {
            let dates = cast(array, &ArrowType::Date32)?;
            let dates = downcast::<Date32Array>(name, &dates)?;
            (0..dates.len())
                .map(|i| {
                    if dates.is_null(i) {
                        Value::Null
                    } else {
                        dates.value_as_date(i).map_or(Value::Null, Value::Date)
                    }
                })
                .collect()
        }
        other => {
            return Err(QaError::invalid_data(format!(
                "column '{name}' has unsupported Arrow type {other}"
            )))
        }
    };
    Ok(values)
}

fn downcast<'a, T: 'static>(name: &str, array: &'a ArrayRef) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        QaError::invalid_data(format!("column '{name}' could not be read after casting"))
    })
}

fn column_array(column: &Column) -> Result<(ArrowType, ArrayRef)> {
    let values = column.values();
    let converted: (ArrowType, ArrayRef) = match column.data_type() {
        DataType::Null => (ArrowType::Null, Arc::new(NullArray::new(values.len()))),
        DataType::Int => (
            ArrowType::Int64,
            Arc::new(Int64Array::from(
                values.iter().map(Value::as_i64).collect::<Vec<_>>(),
            )),
        ),
        DataType::Float => (
            ArrowType::Float64,
            Arc::new(Float64Array::from(
                values.iter().map(Value::as_f64).collect::<Vec<_>>(),
            )),
        ),
        DataType::Str => (
            ArrowType::Utf8,
            Arc::new(StringArray::from(
                values.iter().map(Value::as_str).collect::<Vec<_>>(),
            )),
        ),
        DataType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
                .ok_or_else(|| QaError::invalid_data("invalid epoch date"))?;
            let days = values
                .iter()
                .map(|v| {
                    v.as_date()
                        .and_then(|d| i32::try_from((d - epoch).num_days()).ok())
                })
                .collect::<Vec<_>>();
            (ArrowType::Date32, Arc::new(Date32Array::from(days)))
        }
    };
    Ok(converted)
}

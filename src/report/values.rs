//! Coercion of raw row values into native JSON numbers.
//!
//! The appliance returns most cells as strings. Each cell is converted
//! according to the declared type of the column it belongs to.

use std::sync::Arc;

use serde_json::{Number, Value};

use crate::metadata::column::Column;

/// String form of a value; null becomes the empty string.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Convert a JSON value to a float if possible.
pub fn value_to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert a JSON value to an integer if possible.
pub fn value_to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// How a column's cells are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Float,
    Int,
    Raw,
}

impl Coercion {
    pub fn for_column(column: &Column) -> Self {
        match (column.data_type(), column.rate()) {
            (Some("float"), _) | (Some("reltime"), _) | (_, Some("opt")) => Coercion::Float,
            (Some("int"), _) => Coercion::Int,
            _ => Coercion::Raw,
        }
    }

    /// Decode one cell. Anything that fails to convert stays as it was: the
    /// reduction percentage columns are declared `int` but carry floats.
    pub fn apply(&self, value: Value) -> Value {
        match self {
            Coercion::Float => value_to_float(&value)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            Coercion::Int => value_to_int(&value).map(Value::from).unwrap_or(value),
            Coercion::Raw => value,
        }
    }
}

/// Decode a row against its legend. Cells beyond the legend are untouched.
pub fn decode_row(row: Vec<Value>, legend: &[Arc<Column>]) -> Vec<Value> {
    row.into_iter()
        .enumerate()
        .map(|(i, cell)| match legend.get(i) {
            Some(col) => Coercion::for_column(col).apply(cell),
            None => cell,
        })
        .collect()
}

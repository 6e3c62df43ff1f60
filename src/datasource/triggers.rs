//! Alert triggers evaluated over a finished table.

use crate::error::{ProfilerError, Result};
use crate::report::table::Table;

pub const SIMPLE_TRIGGER_SEVERITY: u32 = 5;
pub const DEFAULT_SPIKE_STD: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerResult {
    pub fired: bool,
    pub severity: u32,
    /// Rows that caused the trigger to fire.
    pub rows: Table,
}

fn numeric(table: &Table, column: &str) -> Result<Vec<Option<f64>>> {
    table
        .numeric_column(column)
        .ok_or_else(|| ProfilerError::InvalidArgument(format!("table has no column {}", column)))
}

/// Fire when any value in `column` exceeds `threshold`.
pub fn simple_trigger(table: &Table, column: &str, threshold: f64) -> Result<TriggerResult> {
    let hits: Vec<usize> = numeric(table, column)?
        .into_iter()
        .enumerate()
        .filter(|(_, v)| v.map_or(false, |v| v > threshold))
        .map(|(i, _)| i)
        .collect();
    Ok(TriggerResult {
        fired: !hits.is_empty(),
        severity: SIMPLE_TRIGGER_SEVERITY,
        rows: table.select_rows(&hits),
    })
}

/// Sample mean and standard deviation, skipping missing values. `None`
/// with fewer than two values.
fn mean_std(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.len() < 2 {
        return None;
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// Rows whose `column` lies more than `std` standard deviations from the
/// column mean.
///
/// `column` defaults to the first column other than `time`. Severity grows
/// by 10 per spiking row and caps at 99 from ten rows on.
pub fn local_spike(table: &Table, column: Option<&str>, std: Option<f64>) -> Result<TriggerResult> {
    let column = match column {
        Some(c) => c,
        None => table
            .columns
            .iter()
            .map(String::as_str)
            .find(|c| *c != "time")
            .ok_or_else(|| ProfilerError::InvalidArgument("table has no value column".to_string()))?,
    };
    let values = numeric(table, column)?;

    let hits: Vec<usize> = match mean_std(&values) {
        Some((mean, sd)) => {
            let delta = sd * std.unwrap_or(DEFAULT_SPIKE_STD);
            values
                .iter()
                .enumerate()
                .filter(|(_, v)| v.map_or(false, |v| (v - mean).abs() > delta))
                .map(|(i, _)| i)
                .collect()
        }
        None => Vec::new(),
    };

    let severity = if hits.len() < 10 { hits.len() as u32 * 10 } else { 99 };
    log::debug!("TRIGGER_LOCAL_SPIKE column={} hits={} severity={}", column, hits.len(), severity);
    Ok(TriggerResult {
        fired: !hits.is_empty(),
        severity,
        rows: table.select_rows(&hits),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn series(values: &[Value]) -> Table {
        Table::new(
            vec!["time".to_string(), "avg_bytes".to_string()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![json!(1_700_000_000 + 60 * i as i64), v.clone()])
                .collect(),
        )
    }

    #[test]
    fn test_simple_trigger() {
        let table = series(&[json!(1.0), json!(7.5), Value::Null, json!(3)]);
        let result = simple_trigger(&table, "avg_bytes", 5.0).unwrap();
        assert!(result.fired);
        assert_eq!(result.severity, 5);
        assert_eq!(result.rows.len(), 1);

        assert!(!simple_trigger(&table, "avg_bytes", 10.0).unwrap().fired);
        assert!(simple_trigger(&table, "missing", 1.0).is_err());
    }

    #[test]
    fn test_local_spike_defaults_to_first_value_column() {
        let mut values = vec![json!(10.0); 12];
        values[7] = json!(100.0);
        let result = local_spike(&series(&values), None, None).unwrap();
        assert!(result.fired);
        assert_eq!(result.severity, 10);
        assert_eq!(result.rows.rows[0][1], json!(100.0));
    }

    #[test]
    fn test_local_spike_flat_and_short_series() {
        let flat = series(&vec![json!(4.0); 5]);
        let result = local_spike(&flat, Some("avg_bytes"), Some(1.0)).unwrap();
        assert!(!result.fired);
        assert_eq!(result.severity, 0);

        let single = series(&[json!(4.0)]);
        assert!(!local_spike(&single, None, None).unwrap().fired);
    }

    #[test]
    fn test_local_spike_severity_caps() {
        let values: Vec<Value> = (0..30).map(|i| json!(if i % 2 == 0 { 0.0 } else { 100.0 })).collect();
        let result = local_spike(&series(&values), None, Some(0.5)).unwrap();
        assert_eq!(result.rows.len(), 30);
        assert_eq!(result.severity, 99);
    }
}

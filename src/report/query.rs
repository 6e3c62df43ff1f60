//! One sub-result of a report.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::api::endpoints::ProfilerApi;
use crate::error::{ProfilerError, Result};
use crate::logging::structured::LogContext;
use crate::metadata::catalog::ColumnCatalog;
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::triplets::EPHEMERAL_COLID;
use crate::report::resolver::ColumnResolver;
use crate::report::values::{value_to_int, value_to_string};

/// Rows and totals as returned by the appliance, not yet decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryData {
    pub data: Vec<Vec<Value>>,
    pub totals: Vec<Value>,
}

impl QueryData {
    pub fn from_json(json: &Value) -> Result<Self> {
        let rows = |v: Option<&Value>| -> Result<Vec<Value>> {
            match v {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(Value::Array(items)) => Ok(items.clone()),
                Some(other) => Err(ProfilerError::Parse(format!("expected array, got {}", other))),
            }
        };
        let data = rows(json.get("data"))?
            .into_iter()
            .map(|row| match row {
                Value::Array(cells) => Ok(cells),
                other => Err(ProfilerError::Parse(format!("expected row array, got {}", other))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            data,
            totals: rows(json.get("totals"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DataKey {
    column_ids: Vec<i64>,
    limit: Option<usize>,
}

/// A query of a submitted report: its id, actual time window and the
/// columns the appliance says it can return.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: String,
    pub actual_t0: Option<i64>,
    pub actual_t1: Option<i64>,
    available: Vec<Arc<Column>>,
    cached: Option<(DataKey, QueryData)>,
}

impl Query {
    /// Build from one entry of `queries.json`.
    ///
    /// Stable available columns map onto the catalog's shared instances.
    /// Ephemeral ones, and every column when `custom_columns` is set, are
    /// built from the response with their base filled in from the catalog.
    pub fn from_json(json: &Value, catalog: &ColumnCatalog, custom_columns: bool) -> Result<Self> {
        let id = json
            .get("id")
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProfilerError::Parse(format!("query without id: {}", json)))?;

        let mut available = Vec::new();
        if let Some(Value::Array(columns)) = json.get("columns") {
            for raw in columns {
                if raw.get("available").and_then(Value::as_bool) != Some(true) {
                    continue;
                }
                let col_id = raw.get("id").and_then(Value::as_i64).unwrap_or(EPHEMERAL_COLID);
                let shared = if custom_columns || col_id >= EPHEMERAL_COLID {
                    None
                } else {
                    catalog.get_by_id(col_id).cloned()
                };
                let col = match shared {
                    Some(col) => col,
                    None => Arc::new(catalog.backfill_baseid(Column::from_json(raw)?)),
                };
                available.push(col);
            }
        }

        Ok(Self {
            id,
            actual_t0: json.get("actual_t0").and_then(value_to_int),
            actual_t1: json.get("actual_t1").and_then(value_to_int),
            available,
            cached: None,
        })
    }

    /// Columns the appliance reported as available for this query.
    pub fn available_columns(&self) -> &[Arc<Column>] {
        &self.available
    }

    /// Refs for every available column, for "give me everything" requests.
    pub fn all_columns(&self) -> Vec<ColumnRef> {
        self.available.iter().map(ColumnRef::from).collect()
    }

    /// Window the appliance actually covered, which may be aligned
    /// differently from the requested one.
    pub fn actual_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let t0 = Utc.timestamp_opt(self.actual_t0?, 0).single()?;
        let t1 = Utc.timestamp_opt(self.actual_t1?, 0).single()?;
        Some((t0, t1))
    }

    pub fn legend(&self, catalog: &ColumnCatalog, requested: &[ColumnRef]) -> Result<Vec<Arc<Column>>> {
        ColumnResolver::new(&self.available, catalog).resolve(requested)
    }

    /// Raw data for `legend`, fetched on first use and again whenever the
    /// column selection or limit changes.
    pub fn fetch(
        &mut self,
        api: &ProfilerApi,
        report_id: i64,
        legend: &[Arc<Column>],
        limit: Option<usize>,
        ctx: &LogContext,
    ) -> Result<&QueryData> {
        let key = DataKey {
            column_ids: legend.iter().map(|c| c.id).collect(),
            limit,
        };

        let stale = !matches!(&self.cached, Some((cached, _)) if *cached == key);
        if stale {
            let raw = api.query_data(report_id, &self.id, &key.column_ids, limit)?;
            let data = QueryData::from_json(&raw)?;
            log::debug!(
                "{} QUERY_DATA_FETCHED columns={:?} rows={}",
                ctx.with_query(&self.id),
                key.column_ids,
                data.data.len()
            );
            self.cached = Some((key, data));
        }

        match &self.cached {
            Some((_, data)) => Ok(data),
            None => Err(ProfilerError::Parse("query data cache empty after fetch".to_string())),
        }
    }
}

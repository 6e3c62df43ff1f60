//! Column definitions as reported by the appliance.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProfilerError, Result};
use crate::metadata::triplets::EPHEMERAL_COLID;

/// A single data column.
///
/// Stable columns keep the same id across reports (`avg_bytes` is always 33).
/// Ephemeral columns are assigned per report, one per concrete dimension
/// value in top-N style queries, and carry the stable id they derive from in
/// `baseid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: i64,
    pub key: String,
    pub label: String,
    pub json: Value,
    pub baseid: i64,
    pub iskey: bool,
    pub ephemeral: bool,
}

/// Derive the logical key from a namespaced string id: `ID_AVG_BYTES`
/// becomes `avg_bytes`, anything without the prefix is kept verbatim.
pub fn key_from_strid(strid: &str) -> String {
    match strid.strip_prefix("ID_") {
        Some(rest) => rest.to_lowercase(),
        None => strid.to_string(),
    }
}

impl Column {
    /// Build a column from one entry of a columns listing or a query's
    /// available columns.
    pub fn from_json(json: &Value) -> Result<Self> {
        let id = json
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ProfilerError::Parse(format!("column without numeric id: {}", json)))?;
        let strid = json
            .get("strid")
            .and_then(Value::as_str)
            .ok_or_else(|| ProfilerError::Parse(format!("column {} without strid", id)))?;
        let label = json
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let iskey = json.get("category").and_then(Value::as_str) != Some("data");
        let ephemeral = id >= EPHEMERAL_COLID;
        let baseid = if ephemeral {
            json.get("baseid").and_then(Value::as_i64).unwrap_or(id)
        } else {
            id
        };

        Ok(Self {
            id,
            key: key_from_strid(strid),
            label,
            json: json.clone(),
            baseid,
            iskey,
            ephemeral,
        })
    }

    /// Copy of an ephemeral column pointing at a different base. Stable
    /// columns are returned unchanged since their base is always themselves.
    pub fn with_baseid(&self, baseid: i64) -> Self {
        let mut col = self.clone();
        if col.ephemeral {
            col.baseid = baseid;
        }
        col
    }

    /// Whether `baseid` came from the appliance or a backfill rather than
    /// defaulting to the column's own id.
    pub fn has_distinct_base(&self) -> bool {
        self.baseid != self.id
    }

    /// Declared value type (`float`, `int`, `reltime`, `string`, ...).
    pub fn data_type(&self) -> Option<&str> {
        self.json.get("type").and_then(Value::as_str)
    }

    pub fn rate(&self) -> Option<&str> {
        self.json.get("rate").and_then(Value::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.json.get("category").and_then(Value::as_str)
    }

    pub fn is_time(&self) -> bool {
        self.key == "time"
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_distinct_base() {
            write!(f, "{}({}, base {})", self.key, self.id, self.baseid)
        } else {
            write!(f, "{}({})", self.key, self.id)
        }
    }
}

/// A caller's reference to a column: a logical key, a numeric id, or an
/// already resolved column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    ByKey(String),
    ById(i64),
    ByObject(Arc<Column>),
}

impl ColumnRef {
    /// Logical key used for groupby membership checks. Ids have no key until
    /// resolved.
    pub fn key(&self) -> Option<&str> {
        match self {
            ColumnRef::ByKey(k) => Some(k),
            ColumnRef::ById(_) => None,
            ColumnRef::ByObject(c) => Some(&c.key),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::ByKey(k) => f.write_str(k),
            ColumnRef::ById(id) => write!(f, "{}", id),
            ColumnRef::ByObject(c) => f.write_str(&c.key),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(key: &str) -> Self {
        ColumnRef::ByKey(key.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(key: String) -> Self {
        ColumnRef::ByKey(key)
    }
}

impl From<i64> for ColumnRef {
    fn from(id: i64) -> Self {
        ColumnRef::ById(id)
    }
}

impl From<Arc<Column>> for ColumnRef {
    fn from(col: Arc<Column>) -> Self {
        ColumnRef::ByObject(col)
    }
}

impl From<&Arc<Column>> for ColumnRef {
    fn from(col: &Arc<Column>) -> Self {
        ColumnRef::ByObject(Arc::clone(col))
    }
}

/// Convert a list of anything column-like into references.
pub fn refs<I, T>(items: I) -> Vec<ColumnRef>
where
    I: IntoIterator<Item = T>,
    T: Into<ColumnRef>,
{
    items.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_from_strid() {
        assert_eq!(key_from_strid("ID_AVG_BYTES"), "avg_bytes");
        assert_eq!(key_from_strid("200012"), "200012");
    }

    #[test]
    fn test_stable_column() {
        let col = Column::from_json(&json!({
            "id": 33, "strid": "ID_AVG_BYTES", "name": "Avg Bytes/s",
            "category": "data", "type": "float", "rate": "persec"
        }))
        .unwrap();
        assert_eq!(col.key, "avg_bytes");
        assert!(!col.ephemeral);
        assert!(!col.iskey);
        assert_eq!(col.baseid, 33);
        assert_eq!(col.data_type(), Some("float"));
    }

    #[test]
    fn test_ephemeral_column_with_base() {
        let col = Column::from_json(&json!({
            "id": 200001, "strid": "ID_AVG_BYTES", "name": "tcp/80",
            "category": "data", "baseid": 33
        }))
        .unwrap();
        assert!(col.ephemeral);
        assert_eq!(col.baseid, 33);
        assert!(col.has_distinct_base());
    }

    #[test]
    fn test_key_columns_and_missing_category() {
        let col = Column::from_json(&json!({"id": 1, "strid": "ID_TIME", "name": "Time", "category": "time"})).unwrap();
        assert!(col.iskey);
        assert!(col.is_time());

        let bare = Column::from_json(&json!({"id": 2, "strid": "ID_X"})).unwrap();
        assert!(bare.iskey);
        assert_eq!(bare.label, "");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Column::from_json(&json!({"strid": "ID_X"})).is_err());
        assert!(Column::from_json(&json!({"id": 5})).is_err());
    }

    #[test]
    fn test_with_baseid_only_touches_ephemeral() {
        let stable = Column::from_json(&json!({"id": 33, "strid": "ID_AVG_BYTES", "category": "data"})).unwrap();
        assert_eq!(stable.with_baseid(99).baseid, 33);

        let eph = Column::from_json(&json!({"id": 200005, "strid": "ID_AVG_BYTES", "category": "data"})).unwrap();
        assert_eq!(eph.baseid, 200005);
        assert_eq!(eph.with_baseid(33).baseid, 33);
    }

    #[test]
    fn test_column_ref_conversions() {
        assert_eq!(ColumnRef::from("time"), ColumnRef::ByKey("time".to_string()));
        assert_eq!(ColumnRef::from(33i64), ColumnRef::ById(33));
        let r = refs(vec!["time", "avg_bytes"]);
        assert_eq!(r.len(), 2);
        assert_eq!(r[1].key(), Some("avg_bytes"));
    }
}

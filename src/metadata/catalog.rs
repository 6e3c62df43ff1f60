//! Lookup index over every known column.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{ProfilerError, Result};
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::triplets::Groupby;

/// Restricts resolution to the columns legal for one groupby.
#[derive(Debug, Clone)]
pub struct GroupbyScope {
    pub groupby: Groupby,
    pub keys: HashSet<String>,
}

/// Columns indexed by key and by id, split into key (dimension) and value
/// (metric) columns.
#[derive(Debug, Default, Clone)]
pub struct ColumnCatalog {
    by_key: HashMap<String, Arc<Column>>,
    by_id: HashMap<i64, Arc<Column>>,
    keys: Vec<Arc<Column>>,
    values: Vec<Arc<Column>>,
}

impl ColumnCatalog {
    pub fn new(columns: Vec<Arc<Column>>) -> Self {
        let mut catalog = Self::default();
        for col in columns {
            if catalog.by_key.contains_key(&col.key) {
                catalog.by_id.entry(col.id).or_insert_with(|| Arc::clone(&col));
                continue;
            }
            catalog.by_key.insert(col.key.clone(), Arc::clone(&col));
            catalog.by_id.insert(col.id, Arc::clone(&col));
            if col.iskey {
                catalog.keys.push(col);
            } else {
                catalog.values.push(col);
            }
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Column>> {
        self.by_key.get(key)
    }

    pub fn get_by_id(&self, id: i64) -> Option<&Arc<Column>> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Dimension columns.
    pub fn keys(&self) -> &[Arc<Column>] {
        &self.keys
    }

    /// Metric columns.
    pub fn values(&self) -> &[Arc<Column>] {
        &self.values
    }

    /// Keys first, then values.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.keys.iter().chain(self.values.iter())
    }

    /// Canonical column for a reference. Objects resolve through their key so
    /// a column from another source maps onto the catalog's shared instance.
    pub fn resolve(&self, column: &ColumnRef) -> Result<Arc<Column>> {
        let found = match column {
            ColumnRef::ByKey(key) => self.by_key.get(key),
            ColumnRef::ById(id) => self.by_id.get(id),
            ColumnRef::ByObject(col) => self.by_key.get(&col.key),
        };
        found
            .cloned()
            .ok_or_else(|| ProfilerError::UnknownColumn(column.to_string()))
    }

    /// Resolve a list, failing on the first unknown column or, with a scope,
    /// the first column outside the groupby's legal set.
    pub fn resolve_many(&self, columns: &[ColumnRef], scope: Option<&GroupbyScope>) -> Result<Vec<Arc<Column>>> {
        columns
            .iter()
            .map(|r| {
                let col = self.resolve(r)?;
                if let Some(scope) = scope {
                    if !scope.keys.is_empty() && !scope.keys.contains(&col.key) {
                        return Err(ProfilerError::ColumnNotValidForGroupby {
                            column: r.to_string(),
                            groupby: scope.groupby.to_string(),
                        });
                    }
                }
                Ok(col)
            })
            .collect()
    }

    /// Columns for each id, failing on the first unknown one.
    pub fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Arc<Column>>> {
        ids.iter()
            .map(|id| self.resolve(&ColumnRef::ById(*id)))
            .collect()
    }

    /// Fill in the base of an ephemeral column that arrived without one,
    /// using the stable column sharing its key.
    pub fn backfill_baseid(&self, column: Column) -> Column {
        if !column.ephemeral || column.has_distinct_base() {
            return column;
        }
        match self.by_key.get(&column.key) {
            Some(base) if !base.ephemeral => column.with_baseid(base.id),
            _ => column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(id: i64, strid: &str, category: &str) -> Arc<Column> {
        Arc::new(Column::from_json(&json!({"id": id, "strid": strid, "name": strid, "category": category})).unwrap())
    }

    fn catalog() -> ColumnCatalog {
        ColumnCatalog::new(vec![
            col(98, "ID_TIME", "time"),
            col(17, "ID_HOST_IP", "key"),
            col(33, "ID_AVG_BYTES", "data"),
            col(34, "ID_AVG_PKTS", "data"),
            col(33, "ID_AVG_BYTES", "data"),
        ])
    }

    #[test]
    fn test_partition() {
        let cat = catalog();
        assert_eq!(cat.len(), 4);
        let keys: Vec<&str> = cat.keys().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["time", "host_ip"]);
        let values: Vec<&str> = cat.values().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(values, vec!["avg_bytes", "avg_pkts"]);
        assert_eq!(cat.iter().count(), 4);
    }

    #[test]
    fn test_resolve_dispatch() {
        let cat = catalog();
        let by_key = cat.resolve(&"avg_bytes".into()).unwrap();
        let by_id = cat.resolve(&ColumnRef::ById(33)).unwrap();
        let by_obj = cat.resolve(&ColumnRef::ByObject(col(33, "ID_AVG_BYTES", "data"))).unwrap();
        assert!(Arc::ptr_eq(&by_key, &by_id));
        assert!(Arc::ptr_eq(&by_key, &by_obj));

        let err = cat.resolve(&"nope".into()).unwrap_err();
        assert!(matches!(err, ProfilerError::UnknownColumn(ref k) if k == "nope"));
    }

    #[test]
    fn test_resolve_many_with_scope() {
        let cat = catalog();
        let scope = GroupbyScope {
            groupby: Groupby::Time,
            keys: ["time", "avg_bytes"].iter().map(|s| s.to_string()).collect(),
        };
        let refs: Vec<ColumnRef> = vec!["time".into(), "avg_bytes".into()];
        let cols = cat.resolve_many(&refs, Some(&scope)).unwrap();
        assert_eq!(cols.len(), 2);

        let err = cat
            .resolve_many(&["avg_pkts".into()], Some(&scope))
            .unwrap_err();
        assert!(matches!(
            err,
            ProfilerError::ColumnNotValidForGroupby { ref column, ref groupby }
                if column == "avg_pkts" && groupby == "tim"
        ));
    }

    #[test]
    fn test_resolve_many_idempotent() {
        let cat = catalog();
        let refs: Vec<ColumnRef> = vec!["host_ip".into(), 34i64.into(), "time".into()];
        let first = cat.resolve_many(&refs, None).unwrap();
        let second = cat.resolve_many(&refs, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_get_by_ids() {
        let cat = catalog();
        let cols = cat.get_by_ids(&[34, 98]).unwrap();
        assert_eq!(cols[0].key, "avg_pkts");
        assert_eq!(cols[1].key, "time");
        assert!(cat.get_by_ids(&[12345]).is_err());
    }

    #[test]
    fn test_backfill_baseid() {
        let cat = catalog();
        let eph = Column::from_json(&json!({"id": 200001, "strid": "ID_AVG_BYTES", "category": "data"})).unwrap();
        assert_eq!(cat.backfill_baseid(eph).baseid, 33);

        let explicit = Column::from_json(&json!({"id": 200002, "strid": "ID_AVG_BYTES", "category": "data", "baseid": 34})).unwrap();
        assert_eq!(cat.backfill_baseid(explicit).baseid, 34);

        let unknown = Column::from_json(&json!({"id": 200003, "strid": "ID_MYSTERY", "category": "data"})).unwrap();
        assert_eq!(cat.backfill_baseid(unknown).baseid, 200003);
    }
}

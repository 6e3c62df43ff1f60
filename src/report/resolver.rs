//! Legend resolution against a query's available columns.
//!
//! Per-report (ephemeral) columns only exist in a query's available set. A
//! caller asking for `avg_bytes` on a top-N time series really wants every
//! ephemeral column derived from it (one per port, application, ...), and
//! must never get the base column itself: its id is not queryable on that
//! report.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::metadata::catalog::ColumnCatalog;
use crate::metadata::column::{Column, ColumnRef};

/// Resolves requested columns against one query's available columns, falling
/// back to the stable catalog.
pub struct ColumnResolver<'a> {
    available: &'a [Arc<Column>],
    catalog: &'a ColumnCatalog,
}

impl<'a> ColumnResolver<'a> {
    pub fn new(available: &'a [Arc<Column>], catalog: &'a ColumnCatalog) -> Self {
        Self { available, catalog }
    }

    /// Ids of stable columns represented only through ephemeral expansions.
    pub fn superseded_bases(&self) -> HashSet<i64> {
        self.available
            .iter()
            .filter(|c| c.ephemeral && c.has_distinct_base())
            .map(|c| c.baseid)
            .collect()
    }

    fn find_available(&self, column: &ColumnRef) -> Option<Arc<Column>> {
        let by_key = |key: &str| {
            self.available
                .iter()
                .find(|c| !c.ephemeral && c.key == key)
                .cloned()
        };
        match column {
            ColumnRef::ByKey(key) => by_key(key),
            ColumnRef::ById(id) => self.available.iter().find(|c| c.id == *id).cloned(),
            ColumnRef::ByObject(col) => self
                .available
                .iter()
                .find(|c| c.id == col.id)
                .cloned()
                .or_else(|| by_key(&col.key)),
        }
    }

    /// Ordered legend for `requested`.
    ///
    /// Requested columns come first in request order, each resolved against
    /// the available set and then the catalog (the appliance leaves some
    /// queryable columns out of `available`). Superseded bases are dropped,
    /// and every ephemeral column not already selected is appended in
    /// available order.
    pub fn resolve(&self, requested: &[ColumnRef]) -> Result<Vec<Arc<Column>>> {
        let superseded = self.superseded_bases();
        let mut legend: Vec<Arc<Column>> = Vec::with_capacity(requested.len());
        let mut selected: HashSet<i64> = HashSet::new();

        for column in requested {
            let resolved = match self.find_available(column) {
                Some(col) => col,
                None => self.catalog.resolve(column)?,
            };
            if !resolved.ephemeral && superseded.contains(&resolved.id) {
                continue;
            }
            if selected.insert(resolved.id) {
                legend.push(resolved);
            }
        }

        for col in self.available.iter().filter(|c| c.ephemeral) {
            if selected.insert(col.id) {
                legend.push(Arc::clone(col));
            }
        }

        Ok(legend)
    }
}

//! Boundary for embedding report runs in a job framework.
//!
//! A host application describes what it wants as a [`TableDefinition`] plus
//! [`QueryCriteria`], hands in something implementing [`Job`] to receive
//! progress and errors, and gets a [`QueryOutcome`] back. Every appliance
//! round trip happens under [`NetProfiler::lock`](crate::profiler::NetProfiler::lock)
//! so several workers can share one connection.

pub mod query;
pub mod triggers;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::column::ColumnRef;
use crate::metadata::triplets::{Centricity, Groupby, Realm};
use crate::report::criteria::{DataFilter, TrafficFilter};
use crate::report::table::Table;
use crate::report::time::{Resolution, TimeFilter};

pub use query::{run_device_query, run_table_query, run_template_query, run_top_n_query};
pub use triggers::{local_spike, simple_trigger, TriggerResult};

/// Message recorded when a job has no appliance to run against.
pub const NO_DEVICE_SELECTED: &str = "No NetProfiler Device Selected";

/// Shape of one table a job fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    pub realm: Realm,
    pub groupby: Groupby,
    pub columns: Vec<String>,
    #[serde(default)]
    pub sort_column: Option<String>,
    /// Keep at most this many rows. Zero keeps everything.
    #[serde(default)]
    pub rows: usize,
    /// Interface tables use interface centricity.
    #[serde(default)]
    pub interface: bool,
}

impl TableDefinition {
    pub fn new(realm: Realm, groupby: Groupby, columns: &[&str]) -> Self {
        Self {
            realm,
            groupby,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            sort_column: None,
            rows: 0,
            interface: false,
        }
    }

    /// Overall traffic over time.
    pub fn time_series(columns: &[&str]) -> Self {
        Self::new(Realm::TrafficOverallTimeSeries, Groupby::Time, columns)
    }

    /// Traffic summary grouped by `groupby`.
    pub fn summary(groupby: Groupby, columns: &[&str]) -> Self {
        Self::new(Realm::TrafficSummary, groupby, columns)
    }

    pub fn sort_by(mut self, column: &str) -> Self {
        self.sort_column = Some(column.to_string());
        self
    }

    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn interface(mut self) -> Self {
        self.interface = true;
        self
    }

    pub fn centricity(&self) -> Centricity {
        if self.interface {
            Centricity::Interface
        } else {
            Centricity::Host
        }
    }

    pub fn column_refs(&self) -> Vec<ColumnRef> {
        self.columns.iter().map(|c| ColumnRef::from(c.as_str())).collect()
    }
}

/// Fields every device listing carries.
pub const DEFAULT_DEVICE_COLUMNS: [&str; 6] = ["id", "ipaddr", "name", "type", "type_id", "version"];

/// Device inventory table: which device fields to keep and how to narrow
/// the listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTable {
    /// Empty selects [`DEFAULT_DEVICE_COLUMNS`].
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub rows: usize,
}

impl DeviceTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, type_id: i64) -> Self {
        self.type_id = Some(type_id);
        self
    }

    pub fn within(mut self, cidr: &str) -> Self {
        self.cidr = Some(cidr.to_string());
        self
    }

    pub fn selected_columns(&self) -> Vec<String> {
        if self.columns.is_empty() {
            DEFAULT_DEVICE_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            self.columns.clone()
        }
    }
}

/// Per-run inputs chosen by the user of a job.
#[derive(Debug, Clone)]
pub struct QueryCriteria {
    pub time_filter: TimeFilter,
    pub resolution: Resolution,
    pub traffic_filter: Option<TrafficFilter>,
    pub data_filter: Option<DataFilter>,
}

impl QueryCriteria {
    pub fn new(time_filter: TimeFilter) -> Self {
        Self {
            time_filter,
            resolution: Resolution::Auto,
            traffic_filter: None,
            data_filter: None,
        }
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Combine several traffic expressions; blank ones are dropped.
    pub fn traffic_exprs<'a>(mut self, exprs: impl IntoIterator<Item = &'a str>) -> Self {
        self.traffic_filter = TrafficFilter::combine(exprs);
        self
    }

    pub fn data_filter(mut self, data_filter: DataFilter) -> Self {
        self.data_filter = Some(data_filter);
        self
    }
}

/// Receiver for a running query's side effects.
pub trait Job {
    /// Percent complete, 0 to 100.
    fn progress(&mut self, percent: f64);

    /// Window the appliance actually reported on.
    fn set_actual_window(&mut self, start: DateTime<Utc>, end: DateTime<Utc>);

    fn mark_error(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Complete(Table),
    Failed(String),
}

impl QueryOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, QueryOutcome::Complete(_))
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            QueryOutcome::Complete(t) => Some(t),
            QueryOutcome::Failed(_) => None,
        }
    }
}

//! Report request description.

use serde_json::Value;

use crate::metadata::column::ColumnRef;
use crate::metadata::triplets::{Centricity, Groupby, Realm, Triplet};
use crate::report::time::{Resolution, TimeFilter};

/// Template id the appliance uses for ad-hoc single query reports.
pub const SINGLE_QUERY_TEMPLATE_ID: i64 = 184;

/// Host group type used when a groupby needs one and none was given.
pub const DEFAULT_HOST_GROUP_TYPE: &str = "ByLocation";

/// Traffic expression in the appliance's filter syntax, e.g. `host 10.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficFilter(pub String);

impl TrafficFilter {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// AND-combine several expressions, skipping empty ones.
    pub fn combine<'a>(exprs: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let parts: Vec<&str> = exprs.into_iter().map(str::trim).filter(|e| !e.is_empty()).collect();
        match parts.len() {
            0 => None,
            1 => Some(Self::new(parts[0])),
            _ => Some(Self::new(format!("({})", parts.join(") and (")))),
        }
    }
}

/// Legacy `deprecated` filter, sent as `{key: value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFilter {
    pub key: String,
    pub value: String,
}

impl DataFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Per-column criteria: one ephemeral output column per entry.
///
/// `groupby` is the criteria family the appliance expects (`ports`,
/// `applications`, `host_groups`, `host_pairs_ports`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryColumns {
    pub groupby: String,
    pub criteria: Vec<Value>,
}

impl QueryColumns {
    pub fn new(groupby: impl Into<String>, criteria: Vec<Value>) -> Self {
        Self {
            groupby: groupby.into(),
            criteria,
        }
    }
}

/// One single-query report request.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub realm: Realm,
    pub centricity: Centricity,
    pub groupby: Groupby,
    pub columns: Vec<ColumnRef>,
    pub sort_column: Option<ColumnRef>,
    pub host_group_type: Option<String>,
    pub area: Option<String>,
    pub query_columns: Option<QueryColumns>,
    pub resolution: Resolution,
    pub time_filter: Option<TimeFilter>,
    pub traffic_filter: Option<TrafficFilter>,
    pub data_filter: Option<DataFilter>,
    pub limit: Option<usize>,
    pub validate_columns: bool,
}

impl ReportSpec {
    pub fn new(realm: Realm, groupby: Groupby, columns: Vec<ColumnRef>) -> Self {
        Self {
            realm,
            centricity: Centricity::Host,
            groupby,
            columns,
            sort_column: None,
            host_group_type: Some(DEFAULT_HOST_GROUP_TYPE.to_string()),
            area: None,
            query_columns: None,
            resolution: Resolution::Auto,
            time_filter: None,
            traffic_filter: None,
            data_filter: None,
            limit: None,
            validate_columns: true,
        }
    }

    pub fn triplet(&self) -> Triplet {
        Triplet::new(self.realm, self.centricity, self.groupby)
    }

    pub fn centricity(mut self, centricity: Centricity) -> Self {
        self.centricity = centricity;
        self
    }

    pub fn sort_by(mut self, column: impl Into<ColumnRef>) -> Self {
        self.sort_column = Some(column.into());
        self
    }

    pub fn host_group_type(mut self, host_group_type: Option<&str>) -> Self {
        self.host_group_type = host_group_type.map(str::to_string);
        self
    }

    pub fn area(mut self, area: &str) -> Self {
        self.area = Some(area.to_string());
        self
    }

    pub fn query_columns(mut self, query_columns: QueryColumns) -> Self {
        self.query_columns = Some(query_columns);
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn time_filter(mut self, time_filter: TimeFilter) -> Self {
        self.time_filter = Some(time_filter);
        self
    }

    pub fn traffic_filter(mut self, traffic_filter: TrafficFilter) -> Self {
        self.traffic_filter = Some(traffic_filter);
        self
    }

    pub fn data_filter(mut self, data_filter: DataFilter) -> Self {
        self.data_filter = Some(data_filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn without_column_validation(mut self) -> Self {
        self.validate_columns = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::column::refs;

    #[test]
    fn test_combine_traffic_filters() {
        assert_eq!(TrafficFilter::combine(["", "  "]), None);
        assert_eq!(TrafficFilter::combine(["host 10.0.0.1"]).unwrap().as_str(), "host 10.0.0.1");
        assert_eq!(
            TrafficFilter::combine(["host 10.0.0.1", "", "port 80"]).unwrap().as_str(),
            "(host 10.0.0.1) and (port 80)"
        );
    }

    #[test]
    fn test_spec_defaults_and_builder() {
        let spec = ReportSpec::new(Realm::TrafficSummary, Groupby::Port, refs(vec!["protoport", "avg_bytes"]))
            .centricity(Centricity::Interface)
            .sort_by("avg_bytes")
            .limit(10);
        assert_eq!(spec.triplet().key(), "traffic_summaryintpor");
        assert_eq!(spec.host_group_type.as_deref(), Some("ByLocation"));
        assert_eq!(spec.sort_column, Some(ColumnRef::ByKey("avg_bytes".to_string())));
        assert!(spec.validate_columns);
        assert!(spec.resolution.is_auto());
        assert_eq!(spec.limit, Some(10));
    }
}

//! Fixed-shape reports built on [`Report`].
//!
//! Each wrapper pins the realm (and usually the groupby) and dereferences to
//! the underlying [`Report`] for status, legend and data access.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::triplets::{Centricity, Groupby, Realm};
use crate::profiler::NetProfiler;
use crate::report::criteria::{DataFilter, QueryColumns, ReportSpec, TrafficFilter, DEFAULT_HOST_GROUP_TYPE};
use crate::report::engine::Report;
use crate::report::time::{Resolution, TimeFilter};

/// Options shared by the fixed-shape reports.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub time_filter: Option<TimeFilter>,
    pub traffic_filter: Option<TrafficFilter>,
    pub resolution: Resolution,
    pub centricity: Centricity,
    pub area: Option<String>,
    pub sort_column: Option<ColumnRef>,
    pub host_group_type: Option<String>,
    pub limit: Option<usize>,
    /// Block until the report completes (or the configured timeout passes).
    pub sync: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            time_filter: None,
            traffic_filter: None,
            resolution: Resolution::Auto,
            centricity: Centricity::Host,
            area: None,
            sort_column: None,
            host_group_type: Some(DEFAULT_HOST_GROUP_TYPE.to_string()),
            limit: None,
            sync: true,
        }
    }
}

impl ReportOptions {
    pub fn time_filter(mut self, time_filter: TimeFilter) -> Self {
        self.time_filter = Some(time_filter);
        self
    }

    pub fn traffic_filter(mut self, traffic_filter: TrafficFilter) -> Self {
        self.traffic_filter = Some(traffic_filter);
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn centricity(mut self, centricity: Centricity) -> Self {
        self.centricity = centricity;
        self
    }

    pub fn area(mut self, area: &str) -> Self {
        self.area = Some(area.to_string());
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

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.sync = false;
        self
    }

    /// Fill a spec with these options.
    pub fn apply(&self, mut spec: ReportSpec) -> ReportSpec {
        spec.centricity = self.centricity;
        spec.time_filter = self.time_filter;
        spec.traffic_filter = self.traffic_filter.clone();
        spec.resolution = self.resolution;
        spec.area = self.area.clone();
        spec.sort_column = self.sort_column.clone();
        spec.host_group_type = self.host_group_type.clone();
        spec.limit = self.limit;
        spec
    }
}

macro_rules! report_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<'a> {
            report: Report<'a>,
        }

        impl<'a> $name<'a> {
            pub fn new(profiler: &'a NetProfiler) -> Self {
                Self {
                    report: Report::new(profiler),
                }
            }

            pub fn into_inner(self) -> Report<'a> {
                self.report
            }
        }

        impl<'a> Deref for $name<'a> {
            type Target = Report<'a>;

            fn deref(&self) -> &Self::Target {
                &self.report
            }
        }

        impl<'a> DerefMut for $name<'a> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.report
            }
        }
    };
}

fn submit(report: &mut Report<'_>, spec: ReportSpec, sync: bool) -> Result<bool> {
    report.run(&spec)?;
    report.finish(sync)
}

report_wrapper!(
    /// Aggregated traffic over any groupby.
    TrafficSummaryReport
);

impl TrafficSummaryReport<'_> {
    pub fn run(&mut self, groupby: Groupby, columns: Vec<ColumnRef>, options: &ReportOptions) -> Result<bool> {
        let spec = options.apply(ReportSpec::new(Realm::TrafficSummary, groupby, columns));
        submit(&mut self.report, spec, options.sync)
    }
}

report_wrapper!(
    /// Time series of overall traffic.
    TrafficOverallTimeSeriesReport
);

impl TrafficOverallTimeSeriesReport<'_> {
    pub fn run(&mut self, columns: Vec<ColumnRef>, options: &ReportOptions) -> Result<bool> {
        let spec = options
            .apply(ReportSpec::new(Realm::TrafficOverallTimeSeries, Groupby::Time, columns))
            .host_group_type(None);
        submit(&mut self.report, spec, options.sync)
    }
}

report_wrapper!(
    /// Time series with one ephemeral column per criteria entry.
    TrafficTimeSeriesReport
);

impl TrafficTimeSeriesReport<'_> {
    /// `columns` holds time plus exactly one value column.
    pub fn run(&mut self, columns: Vec<ColumnRef>, query_columns: QueryColumns, options: &ReportOptions) -> Result<bool> {
        let spec = options
            .apply(ReportSpec::new(Realm::TrafficTimeSeries, Groupby::Time, columns))
            .query_columns(query_columns);
        submit(&mut self.report, spec, options.sync)
    }
}

/// Resolution used by flow list reports unless another is given.
pub const FLOW_LIST_RESOLUTION: Resolution = Resolution::Min1;

report_wrapper!(
    /// Individual flows, grouped by host.
    TrafficFlowListReport
);

impl TrafficFlowListReport<'_> {
    pub fn run(&mut self, columns: Vec<ColumnRef>, resolution: Option<Resolution>, options: &ReportOptions) -> Result<bool> {
        let spec = options
            .apply(ReportSpec::new(Realm::TrafficFlowList, Groupby::Host, columns))
            .centricity(Centricity::Host)
            .resolution(resolution.unwrap_or(FLOW_LIST_RESOLUTION));
        submit(&mut self.report, spec, options.sync)
    }
}

/// Columns of an identity (login event) report.
pub const IDENTITY_COLUMNS: [&str; 9] = [
    "time",
    "username",
    "full_username",
    "login_ok",
    "host_ip",
    "host_dns",
    "host_switch",
    "host_switch_dns",
    "domain",
];

report_wrapper!(
    /// Login events seen by the appliance, optionally for one user.
    IdentityReport
);

impl IdentityReport<'_> {
    pub fn run(&mut self, username: Option<&str>, options: &ReportOptions) -> Result<bool> {
        let columns = IDENTITY_COLUMNS.iter().map(|c| ColumnRef::from(*c)).collect();
        let mut spec = options
            .apply(ReportSpec::new(Realm::IdentityList, Groupby::TimeHostUser, columns))
            .centricity(Centricity::Host);
        if let Some(user) = username {
            spec = spec.data_filter(DataFilter::new("user", user));
        }
        submit(&mut self.report, spec, options.sync)
    }
}

report_wrapper!(
    /// Template report with several named queries.
    MultiQueryReport
);

impl MultiQueryReport<'_> {
    pub fn run(&mut self, template_id: i64, data_filter: Option<&DataFilter>, options: &ReportOptions) -> Result<bool> {
        self.report.run_template(
            template_id,
            options.time_filter.as_ref(),
            options.resolution,
            options.traffic_filter.as_ref(),
            data_filter,
        )?;
        self.report.finish(options.sync)
    }

    /// Ids of the template's queries, in report order.
    pub fn query_names(&mut self) -> Result<Vec<String>> {
        Ok(self.report.queries()?.iter().map(|q| q.id.clone()).collect())
    }

    /// Legend and rows of the query named `name`, or `None` when the template
    /// has no such query.
    pub fn data_by_name(&mut self, name: &str) -> Result<Option<(Vec<Arc<Column>>, Vec<Vec<Value>>)>> {
        let index = match self.report.queries()?.iter().position(|q| q.id == name) {
            Some(index) => index,
            None => return Ok(None),
        };
        let legend = self.report.legend(index, None)?;
        let data = self.report.get_data(index, None, None)?;
        Ok(Some((legend, data)))
    }
}

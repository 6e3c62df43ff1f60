//! Remote report lifecycle.
//!
//! A [`Report`] is created unsubmitted, becomes running once the appliance
//! accepts it and assigns an id, and is completed when a status poll says so.
//! There is no failed state: a poll that runs out of time returns `false` and
//! the report may still finish later.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{ProfilerError, Result};
use crate::logging::structured::LogContext;
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::triplets::Realm;
use crate::profiler::NetProfiler;
use crate::report::criteria::{DataFilter, ReportSpec, TrafficFilter, SINGLE_QUERY_TEMPLATE_ID};
use crate::report::query::Query;
use crate::report::table::Table;
use crate::report::time::{Resolution, TimeFilter};
use crate::report::values::{decode_row, value_to_int};

/// Local view of the remote report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportState {
    Unsubmitted,
    Running,
    Completed,
}

/// Status payload of `GET /reports/{id}.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReportStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub remaining_seconds: f64,
}

impl ReportStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Window of the last five minutes, used when a report names no time frame.
fn default_time_filter() -> TimeFilter {
    TimeFilter::last(chrono::Duration::minutes(5))
}

/// Assemble the `criteria` block of a report submission.
pub fn build_criteria(
    time_filter: &TimeFilter,
    resolution: Resolution,
    query: Option<Value>,
    traffic_filter: Option<&TrafficFilter>,
    data_filter: Option<&DataFilter>,
) -> Value {
    let mut time_frame = Map::new();
    time_frame.insert("start".to_string(), json!(time_filter.start_secs()));
    time_frame.insert("end".to_string(), json!(time_filter.end_secs()));
    if !resolution.is_auto() {
        time_frame.insert("resolution".to_string(), json!(resolution.as_str()));
    }

    let mut criteria = Map::new();
    criteria.insert("time_frame".to_string(), Value::Object(time_frame));
    if let Some(query) = query {
        criteria.insert("query".to_string(), query);
    }
    if let Some(df) = data_filter {
        criteria.insert("deprecated".to_string(), json!({ df.key.clone(): df.value.clone() }));
    }
    if let Some(tf) = traffic_filter {
        criteria.insert("traffic_expression".to_string(), json!(tf.as_str()));
    }
    Value::Object(criteria)
}

/// One report on one appliance.
pub struct Report<'a> {
    profiler: &'a NetProfiler,
    ctx: LogContext,
    id: Option<i64>,
    state: ReportState,
    template_id: Option<i64>,
    custom_columns: bool,
    requested: Vec<ColumnRef>,
    limit: Option<usize>,
    queries: Option<Vec<Query>>,
    last_status: Option<ReportStatus>,
}

impl<'a> Report<'a> {
    pub fn new(profiler: &'a NetProfiler) -> Self {
        Self {
            profiler,
            ctx: profiler.ctx().for_run(),
            id: None,
            state: ReportState::Unsubmitted,
            template_id: None,
            custom_columns: false,
            requested: Vec::new(),
            limit: None,
            queries: None,
            last_status: None,
        }
    }

    pub fn profiler(&self) -> &'a NetProfiler {
        self.profiler
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn state(&self) -> ReportState {
        self.state
    }

    pub fn template_id(&self) -> Option<i64> {
        self.template_id
    }

    pub fn last_status(&self) -> Option<&ReportStatus> {
        self.last_status.as_ref()
    }

    pub fn ctx(&self) -> &LogContext {
        &self.ctx
    }

    /// Columns requested at submission, used as the default legend.
    pub fn requested_columns(&self) -> &[ColumnRef] {
        &self.requested
    }

    fn require_id(&self) -> Result<i64> {
        self.id.ok_or(ProfilerError::NotSubmitted)
    }

    /// Build the `query` block for `spec`, returning it with the columns to
    /// use as the default legend.
    fn build_query(&self, spec: &ReportSpec) -> Result<(Value, Vec<ColumnRef>)> {
        spec.triplet().validate()?;

        let catalog = self.profiler.catalog();
        let mut requested: Vec<ColumnRef> = Vec::new();
        let mut ids: Vec<i64> = Vec::new();
        // Ids of requested non-time columns. Unknown ids passed through
        // unvalidated count as values.
        let mut value_ids: Vec<i64> = Vec::new();

        if spec.validate_columns {
            let resolved = self.profiler.get_columns(&spec.columns, Some(spec.groupby))?;
            ids = resolved.iter().map(|c| c.id).collect();
            requested = resolved.iter().map(ColumnRef::from).collect();
            value_ids = resolved.iter().filter(|c| !c.is_time()).map(|c| c.id).collect();
        } else {
            for column in &spec.columns {
                match (catalog.resolve(column), column) {
                    (Ok(col), _) => {
                        ids.push(col.id);
                        requested.push(ColumnRef::from(&col));
                        if !col.is_time() {
                            value_ids.push(col.id);
                        }
                    }
                    (Err(_), ColumnRef::ById(id)) => {
                        ids.push(*id);
                        requested.push(ColumnRef::ById(*id));
                        value_ids.push(*id);
                    }
                    (Err(e), _) => return Err(e),
                }
            }
        }

        if spec.realm == Realm::TrafficTimeSeries {
            if value_ids.len() != 1 {
                return Err(ProfilerError::InvalidArgument(format!(
                    "traffic_time_series takes exactly one value column besides time, got {}",
                    value_ids.len()
                )));
            }
            ids = value_ids;
        }

        let mut query = Map::new();
        query.insert("realm".to_string(), json!(spec.realm.as_str()));
        query.insert("centricity".to_string(), json!(spec.centricity.as_str()));
        query.insert("group_by".to_string(), json!(spec.groupby.code()));
        query.insert("columns".to_string(), json!(ids));

        if let Some(sort) = &spec.sort_column {
            query.insert("sort_column".to_string(), json!(catalog.resolve(sort)?.id));
        }
        if let Some(area) = &spec.area {
            query.insert("area".to_string(), json!(self.profiler.area_id(area)?));
        }
        let needs_host_group_type = spec.groupby.uses_host_groups() || spec.query_columns.is_some();
        if needs_host_group_type {
            if let Some(hgt) = &spec.host_group_type {
                query.insert("host_group_type".to_string(), json!(hgt));
            }
        }
        if let Some(qc) = &spec.query_columns {
            query.insert(qc.groupby.clone(), Value::Array(qc.criteria.clone()));
        }

        Ok((Value::Object(query), requested))
    }

    fn reset(&mut self) {
        self.ctx = self.profiler.ctx().for_run();
        self.id = None;
        self.state = ReportState::Unsubmitted;
        self.queries = None;
        self.last_status = None;
    }

    fn submit(&mut self, template_id: i64, criteria: Value) -> Result<()> {
        let body = json!({"template_id": template_id, "criteria": criteria});
        log::debug!("{} REPORT_SUBMIT body={}", self.ctx, body);

        let response = self.profiler.api().create_report(&body)?;
        let id = response
            .get("id")
            .and_then(value_to_int)
            .ok_or_else(|| ProfilerError::ReportSubmissionFailed(response.to_string()))?;

        self.id = Some(id);
        self.template_id = Some(template_id);
        self.state = ReportState::Running;
        self.ctx = self.ctx.with_report(id);
        log::info!("{} REPORT_CREATED template={}", self.ctx, template_id);
        Ok(())
    }

    /// Submit a single-query report. Does not wait for completion.
    pub fn run(&mut self, spec: &ReportSpec) -> Result<()> {
        self.reset();
        let (query, requested) = self.build_query(spec)?;
        let time_filter = spec.time_filter.unwrap_or_else(default_time_filter);
        let criteria = build_criteria(
            &time_filter,
            spec.resolution,
            Some(query),
            spec.traffic_filter.as_ref(),
            spec.data_filter.as_ref(),
        );

        self.custom_columns = spec.realm == Realm::TrafficTimeSeries || !spec.validate_columns;
        self.requested = requested;
        self.limit = spec.limit;
        self.submit(SINGLE_QUERY_TEMPLATE_ID, criteria)
    }

    /// Submit a template report. Its queries carry their own columns, which
    /// are taken as reported.
    pub fn run_template(
        &mut self,
        template_id: i64,
        time_filter: Option<&TimeFilter>,
        resolution: Resolution,
        traffic_filter: Option<&TrafficFilter>,
        data_filter: Option<&DataFilter>,
    ) -> Result<()> {
        self.reset();
        let time_filter = time_filter.copied().unwrap_or_else(default_time_filter);
        let criteria = build_criteria(&time_filter, resolution, None, traffic_filter, data_filter);

        self.custom_columns = true;
        self.requested = Vec::new();
        self.limit = None;
        self.submit(template_id, criteria)
    }

    /// Wait with the profiler's configured interval and timeout when `sync`.
    /// Returns whether the report is known to be complete.
    pub fn finish(&mut self, sync: bool) -> Result<bool> {
        if !sync {
            return Ok(self.state == ReportState::Completed);
        }
        let config = self.profiler.config();
        self.wait_for_completion(config.poll_interval(), config.poll_timeout())
    }

    /// Current status, or `None` before submission.
    pub fn status(&mut self) -> Result<Option<ReportStatus>> {
        let id = match self.id {
            Some(id) => id,
            None => return Ok(None),
        };
        let raw = self.profiler.api().report_status(id)?;
        let status: ReportStatus = serde_json::from_value(raw)?;
        if status.is_completed() {
            self.state = ReportState::Completed;
        }
        self.last_status = Some(status.clone());
        Ok(Some(status))
    }

    /// Poll until completed or `timeout` elapses.
    pub fn wait_for_completion(&mut self, interval: Duration, timeout: Duration) -> Result<bool> {
        self.wait_with_progress(interval, timeout, |_| {})
    }

    /// Poll until completed or `timeout` elapses, reporting every status to
    /// `progress`. Never sleeps past the deadline.
    pub fn wait_with_progress<F>(&mut self, interval: Duration, timeout: Duration, mut progress: F) -> Result<bool>
    where
        F: FnMut(&ReportStatus),
    {
        self.require_id()?;
        let deadline = Instant::now() + timeout;
        let mut last_percent: Option<f64> = None;

        loop {
            let status = self.status()?.ok_or(ProfilerError::NotSubmitted)?;
            progress(&status);

            if status.is_completed() {
                log::info!("{} REPORT_COMPLETE", self.ctx);
                return Ok(true);
            }

            if last_percent != Some(status.percent) {
                log::info!(
                    "{} REPORT_PROGRESS percent={} remaining_secs={}",
                    self.ctx,
                    status.percent,
                    status.remaining_seconds
                );
                last_percent = Some(status.percent);
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "{} REPORT_WAIT_TIMEOUT last_percent={}",
                    self.ctx,
                    last_percent.unwrap_or(0.0)
                );
                return Ok(false);
            }
            thread::sleep(interval.min(deadline - now));
        }
    }

    fn load_queries(&mut self) -> Result<()> {
        if self.queries.is_some() {
            return Ok(());
        }
        let id = self.require_id()?;
        let raw = self.profiler.api().report_queries(id)?;
        let catalog = self.profiler.catalog();
        let queries = raw
            .iter()
            .map(|q| Query::from_json(q, catalog, self.custom_columns))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("{} REPORT_QUERIES_LOADED count={}", self.ctx, queries.len());
        self.queries = Some(queries);
        Ok(())
    }

    /// Sub-queries, loaded on first access.
    pub fn queries(&mut self) -> Result<&[Query]> {
        self.load_queries()?;
        Ok(self.queries.as_deref().unwrap_or_default())
    }

    pub fn query(&mut self, index: usize) -> Result<&Query> {
        self.query_mut(index).map(|q| &*q)
    }

    fn query_mut(&mut self, index: usize) -> Result<&mut Query> {
        self.load_queries()?;
        self.queries
            .as_mut()
            .and_then(|qs| qs.get_mut(index))
            .ok_or(ProfilerError::QueryNotFound(index))
    }

    /// Resolved legend for query `index`. Without `columns`, the columns
    /// requested at submission are used, or every available column when
    /// none were.
    pub fn legend(&mut self, index: usize, columns: Option<&[ColumnRef]>) -> Result<Vec<Arc<Column>>> {
        let profiler = self.profiler;
        let mut requested = columns.map(<[ColumnRef]>::to_vec).unwrap_or_else(|| self.requested.clone());
        let query = self.query_mut(index)?;
        if requested.is_empty() {
            requested = query.all_columns();
        }
        query.legend(profiler.catalog(), &requested)
    }

    /// Decoded rows of query `index`.
    pub fn get_data(&mut self, index: usize, columns: Option<&[ColumnRef]>, limit: Option<usize>) -> Result<Vec<Vec<Value>>> {
        let legend = self.legend(index, columns)?;
        self.rows_for_legend(index, &legend, limit)
    }

    fn rows_for_legend(&mut self, index: usize, legend: &[Arc<Column>], limit: Option<usize>) -> Result<Vec<Vec<Value>>> {
        let id = self.require_id()?;
        let limit = limit.or(self.limit);
        let profiler = self.profiler;
        let ctx = self.ctx.clone();

        let query = self.query_mut(index)?;
        let data = query.fetch(profiler.api(), id, legend, limit, &ctx)?;
        Ok(data
            .data
            .iter()
            .cloned()
            .map(|row| decode_row(row, legend))
            .collect())
    }

    /// Decoded totals row of query `index`.
    pub fn get_totals(&mut self, index: usize, columns: Option<&[ColumnRef]>) -> Result<Vec<Value>> {
        let legend = self.legend(index, columns)?;
        let id = self.require_id()?;
        let limit = self.limit;
        let profiler = self.profiler;
        let ctx = self.ctx.clone();

        let query = self.query_mut(index)?;
        let data = query.fetch(profiler.api(), id, &legend, limit, &ctx)?;
        Ok(decode_row(data.totals.clone(), &legend))
    }

    /// Rows of query `index` with column names. Ephemeral columns are named
    /// by their label since they share their base's key.
    pub fn get_table(&mut self, index: usize, columns: Option<&[ColumnRef]>, limit: Option<usize>) -> Result<Table> {
        let legend = self.legend(index, columns)?;
        let rows = self.rows_for_legend(index, &legend, limit)?;
        let names = legend
            .iter()
            .map(|c| if c.ephemeral { c.label.clone() } else { c.key.clone() })
            .collect();
        Ok(Table::new(names, rows))
    }

    /// Ask the appliance to discard the report. Failures are ignored.
    pub fn delete(&mut self) {
        let id = match self.id {
            Some(id) => id,
            None => return,
        };
        match self.profiler.api().delete_report(id) {
            Ok(()) => log::info!("{} REPORT_DELETED", self.ctx),
            Err(e) => log::debug!("{} REPORT_DELETE_IGNORED error={}", self.ctx, e),
        }
        self.id = None;
        self.state = ReportState::Unsubmitted;
        self.queries = None;
    }

    /// Borrow this report behind a guard that deletes it when dropped.
    pub fn auto_delete(&mut self) -> ReportGuard<'_, 'a> {
        ReportGuard { report: self }
    }
}

/// Deletes the wrapped report on drop, including during unwinding.
pub struct ReportGuard<'r, 'a> {
    report: &'r mut Report<'a>,
}

impl<'a> Deref for ReportGuard<'_, 'a> {
    type Target = Report<'a>;

    fn deref(&self) -> &Self::Target {
        self.report
    }
}

impl<'a> DerefMut for ReportGuard<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.report
    }
}

impl Drop for ReportGuard<'_, '_> {
    fn drop(&mut self) {
        self.report.delete();
    }
}

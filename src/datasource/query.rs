use std::thread;
use std::time::Instant;

use serde_json::Value;

use crate::datasource::{DeviceTable, Job, QueryCriteria, QueryOutcome, TableDefinition, NO_DEVICE_SELECTED};
use crate::error::{ProfilerError, Result};
use crate::logging::structured::LogContext;
use crate::profiler::NetProfiler;
use crate::report::criteria::ReportSpec;
use crate::report::engine::Report;
use crate::report::table::Table;
use crate::report::top_n::{TopNRequest, TopNTimeSeries};
use crate::{log_info, log_warn};

fn require_profiler<'p>(profiler: Option<&'p NetProfiler>, job: &mut dyn Job) -> Option<&'p NetProfiler> {
    if profiler.is_none() {
        log::debug!("DATASOURCE_NO_DEVICE");
        job.mark_error(NO_DEVICE_SELECTED);
    }
    profiler
}

fn spec_for(table: &TableDefinition, criteria: &QueryCriteria) -> ReportSpec {
    let mut spec = ReportSpec::new(table.realm, table.groupby, table.column_refs())
        .centricity(table.centricity())
        .time_filter(criteria.time_filter)
        .resolution(criteria.resolution);
    if let Some(sort) = &table.sort_column {
        spec = spec.sort_by(sort.as_str());
    }
    if let Some(tf) = &criteria.traffic_filter {
        spec = spec.traffic_filter(tf.clone());
    }
    if let Some(df) = &criteria.data_filter {
        spec = spec.data_filter(df.clone());
    }
    spec
}

/// Poll until complete, taking the lock only around each status call.
/// Returns false when the configured timeout elapses first.
fn poll_locked(profiler: &NetProfiler, report: &mut Report<'_>, job: &mut dyn Job) -> Result<bool> {
    let config = profiler.config();
    let interval = config.poll_interval();
    let deadline = Instant::now() + config.poll_timeout();

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        thread::sleep(interval.min(deadline - now));

        let status = {
            let _guard = profiler.lock();
            report.status()?
        };
        let status = status.ok_or(ProfilerError::NotSubmitted)?;
        job.progress(status.percent);
        if status.is_completed() {
            return Ok(true);
        }
    }
}

/// Fetch the first query's table and push its actual window to the job.
fn fetch_locked(profiler: &NetProfiler, report: &mut Report<'_>, table: &TableDefinition, select: bool, job: &mut dyn Job) -> Result<Table> {
    let _guard = profiler.lock();
    let data = if select && !table.columns.is_empty() {
        let columns = table.column_refs();
        report.get_table(0, Some(columns.as_slice()), None)?
    } else {
        report.get_table(0, None, None)?
    };
    if let Some((start, end)) = report.query(0)?.actual_window() {
        job.set_actual_window(start, end);
    }
    Ok(data)
}

fn submit_poll_fetch<'a, S>(
    profiler: &'a NetProfiler,
    report: &mut Report<'a>,
    table: &TableDefinition,
    select: bool,
    job: &mut dyn Job,
    submit: S,
) -> Result<Option<Table>>
where
    S: FnOnce(&mut Report<'a>) -> Result<()>,
{
    {
        let _guard = profiler.lock();
        submit(report)?;
    }
    if !poll_locked(profiler, report, job)? {
        return Ok(None);
    }
    fetch_locked(profiler, report, table, select, job).map(Some)
}

/// Submit under the lock, poll, then fetch. The report is deleted
/// afterwards whatever the result.
fn execute<'a, S>(
    profiler: &'a NetProfiler,
    report: &mut Report<'a>,
    table: &TableDefinition,
    select: bool,
    job: &mut dyn Job,
    submit: S,
) -> Result<Option<Table>>
where
    S: FnOnce(&mut Report<'a>) -> Result<()>,
{
    let result = submit_poll_fetch(profiler, report, table, select, job, submit);
    let _guard = profiler.lock();
    report.delete();
    result
}

fn settle(ctx: &LogContext, rows: usize, result: Result<Option<Table>>, job: &mut dyn Job) -> QueryOutcome {
    match result {
        Ok(Some(mut data)) => {
            if rows > 0 {
                data.truncate(rows);
            }
            log_info!(ctx, "DATASOURCE_COMPLETE", rows = data.len());
            QueryOutcome::Complete(data)
        }
        Ok(None) => {
            let message = "Report did not complete before the poll timeout".to_string();
            log_warn!(ctx, "DATASOURCE_TIMEOUT");
            job.mark_error(&message);
            QueryOutcome::Failed(message)
        }
        Err(e) => {
            let message = e.to_string();
            log_warn!(ctx, "DATASOURCE_FAILED", error = message);
            job.mark_error(&message);
            QueryOutcome::Failed(message)
        }
    }
}

/// Run a single-query report for `table` and return its rows.
///
/// Submission, each status poll and the final fetch each take the
/// profiler's lock. The report is removed from the appliance afterwards.
pub fn run_table_query(
    profiler: Option<&NetProfiler>,
    table: &TableDefinition,
    criteria: &QueryCriteria,
    job: &mut dyn Job,
) -> QueryOutcome {
    let profiler = match require_profiler(profiler, job) {
        Some(p) => p,
        None => return QueryOutcome::Failed(NO_DEVICE_SELECTED.to_string()),
    };
    let spec = spec_for(table, criteria);
    let mut report = Report::new(profiler);
    log_info!(
        report.ctx(),
        "DATASOURCE_RUN",
        realm = table.realm.as_str(),
        groupby = table.groupby.code(),
        start = criteria.time_filter.start_secs(),
        end = criteria.time_filter.end_secs(),
    );

    let result = execute(profiler, &mut report, table, false, job, |r| r.run(&spec));
    let ctx = report.ctx().clone();
    settle(&ctx, table.rows, result, job)
}

/// Run a saved template and keep only `table`'s columns from its first
/// query. An empty column list keeps everything the query returned.
pub fn run_template_query(
    profiler: Option<&NetProfiler>,
    template_id: i64,
    table: &TableDefinition,
    criteria: &QueryCriteria,
    job: &mut dyn Job,
) -> QueryOutcome {
    let profiler = match require_profiler(profiler, job) {
        Some(p) => p,
        None => return QueryOutcome::Failed(NO_DEVICE_SELECTED.to_string()),
    };
    let mut report = Report::new(profiler);
    log_info!(report.ctx(), "DATASOURCE_TEMPLATE_RUN", template = template_id);

    let result = execute(profiler, &mut report, table, true, job, |r| {
        r.run_template(
            template_id,
            Some(&criteria.time_filter),
            criteria.resolution,
            criteria.traffic_filter.as_ref(),
            criteria.data_filter.as_ref(),
        )
    });
    let ctx = report.ctx().clone();
    settle(&ctx, table.rows, result, job)
}

/// Run a top-N time series. The sub-reports share one lock hold, so other
/// workers wait until the whole series is assembled.
pub fn run_top_n_query(
    profiler: Option<&NetProfiler>,
    request: &TopNRequest,
    rows: usize,
    job: &mut dyn Job,
) -> QueryOutcome {
    let profiler = match require_profiler(profiler, job) {
        Some(p) => p,
        None => return QueryOutcome::Failed(NO_DEVICE_SELECTED.to_string()),
    };
    let ctx = profiler.ctx().for_run();
    log_info!(ctx, "DATASOURCE_TOP_N_RUN", groupby = request.kind.groupby().code(), n = request.n);

    let result = {
        let _guard = profiler.lock();
        TopNTimeSeries::new(profiler).run(request, |percent| job.progress(percent))
    };
    settle(&ctx, rows, result.map(Some), job)
}

/// Project device listings onto `columns`. A requested field that no
/// device carries is an error.
fn device_rows(devices: &[Value], columns: &[String]) -> Result<Table> {
    if let Some(missing) = columns
        .iter()
        .find(|col| !devices.is_empty() && devices.iter().all(|d| d.get(col.as_str()).is_none()))
    {
        return Err(ProfilerError::InvalidArgument(format!(
            "devices table has no column '{}'",
            missing
        )));
    }
    let rows = devices
        .iter()
        .map(|d| {
            columns
                .iter()
                .map(|col| d.get(col.as_str()).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(Table::new(columns.to_vec(), rows))
}

/// List the appliance's devices as a table, one row per device.
pub fn run_device_query(profiler: Option<&NetProfiler>, table: &DeviceTable, job: &mut dyn Job) -> QueryOutcome {
    let profiler = match require_profiler(profiler, job) {
        Some(p) => p,
        None => return QueryOutcome::Failed(NO_DEVICE_SELECTED.to_string()),
    };
    let ctx = profiler.ctx().for_run();
    log_info!(ctx, "DATASOURCE_DEVICES_RUN", type_id = table.type_id.unwrap_or(0));

    let devices = {
        let _guard = profiler.lock();
        profiler.api().devices(table.type_id, table.cidr.as_deref())
    };
    let result = devices.and_then(|devices| device_rows(&devices, &table.selected_columns()));
    if result.is_ok() {
        job.progress(100.0);
    }
    settle(&ctx, table.rows, result.map(Some), job)
}

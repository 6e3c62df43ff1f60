//! Top-N time series.
//!
//! Up to three sub-reports run back to back: a traffic summary to discover
//! the top N items (skipped when criteria are supplied), the per-item time
//! series, and an overall time series used to derive an `other` column.
//! Progress of sub-run `i` of `n` is reported within `[i*100/n, (i+1)*100/n]`.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::error::{ProfilerError, Result};
use crate::metadata::column::ColumnRef;
use crate::metadata::triplets::{Groupby, Realm};
use crate::profiler::NetProfiler;
use crate::report::criteria::{QueryColumns, ReportSpec};
use crate::report::engine::Report;
use crate::report::table::Table;
use crate::report::values::{value_to_float, value_to_int, value_to_string};
use crate::report::variants::ReportOptions;

/// What the top-N items are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopNKind {
    Port,
    Application,
    HostGroup,
    HostPairPort,
}

impl TopNKind {
    pub fn groupby(&self) -> Groupby {
        match self {
            TopNKind::Port => Groupby::Port,
            TopNKind::Application => Groupby::Application,
            TopNKind::HostGroup => Groupby::HostGroup,
            TopNKind::HostPairPort => Groupby::HostPairProtoport,
        }
    }

    /// Name of the per-column criteria family in the query block.
    pub fn criteria_key(&self) -> &'static str {
        match self {
            TopNKind::Port => "ports",
            TopNKind::Application => "applications",
            TopNKind::HostGroup => "host_groups",
            TopNKind::HostPairPort => "host_pairs_ports",
        }
    }

    /// Key columns requested from the discovery summary, in row order.
    fn key_columns(&self) -> &'static [&'static str] {
        match self {
            TopNKind::Port => &["protoport", "protocol", "port"],
            TopNKind::Application => &["app_name"],
            TopNKind::HostGroup => &["group_name"],
            TopNKind::HostPairPort => &["cli_host_ip", "srv_host_ip", "protoport"],
        }
    }

    /// Criteria entry for one discovery row.
    fn criteria_from_row(&self, row: &[Value]) -> Result<Value> {
        let text = |i: usize| row.get(i).map(value_to_string).unwrap_or_default();
        match self {
            TopNKind::Port => Ok(json!({"name": port_name(&text(0), row.get(2))?})),
            TopNKind::Application | TopNKind::HostGroup => Ok(json!({"name": text(0)})),
            TopNKind::HostPairPort => Ok(json!({
                "client_host": {"ipaddr": text(0)},
                "server_host": {"ipaddr": text(1)},
                "protoport": {"name": port_name(&text(2), None)?},
            })),
        }
    }
}

/// Protoport name the appliance accepts as criteria.
///
/// Summary rows report ICMP as `icmp/<type>/<code>` but criteria need type
/// and code packed into one number, `(type << 8) | code`. A numeric port
/// column is already packed and takes precedence.
pub fn port_name(protoport: &str, port: Option<&Value>) -> Result<String> {
    if !protoport.starts_with("icmp") {
        return Ok(protoport.to_string());
    }
    if let Some(packed) = port.and_then(value_to_int) {
        return Ok(format!("icmp/{}", packed));
    }
    let parts: Vec<&str> = protoport.split('/').collect();
    match parts.as_slice() {
        [proto, ty, code] => {
            let parse = |s: &str| {
                s.parse::<i64>()
                    .map_err(|_| ProfilerError::InvalidArgument(format!("bad icmp protoport {}", protoport)))
            };
            Ok(format!("{}/{}", proto, (parse(ty)? << 8) | parse(code)?))
        }
        _ => Ok(protoport.to_string()),
    }
}

/// Split `"<type>:<group>"` into the host group type and its criteria entry.
pub fn parse_host_group(spec: &str) -> Result<(String, Value)> {
    match spec.split_once(':') {
        Some((ty, group)) if !ty.is_empty() && !group.is_empty() => Ok((ty.to_string(), json!({"name": group}))),
        _ => Err(ProfilerError::InvalidArgument(format!(
            "host group must be <type>:<group>, got {}",
            spec
        ))),
    }
}

/// Progress of sub-run `index` of `count`, mapped into its slice of 0..100.
pub fn slice_progress(index: usize, count: usize, percent: f64) -> f64 {
    let count = count.max(1) as f64;
    (index as f64 * 100.0 + percent.clamp(0.0, 100.0)) / count
}

/// Append `other = total - sum(named)` per timestamp. `table` starts with
/// the time column; `overall` holds (time, total) rows.
pub fn add_other_column(table: &mut Table, overall: &[Vec<Value>]) {
    let totals: HashMap<String, f64> = overall
        .iter()
        .filter_map(|row| Some((value_to_string(row.first()?), value_to_float(row.get(1)?)?)))
        .collect();

    table.columns.push("other".to_string());
    for row in table.rows.iter_mut() {
        let time = row.first().map(value_to_string).unwrap_or_default();
        let named: f64 = row.iter().skip(1).filter_map(value_to_float).sum();
        let other = totals.get(&time).map(|total| json!(total - named)).unwrap_or(Value::Null);
        row.push(other);
    }
}

#[derive(Debug, Clone)]
pub struct TopNRequest {
    pub kind: TopNKind,
    /// Metric ranked and charted, e.g. `avg_bytes`.
    pub value_column: ColumnRef,
    pub n: usize,
    /// Explicit criteria; discovery runs when `None`. Host group entries may
    /// be `"<type>:<group>"` strings.
    pub criteria: Option<Vec<Value>>,
    pub include_other: bool,
    pub options: ReportOptions,
}

impl TopNRequest {
    pub fn new(kind: TopNKind, value_column: impl Into<ColumnRef>, n: usize) -> Self {
        Self {
            kind,
            value_column: value_column.into(),
            n,
            criteria: None,
            include_other: false,
            options: ReportOptions::default(),
        }
    }

    pub fn criteria(mut self, criteria: Vec<Value>) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn include_other(mut self) -> Self {
        self.include_other = true;
        self
    }

    pub fn options(mut self, options: ReportOptions) -> Self {
        self.options = options;
        self
    }
}

pub struct TopNTimeSeries<'a> {
    profiler: &'a NetProfiler,
}

impl<'a> TopNTimeSeries<'a> {
    pub fn new(profiler: &'a NetProfiler) -> Self {
        Self { profiler }
    }

    /// Run one sub-report to completion and return its first query's table.
    /// A sub-report still running at the poll timeout is an error and its
    /// data is never fetched. The remote report is deleted afterwards.
    fn sub_run<P>(&self, spec: &ReportSpec, index: usize, count: usize, progress: &mut P) -> Result<Table>
    where
        P: FnMut(f64),
    {
        let config = self.profiler.config();
        let mut report = Report::new(self.profiler);
        let mut report = report.auto_delete();
        report.run(spec)?;
        let done = report.wait_with_progress(config.poll_interval(), config.poll_timeout(), |status| {
            progress(slice_progress(index, count, status.percent))
        })?;
        if !done {
            log::warn!("{} TOPN_SUBRUN_INCOMPLETE index={}", report.ctx(), index);
            return Err(ProfilerError::ReportTimedOut(report.id().unwrap_or_default()));
        }
        report.get_table(0, None, None)
    }

    /// Resolve criteria (discovering them when needed) and the host group
    /// type to send with them.
    fn criteria<P>(&self, request: &TopNRequest, count: usize, progress: &mut P) -> Result<(Vec<Value>, Option<String>)>
    where
        P: FnMut(f64),
    {
        let hgt = request.options.host_group_type.clone();
        if let Some(criteria) = &request.criteria {
            if request.kind != TopNKind::HostGroup {
                return Ok((criteria.clone(), hgt));
            }
            let mut types = Vec::new();
            let mut parsed = Vec::with_capacity(criteria.len());
            for entry in criteria {
                match entry {
                    Value::String(s) => {
                        let (ty, group) = parse_host_group(s)?;
                        if !types.contains(&ty) {
                            types.push(ty);
                        }
                        parsed.push(group);
                    }
                    other => parsed.push(other.clone()),
                }
            }
            if types.len() > 1 {
                return Err(ProfilerError::InvalidArgument(format!(
                    "host groups span several types: {}",
                    types.join(", ")
                )));
            }
            return Ok((parsed, types.pop().or(hgt)));
        }

        let mut columns: Vec<ColumnRef> = request.kind.key_columns().iter().map(|c| ColumnRef::from(*c)).collect();
        columns.push(request.value_column.clone());
        let spec = request
            .options
            .apply(ReportSpec::new(Realm::TrafficSummary, request.kind.groupby(), columns))
            .sort_by(request.value_column.clone())
            .limit(request.n);
        let table = self.sub_run(&spec, 0, count, progress)?;
        let criteria = table
            .rows
            .iter()
            .take(request.n)
            .map(|row| request.kind.criteria_from_row(row))
            .collect::<Result<Vec<_>>>()?;
        Ok((criteria, hgt))
    }

    /// Time series with one column per top item, plus `other` when asked.
    pub fn run<P>(&self, request: &TopNRequest, mut progress: P) -> Result<Table>
    where
        P: FnMut(f64),
    {
        let count = usize::from(request.criteria.is_none()) + 1 + usize::from(request.include_other);
        let mut index = usize::from(request.criteria.is_none());

        let (criteria, hgt) = self.criteria(request, count, &mut progress)?;
        log::info!(
            "{} TOPN_CRITERIA kind={:?} count={}",
            self.profiler.ctx(),
            request.kind,
            criteria.len()
        );
        if criteria.is_empty() {
            progress(100.0);
            return Ok(Table::new(vec!["time".to_string()], Vec::new()));
        }

        let time_columns = vec![ColumnRef::from("time"), request.value_column.clone()];
        let mut ts_options = request.options.clone();
        ts_options.sort_column = None;
        let spec = ts_options
            .apply(ReportSpec::new(Realm::TrafficTimeSeries, Groupby::Time, time_columns.clone()))
            .host_group_type(hgt.as_deref())
            .query_columns(QueryColumns::new(request.kind.criteria_key(), criteria));
        let mut table = self.sub_run(&spec, index, count, &mut progress)?;
        index += 1;

        if request.include_other {
            let spec = ts_options
                .apply(ReportSpec::new(Realm::TrafficOverallTimeSeries, Groupby::Time, time_columns))
                .host_group_type(None);
            let overall = self.sub_run(&spec, index, count, &mut progress)?;
            add_other_column(&mut table, &overall.rows);
        }

        progress(100.0);
        Ok(table)
    }
}

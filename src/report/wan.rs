//! WAN optimization reports.
//!
//! The same traffic is measured twice: once filtered to the LAN-side
//! interfaces and once to the WAN-side ones. Rows are joined on their key
//! columns, and in/out columns are renamed `LAN_` / `WAN_` according to the
//! traffic direction:
//!
//! | direction | LAN side | WAN side |
//! |-----------|----------|----------|
//! | inbound   | `out_`   | `in_`    |
//! | outbound  | `in_`    | `out_`   |

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{ProfilerError, Result};
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::triplets::{Centricity, Groupby, Realm, Triplet};
use crate::profiler::NetProfiler;
use crate::report::criteria::{DataFilter, ReportSpec, TrafficFilter};
use crate::report::engine::Report;
use crate::report::table::Table;
use crate::report::time::TimeFilter;
use crate::report::values::{value_to_float, value_to_string};
use crate::report::variants::ReportOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Column prefixes kept on the (LAN, WAN) side.
    fn prefixes(&self) -> (&'static str, &'static str) {
        match self {
            Direction::Inbound => ("out_", "in_"),
            Direction::Outbound => ("in_", "out_"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl FromStr for Direction {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(ProfilerError::InvalidArgument(format!(
                "invalid direction {} for WAN report",
                other
            ))),
        }
    }
}

fn base_key(key: &str) -> &str {
    key.strip_prefix("in_")
        .or_else(|| key.strip_prefix("out_"))
        .unwrap_or(key)
}

/// Replace each column by its `in_` / `out_` pair when the triplet has both.
fn expand_in_out(profiler: &NetProfiler, triplet: &Triplet, columns: &[ColumnRef]) -> Result<Vec<Arc<Column>>> {
    let available: HashSet<String> = profiler
        .search_columns(Some(&[triplet.realm]), Some(&[triplet.centricity]), Some(&[triplet.groupby]))
        .into_iter()
        .map(|c| c.key.clone())
        .collect();

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for col in profiler.get_columns(columns, None)? {
        let key = base_key(&col.key).to_string();
        if !seen.insert(key.clone()) {
            continue;
        }
        let in_key = format!("in_{}", key);
        let out_key = format!("out_{}", key);
        if available.contains(&in_key) && available.contains(&out_key) {
            result.extend(profiler.get_columns(&[in_key.into(), out_key.into()], None)?);
        } else {
            result.push(col);
        }
    }
    Ok(result)
}

/// Join LAN and WAN rows on the key columns, keeping each side's directional
/// columns.
fn align(direction: Direction, columns: &[Arc<Column>], lan: &[Vec<Value>], wan: &[Vec<Value>]) -> Table {
    let (lan_prefix, wan_prefix) = direction.prefixes();
    let is_directional = |key: &str| key.starts_with("in_") || key.starts_with("out_");

    let key_idx: Vec<usize> = (0..columns.len()).filter(|i| columns[*i].iskey).collect();
    let lan_idx: Vec<usize> = (0..columns.len())
        .filter(|i| {
            let key = &columns[*i].key;
            !columns[*i].iskey && (key.starts_with(lan_prefix) || !is_directional(key))
        })
        .collect();
    let wan_idx: Vec<usize> = (0..columns.len())
        .filter(|i| !columns[*i].iskey && columns[*i].key.starts_with(wan_prefix))
        .collect();

    let mut names: Vec<String> = key_idx.iter().map(|i| columns[*i].key.clone()).collect();
    names.extend(lan_idx.iter().map(|i| columns[*i].key.replacen(lan_prefix, "LAN_", 1)));
    names.extend(wan_idx.iter().map(|i| columns[*i].key.replacen(wan_prefix, "WAN_", 1)));

    let row_key = |row: &Vec<Value>| -> Vec<String> {
        key_idx
            .iter()
            .map(|i| row.get(*i).map(value_to_string).unwrap_or_default())
            .collect()
    };
    let cell = |row: &Vec<Value>, i: usize| row.get(i).cloned().unwrap_or(Value::Null);

    let mut wan_by_key: HashMap<Vec<String>, Vec<&Vec<Value>>> = HashMap::new();
    for row in wan {
        wan_by_key.entry(row_key(row)).or_default().push(row);
    }

    let mut rows = Vec::new();
    for lan_row in lan {
        let matches = match wan_by_key.get(&row_key(lan_row)) {
            Some(m) => m,
            None => continue,
        };
        for &wan_row in matches {
            let mut out: Vec<Value> = key_idx.iter().map(|i| cell(lan_row, *i)).collect();
            out.extend(lan_idx.iter().map(|i| cell(lan_row, *i)));
            out.extend(wan_idx.iter().map(|i| cell(wan_row, *i)));
            rows.push(out);
        }
    }
    Table::new(names, rows)
}

/// Append `<x>_reduct` (LAN minus WAN) and `<x>_reduct_pct` (reduction over
/// LAN) for every `LAN_x` / `WAN_x` pair. Non-numeric or zero-LAN cells give
/// null.
fn add_reductions(table: &mut Table, reduction: bool, percentage: bool) {
    let pairs: Vec<(String, usize, usize)> = table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(li, name)| {
            let base = name.strip_prefix("LAN_")?;
            let wi = table.column_index(&format!("WAN_{}", base))?;
            Some((base.to_string(), li, wi))
        })
        .collect();

    for (base, li, wi) in pairs {
        let values: Vec<(Option<f64>, Option<f64>)> = table
            .rows
            .iter()
            .map(|row| (row.get(li).and_then(value_to_float), row.get(wi).and_then(value_to_float)))
            .collect();

        if reduction {
            table.columns.push(format!("{}_reduct", base));
            for (row, (lan, wan)) in table.rows.iter_mut().zip(&values) {
                row.push(match (lan, wan) {
                    (Some(l), Some(w)) => json!(l - w),
                    _ => Value::Null,
                });
            }
        }
        if percentage {
            table.columns.push(format!("{}_reduct_pct", base));
            for (row, (lan, wan)) in table.rows.iter_mut().zip(&values) {
                row.push(match (lan, wan) {
                    (Some(l), Some(w)) if *l != 0.0 => json!((l - w) / l),
                    _ => Value::Null,
                });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RunKey {
    time_filter: TimeFilter,
    traffic_filter: Option<TrafficFilter>,
    column_ids: Vec<i64>,
    lan: Vec<String>,
    wan: Vec<String>,
}

/// Shared machinery: one report reused for the LAN and WAN runs, with the
/// last pair of results kept for a repeat run over the same inputs.
struct WanRunner<'a> {
    report: Report<'a>,
    cached: Option<(RunKey, Vec<Vec<Value>>, Vec<Vec<Value>>)>,
}

impl<'a> WanRunner<'a> {
    fn new(profiler: &'a NetProfiler) -> Self {
        Self {
            report: Report::new(profiler),
            cached: None,
        }
    }

    fn run_side(&mut self, triplet: &Triplet, columns: &[Arc<Column>], interfaces: &[String], options: &ReportOptions) -> Result<Vec<Vec<Value>>> {
        let refs: Vec<ColumnRef> = columns.iter().map(ColumnRef::from).collect();
        let spec = options
            .apply(ReportSpec::new(triplet.realm, triplet.groupby, refs))
            .centricity(triplet.centricity)
            .data_filter(DataFilter::new("interfaces_a", interfaces.join(",")));
        self.report.run(&spec)?;
        if !self.report.finish(true)? {
            log::warn!("{} WAN_SIDE_INCOMPLETE interfaces={}", self.report.ctx(), interfaces.join(","));
        }
        self.report.get_data(0, None, None)
    }

    /// LAN and WAN rows, WAN run first.
    fn run_pair(
        &mut self,
        triplet: &Triplet,
        columns: &[Arc<Column>],
        lan: &[String],
        wan: &[String],
        options: &ReportOptions,
    ) -> Result<(Vec<Vec<Value>>, Vec<Vec<Value>>)> {
        let key = options.time_filter.map(|time_filter| RunKey {
            time_filter,
            traffic_filter: options.traffic_filter.clone(),
            column_ids: columns.iter().map(|c| c.id).collect(),
            lan: lan.to_vec(),
            wan: wan.to_vec(),
        });

        if let (Some(key), Some((cached_key, lan_rows, wan_rows))) = (&key, &self.cached) {
            if key == cached_key {
                log::debug!("{} WAN_CACHE_HIT", self.report.ctx());
                return Ok((lan_rows.clone(), wan_rows.clone()));
            }
        }

        let wan_rows = self.run_side(triplet, columns, wan, options)?;
        let lan_rows = self.run_side(triplet, columns, lan, options)?;
        if let Some(key) = key {
            self.cached = Some((key, lan_rows.clone(), wan_rows.clone()));
        }
        Ok((lan_rows, wan_rows))
    }

    /// LAN and WAN interface addresses of a device, found by interface name.
    fn interfaces(&mut self, device_ip: &str) -> Result<(Vec<String>, Vec<String>)> {
        let spec = ReportSpec::new(
            Realm::TrafficSummary,
            Groupby::Interface,
            vec!["interface_dns".into(), "interface".into()],
        )
        .centricity(Centricity::Interface)
        .time_filter(TimeFilter::last(chrono::Duration::hours(1)))
        .traffic_filter(TrafficFilter::new(format!("device {}", device_ip)));
        self.report.run(&spec)?;
        self.report.finish(true)?;

        let mut lan = Vec::new();
        let mut wan = Vec::new();
        for row in self.report.get_data(0, None, None)? {
            let name = row.first().map(value_to_string).unwrap_or_default();
            let address = row.get(1).map(value_to_string).unwrap_or_default();
            if name.contains("lan") {
                lan.push(address.clone());
            }
            if name.contains("wan") {
                wan.push(address);
            }
        }

        if lan.is_empty() || wan.is_empty() {
            return Err(ProfilerError::InvalidArgument(format!(
                "unable to determine LAN and WAN interfaces for device {}",
                device_ip
            )));
        }
        log::info!(
            "{} WAN_INTERFACES device={} lan={} wan={}",
            self.report.ctx(),
            device_ip,
            lan.join(","),
            wan.join(",")
        );
        Ok((lan, wan))
    }
}

fn with_default_window(options: &ReportOptions) -> ReportOptions {
    let mut options = options.clone();
    if options.time_filter.is_none() {
        options.time_filter = Some(TimeFilter::last(chrono::Duration::hours(1)));
    }
    options
}

/// LAN vs WAN traffic summary, keyed by any groupby (interface by default).
pub struct WanSummaryReport<'a> {
    runner: WanRunner<'a>,
    table: Option<Table>,
}

impl<'a> WanSummaryReport<'a> {
    pub fn new(profiler: &'a NetProfiler) -> Self {
        Self {
            runner: WanRunner::new(profiler),
            table: None,
        }
    }

    pub fn interfaces(&mut self, device_ip: &str) -> Result<(Vec<String>, Vec<String>)> {
        self.runner.interfaces(device_ip)
    }

    /// `columns` name the undirected metric (`avg_bytes`), which is expanded
    /// into its `in_` / `out_` pair where the appliance has one.
    pub fn run(
        &mut self,
        lan_interfaces: &[String],
        wan_interfaces: &[String],
        direction: Direction,
        columns: Vec<ColumnRef>,
        groupby: Option<Groupby>,
        options: &ReportOptions,
    ) -> Result<()> {
        let triplet = Triplet::new(Realm::TrafficSummary, Centricity::Interface, groupby.unwrap_or(Groupby::Interface));
        triplet.validate()?;
        let profiler = self.runner.report.profiler();
        let columns = expand_in_out(profiler, &triplet, &columns)?;
        let options = with_default_window(options);

        let (lan, wan) = self.runner.run_pair(&triplet, &columns, lan_interfaces, wan_interfaces, &options)?;
        let table = align(direction, &columns, &lan, &wan);
        log::info!(
            "{} WAN_SUMMARY_READY direction={} rows={}",
            self.runner.report.ctx(),
            direction,
            table.len()
        );
        self.table = Some(table);
        Ok(())
    }

    /// Joined table, optionally with reduction columns appended.
    pub fn get_data(&self, calc_reduction: bool, calc_percentage: bool) -> Result<Table> {
        let mut table = self.table.clone().ok_or(ProfilerError::NotSubmitted)?;
        if calc_reduction || calc_percentage {
            add_reductions(&mut table, calc_reduction, calc_percentage);
        }
        Ok(table)
    }

    pub fn legend(&self) -> Option<&[String]> {
        self.table.as_ref().map(|t| t.columns.as_slice())
    }
}

/// LAN vs WAN traffic over time.
pub struct WanTimeSeriesReport<'a> {
    runner: WanRunner<'a>,
    table: Option<Table>,
}

impl<'a> WanTimeSeriesReport<'a> {
    pub fn new(profiler: &'a NetProfiler) -> Self {
        Self {
            runner: WanRunner::new(profiler),
            table: None,
        }
    }

    pub fn interfaces(&mut self, device_ip: &str) -> Result<(Vec<String>, Vec<String>)> {
        self.runner.interfaces(device_ip)
    }

    /// `columns` must start with `time`.
    pub fn run(
        &mut self,
        lan_interfaces: &[String],
        wan_interfaces: &[String],
        direction: Direction,
        columns: Vec<ColumnRef>,
        options: &ReportOptions,
    ) -> Result<()> {
        let triplet = Triplet::new(Realm::TrafficOverallTimeSeries, Centricity::Interface, Groupby::Time);
        let profiler = self.runner.report.profiler();
        let columns = expand_in_out(profiler, &triplet, &columns)?;
        if columns.iter().find(|c| c.iskey).map(|c| c.key.as_str()) != Some("time") {
            return Err(ProfilerError::InvalidArgument(
                "WAN time series needs time as its first key column".to_string(),
            ));
        }
        let options = with_default_window(options).host_group_type(None);

        let (lan, wan) = self.runner.run_pair(&triplet, &columns, lan_interfaces, wan_interfaces, &options)?;
        self.table = Some(align(direction, &columns, &lan, &wan));
        Ok(())
    }

    pub fn get_data(&self) -> Result<Table> {
        self.table.clone().ok_or(ProfilerError::NotSubmitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::connection::Method;
    use crate::api::testing::{connect, scripted, FakeConnection, REPORTS};
    use crate::metadata::column::refs;

    fn available(ids_and_strids: &[(i64, &str, &str, &str)]) -> Value {
        let columns: Vec<Value> = ids_and_strids
            .iter()
            .map(|(id, strid, category, kind)| {
                json!({"id": id, "strid": strid, "category": category, "type": kind, "available": true})
            })
            .collect();
        json!([{"id": "q0", "columns": columns}])
    }

    fn script_side(conn: &FakeConnection, id: i64, queries: &Value, rows: Value) {
        conn.on(Method::Get, &format!("{}/{}.json", REPORTS, id), Ok(json!({"status": "completed"})));
        conn.on(Method::Get, &format!("{}/{}/queries.json", REPORTS, id), Ok(queries.clone()));
        conn.on(Method::Get, &format!("{}/{}/queries/q0.json", REPORTS, id), Ok(json!({"data": rows})));
    }

    fn posts(conn: &FakeConnection) -> Vec<Value> {
        conn.calls()
            .into_iter()
            .filter(|c| c.method == Method::Post && c.path == REPORTS)
            .filter_map(|c| c.body)
            .collect()
    }

    fn summary_fixture() -> std::sync::Arc<FakeConnection> {
        let conn = scripted("np");
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 1})));
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 2})));
        let queries = available(&[
            (20, "ID_APP_NAME", "key", "string"),
            (45, "ID_IN_AVG_BYTES", "data", "float"),
            (46, "ID_OUT_AVG_BYTES", "data", "float"),
        ]);
        script_side(&conn, 1, &queries, json!([["HTTP", "100", "250"], ["DNS", "1", "2"]]));
        script_side(&conn, 2, &queries, json!([["HTTP", "300", "400"], ["SSH", "10", "20"]]));
        conn
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("inbound".parse::<Direction>().unwrap(), Direction::Inbound);
        assert!(matches!("sideways".parse::<Direction>(), Err(ProfilerError::InvalidArgument(_))));
    }

    #[test]
    fn test_summary_inbound_join_and_reductions() {
        let conn = summary_fixture();
        let profiler = connect(&conn);
        let mut report = WanSummaryReport::new(&profiler);
        report
            .run(
                &["10.0.0.9:1".to_string()],
                &["10.0.0.9:2".to_string()],
                Direction::Inbound,
                refs(vec!["app_name", "avg_bytes"]),
                Some(Groupby::Application),
                &ReportOptions::default(),
            )
            .unwrap();

        let bodies = posts(&conn);
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["criteria"]["deprecated"], json!({"interfaces_a": "10.0.0.9:2"}));
        assert_eq!(bodies[1]["criteria"]["deprecated"], json!({"interfaces_a": "10.0.0.9:1"}));
        assert_eq!(bodies[0]["criteria"]["query"]["columns"], json!([20, 45, 46]));
        assert_eq!(bodies[0]["criteria"]["query"]["centricity"], "int");

        let plain = report.get_data(false, false).unwrap();
        assert_eq!(plain.columns, vec!["app_name", "LAN_avg_bytes", "WAN_avg_bytes"]);
        assert_eq!(plain.rows, vec![vec![json!("HTTP"), json!(400.0), json!(100.0)]]);

        let full = report.get_data(true, true).unwrap();
        assert_eq!(full.columns[3..], ["avg_bytes_reduct".to_string(), "avg_bytes_reduct_pct".to_string()]);
        assert_eq!(full.rows[0][3], json!(300.0));
        assert_eq!(full.rows[0][4], json!(0.75));
    }

    #[test]
    fn test_summary_outbound_swaps_sides() {
        let conn = summary_fixture();
        let profiler = connect(&conn);
        let mut report = WanSummaryReport::new(&profiler);
        report
            .run(
                &["lan".to_string()],
                &["wan".to_string()],
                Direction::Outbound,
                refs(vec!["app_name", "in_avg_bytes"]),
                Some(Groupby::Application),
                &ReportOptions::default(),
            )
            .unwrap();
        let table = report.get_data(false, false).unwrap();
        assert_eq!(table.rows, vec![vec![json!("HTTP"), json!(300.0), json!(250.0)]]);
    }

    #[test]
    fn test_repeat_run_uses_cache() {
        let conn = summary_fixture();
        let profiler = connect(&conn);
        let mut report = WanSummaryReport::new(&profiler);
        let options = ReportOptions::default().time_filter(TimeFilter::parse_range("last 1 h").unwrap());
        let lan = vec!["10.0.0.9:1".to_string()];
        let wan = vec!["10.0.0.9:2".to_string()];
        for direction in [Direction::Inbound, Direction::Outbound] {
            report
                .run(&lan, &wan, direction, refs(vec!["app_name", "avg_bytes"]), Some(Groupby::Application), &options)
                .unwrap();
        }
        assert_eq!(posts(&conn).len(), 2);
    }

    #[test]
    fn test_zero_lan_percentage_is_null() {
        let mut table = Table::new(
            vec!["k".into(), "LAN_x".into(), "WAN_x".into()],
            vec![vec![json!("a"), json!(0.0), json!(5.0)]],
        );
        add_reductions(&mut table, false, true);
        assert_eq!(table.columns[3], "x_reduct_pct");
        assert_eq!(table.rows[0][3], Value::Null);
    }

    #[test]
    fn test_time_series_requires_time_key() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut report = WanTimeSeriesReport::new(&profiler);
        let err = report
            .run(&[], &[], Direction::Inbound, refs(vec!["avg_bytes"]), &ReportOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProfilerError::InvalidArgument(_)));
        assert!(matches!(report.get_data(), Err(ProfilerError::NotSubmitted)));
    }

    #[test]
    fn test_time_series_joins_on_time() {
        let conn = scripted("np");
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 1})));
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 2})));
        let queries = available(&[
            (98, "ID_TIME", "time", "int"),
            (45, "ID_IN_AVG_BYTES", "data", "float"),
            (46, "ID_OUT_AVG_BYTES", "data", "float"),
        ]);
        script_side(&conn, 1, &queries, json!([["60", "1", "2"], ["120", "3", "4"]]));
        script_side(&conn, 2, &queries, json!([["120", "30", "40"]]));
        let profiler = connect(&conn);
        let mut report = WanTimeSeriesReport::new(&profiler);
        report
            .run(&["l".to_string()], &["w".to_string()], Direction::Inbound, refs(vec!["time", "avg_bytes"]), &ReportOptions::default())
            .unwrap();
        let table = report.get_data().unwrap();
        assert_eq!(table.columns, vec!["time", "LAN_avg_bytes", "WAN_avg_bytes"]);
        assert_eq!(table.rows, vec![vec![json!(120), json!(40.0), json!(3.0)]]);
        assert!(posts(&conn)[0]["criteria"]["query"].get("host_group_type").is_none());
    }

    #[test]
    fn test_interfaces_by_name() {
        let conn = scripted("np");
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 4})));
        let queries = available(&[(42, "ID_INTERFACE_DNS", "key", "string"), (41, "ID_INTERFACE", "key", "string")]);
        script_side(
            &conn,
            4,
            &queries,
            json!([["wan0_0", "10.0.0.9:1"], ["lan0_0", "10.0.0.9:2"], ["aux", "10.0.0.9:3"]]),
        );
        let profiler = connect(&conn);
        let mut report = WanSummaryReport::new(&profiler);
        let (lan, wan) = report.interfaces("10.0.0.9").unwrap();
        assert_eq!(lan, vec!["10.0.0.9:2"]);
        assert_eq!(wan, vec!["10.0.0.9:1"]);
        let body = &posts(&conn)[0];
        assert_eq!(body["criteria"]["traffic_expression"], "device 10.0.0.9");
        assert_eq!(body["criteria"]["query"]["group_by"], "ifc");
    }

    #[test]
    fn test_interfaces_missing_side_fails() {
        let conn = scripted("np");
        conn.on(Method::Post, REPORTS, Ok(json!({"id": 4})));
        let queries = available(&[(42, "ID_INTERFACE_DNS", "key", "string"), (41, "ID_INTERFACE", "key", "string")]);
        script_side(&conn, 4, &queries, json!([["lan0_0", "10.0.0.9:2"]]));
        let profiler = connect(&conn);
        let mut report = WanSummaryReport::new(&profiler);
        assert!(matches!(report.interfaces("10.0.0.9"), Err(ProfilerError::InvalidArgument(_))));
    }
}

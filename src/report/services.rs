//! Service health by location.
//!
//! The `msq` realm returns one row per tree node. Location rows carry an
//! overall health context plus one ephemeral column per service; metric
//! category rows are skipped.

use std::ops::{Deref, DerefMut};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ProfilerError, Result};
use crate::metadata::column::ColumnRef;
use crate::metadata::triplets::{Groupby, Realm, EPHEMERAL_COLID};
use crate::profiler::NetProfiler;
use crate::report::criteria::ReportSpec;
use crate::report::engine::Report;
use crate::report::values::{value_to_int, value_to_string};
use crate::report::variants::ReportOptions;

/// Tree key column id marking a location row.
pub const COL_ID_LOCATION: i64 = 691;
/// Tree key column id marking a metric category row.
pub const COL_ID_METRIC_CAT: i64 = 692;

pub const SERVICE_LOCATION_COLUMNS: [&str; 6] = [
    "idx",
    "parent_id",
    "tree_key_ctxt",
    "tree_key_id",
    "tree_key_type",
    "health_ctxt",
];

lazy_static! {
    static ref TREE_KEY_RE: Regex =
        Regex::new(r"^(?P<col_id>[0-9]+):(?P<elem_id>[0-9:]+)\|(?P<elem_name>[^\[]+)").unwrap();
    static ref LOCATION_HEALTH_RE: Regex = Regex::new(
        r"^(?P<health>[0-9]*)\*?\[service_location_id=(?P<location_id>[0-9:]+)\[svc_location_id"
    )
    .unwrap();
    static ref SERVICE_HEALTH_RE: Regex = Regex::new(
        r"^(?P<health>[0-9]*)\*?\[service_location_id=(?P<location_id>[0-9:]+),service_id=(?P<service_id>[0-9]+)\[svc_location_id"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceHealth {
    NotAvailable,
    Disabled,
    Init,
    Normal,
    Low,
    Medium,
    High,
    NoData,
    Unknown(i64),
}

impl ServiceHealth {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ServiceHealth::NotAvailable,
            1 => ServiceHealth::Disabled,
            2 => ServiceHealth::Init,
            3 => ServiceHealth::Normal,
            4 => ServiceHealth::Low,
            5 => ServiceHealth::Medium,
            6 => ServiceHealth::High,
            7 => ServiceHealth::NoData,
            other => ServiceHealth::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ServiceHealth::NotAvailable => 0,
            ServiceHealth::Disabled => 1,
            ServiceHealth::Init => 2,
            ServiceHealth::Normal => 3,
            ServiceHealth::Low => 4,
            ServiceHealth::Medium => 5,
            ServiceHealth::High => 6,
            ServiceHealth::NoData => 7,
            ServiceHealth::Unknown(code) => *code,
        }
    }

    /// An empty health field means the service is not available.
    fn parse(raw: &str) -> Self {
        raw.parse().map(Self::from_code).unwrap_or(ServiceHealth::NotAvailable)
    }
}

/// One location row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationHealth {
    pub id: Value,
    pub parent_id: Option<i64>,
    pub location: String,
    pub overall: ServiceHealth,
    /// Per-service health, in legend order.
    pub services: Vec<(String, ServiceHealth)>,
}

struct Positions {
    idx: usize,
    parent_id: usize,
    tree_key_ctxt: usize,
    health_ctxt: usize,
    services: Vec<(usize, String)>,
}

fn cell(row: &[Value], idx: usize) -> String {
    row.get(idx).map(value_to_string).unwrap_or_default()
}

fn parse_row(row: &[Value], pos: &Positions) -> Result<Option<LocationHealth>> {
    let tree_key = cell(row, pos.tree_key_ctxt);
    let caps = TREE_KEY_RE
        .captures(&tree_key)
        .ok_or_else(|| ProfilerError::Parse(format!("failed to parse tree_key_ctxt: {}", tree_key)))?;
    if caps["col_id"].parse::<i64>().ok() != Some(COL_ID_LOCATION) {
        return Ok(None);
    }

    let location = match caps["elem_name"].split(':').collect::<Vec<_>>().as_slice() {
        [_, location] => location.to_string(),
        _ => {
            return Err(ProfilerError::Parse(format!(
                "unexpected location name in tree_key_ctxt: {}",
                tree_key
            )))
        }
    };

    let health = cell(row, pos.health_ctxt);
    let overall = LOCATION_HEALTH_RE
        .captures(&health)
        .map(|c| ServiceHealth::parse(&c["health"]))
        .ok_or_else(|| ProfilerError::Parse(format!("failed to parse overall health_ctxt: {}", health)))?;

    let mut services = Vec::with_capacity(pos.services.len());
    for (idx, name) in &pos.services {
        let raw = cell(row, *idx);
        let caps = SERVICE_HEALTH_RE.captures(&raw).ok_or_else(|| {
            ProfilerError::Parse(format!("failed to parse service {} health_ctxt: {}", name, raw))
        })?;
        services.push((name.clone(), ServiceHealth::parse(&caps["health"])));
    }

    Ok(Some(LocationHealth {
        id: row.get(pos.idx).cloned().unwrap_or(Value::Null),
        parent_id: row.get(pos.parent_id).and_then(value_to_int),
        location,
        overall,
        services,
    }))
}

pub struct ServiceLocationReport<'a> {
    report: Report<'a>,
}

impl<'a> ServiceLocationReport<'a> {
    pub fn new(profiler: &'a NetProfiler) -> Self {
        Self {
            report: Report::new(profiler),
        }
    }

    pub fn run(&mut self, options: &ReportOptions) -> Result<bool> {
        let columns: Vec<ColumnRef> = SERVICE_LOCATION_COLUMNS.iter().map(|c| ColumnRef::from(*c)).collect();
        let spec = options.apply(ReportSpec::new(Realm::Msq, Groupby::ServiceLocationMetric, columns));
        self.report.run(&spec)?;
        self.report.finish(options.sync)
    }

    fn positions(&mut self) -> Result<Positions> {
        let legend = self.report.legend(0, None)?;
        let find = |key: &str| {
            legend
                .iter()
                .position(|c| c.id < EPHEMERAL_COLID && c.key == key)
                .ok_or_else(|| ProfilerError::Parse(format!("service location legend has no {} column", key)))
        };
        Ok(Positions {
            idx: find("idx")?,
            parent_id: find("parent_id")?,
            tree_key_ctxt: find("tree_key_ctxt")?,
            health_ctxt: find("health_ctxt")?,
            services: legend
                .iter()
                .enumerate()
                .filter(|(_, c)| c.id >= EPHEMERAL_COLID)
                .map(|(i, c)| (i, c.label.clone()))
                .collect(),
        })
    }

    /// Location rows with their overall and per-service health.
    pub fn parsed_rows(&mut self) -> Result<Vec<LocationHealth>> {
        let pos = self.positions()?;
        let raw = self.report.get_data(0, None, None)?;
        let mut rows = Vec::new();
        for row in &raw {
            if let Some(parsed) = parse_row(row, &pos)? {
                rows.push(parsed);
            }
        }
        log::debug!("{} SERVICE_LOCATIONS_PARSED rows={} raw={}", self.report.ctx(), rows.len(), raw.len());
        Ok(rows)
    }

    /// `{"location": name, <service>: health code, ...}` per location.
    pub fn get_data(&mut self) -> Result<Vec<Map<String, Value>>> {
        Ok(self
            .parsed_rows()?
            .into_iter()
            .map(|row| {
                let mut out = Map::new();
                out.insert("location".to_string(), Value::String(row.location));
                for (service, health) in row.services {
                    out.insert(service, Value::from(health.code()));
                }
                out
            })
            .collect())
    }
}

impl<'a> Deref for ServiceLocationReport<'a> {
    type Target = Report<'a>;

    fn deref(&self) -> &Self::Target {
        &self.report
    }
}

impl<'a> DerefMut for ServiceLocationReport<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.report
    }
}

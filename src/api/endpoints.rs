//! Typed wrappers for the appliance REST endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::api::connection::{Connection, Method};
use crate::error::{ProfilerError, Result};
use crate::metadata::cache::ColumnSource;
use crate::metadata::triplets::Triplet;

pub const REPORTING_PREFIX: &str = "/api/profiler/1.0/reporting";
pub const COMMON_PREFIX: &str = "/api/common/1.0";
pub const HOST_GROUP_TYPES_PREFIX: &str = "/api/profiler/1.2/host_group_types";
pub const DEVICES_PREFIX: &str = "/api/profiler/1.0/devices";
pub const SERVICES_PREFIX: &str = "/api/profiler/1.3/services";

/// Endpoint wrappers over a shared connection.
#[derive(Clone)]
pub struct ProfilerApi {
    conn: Arc<dyn Connection>,
}

fn no_params() -> Vec<(String, String)> {
    Vec::new()
}

fn into_array(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ProfilerError::Parse(format!(
            "expected a list of {}, got {}",
            what, other
        ))),
    }
}

impl ProfilerApi {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    pub fn host(&self) -> &str {
        self.conn.host()
    }

    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        Ok(self.conn.json_request(Method::Get, path, None, params)?)
    }

    fn reporting(&self, path: &str) -> String {
        format!("{}{}", REPORTING_PREFIX, path)
    }

    fn hgt(&self, path: &str) -> String {
        format!("{}{}", HOST_GROUP_TYPES_PREFIX, path)
    }

    // common

    pub fn info(&self) -> Result<Value> {
        self.get(&format!("{}/info.json", COMMON_PREFIX), &no_params())
    }

    /// Software version string from `info.json`.
    pub fn sw_version(&self) -> Result<String> {
        let info = self.info()?;
        info.get("sw_version")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProfilerError::Parse("info response has no sw_version".to_string()))
    }

    pub fn logout(&self) -> Result<()> {
        self.get(&format!("{}/logout.json", COMMON_PREFIX), &no_params())?;
        Ok(())
    }

    // reporting metadata

    pub fn realms(&self) -> Result<Value> {
        self.get(&self.reporting("/realms.json"), &no_params())
    }

    pub fn centricities(&self) -> Result<Value> {
        self.get(&self.reporting("/centricities.json"), &no_params())
    }

    pub fn group_bys(&self) -> Result<Value> {
        self.get(&self.reporting("/group_bys.json"), &no_params())
    }

    pub fn columns(&self, triplet: &Triplet) -> Result<Vec<Value>> {
        let params = vec![
            ("realm".to_string(), triplet.realm.as_str().to_string()),
            ("centricity".to_string(), triplet.centricity.as_str().to_string()),
            ("group_by".to_string(), triplet.groupby.code().to_string()),
        ];
        into_array(self.get(&self.reporting("/columns.json"), &params)?, "columns")
    }

    pub fn areas(&self) -> Result<Vec<Value>> {
        into_array(self.get(&self.reporting("/areas.json"), &no_params())?, "areas")
    }

    // reports

    pub fn create_report(&self, body: &Value) -> Result<Value> {
        Ok(self
            .conn
            .json_request(Method::Post, &self.reporting("/reports"), Some(body), &no_params())?)
    }

    pub fn report_status(&self, report_id: i64) -> Result<Value> {
        self.get(&self.reporting(&format!("/reports/{}.json", report_id)), &no_params())
    }

    pub fn report_queries(&self, report_id: i64) -> Result<Vec<Value>> {
        into_array(
            self.get(&self.reporting(&format!("/reports/{}/queries.json", report_id)), &no_params())?,
            "queries",
        )
    }

    /// Rows or totals for one query, columns in the given id order.
    pub fn query_data(&self, report_id: i64, query_id: &str, column_ids: &[i64], limit: Option<usize>) -> Result<Value> {
        let ids: Vec<String> = column_ids.iter().map(|id| id.to_string()).collect();
        let mut params = vec![("columns".to_string(), ids.join(","))];
        if let Some(limit) = limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        self.get(
            &self.reporting(&format!("/reports/{}/queries/{}.json", report_id, query_id)),
            &params,
        )
    }

    pub fn delete_report(&self, report_id: i64) -> Result<()> {
        self.conn.json_request(
            Method::Delete,
            &self.reporting(&format!("/reports/{}.json", report_id)),
            None,
            &no_params(),
        )?;
        Ok(())
    }

    // devices

    /// Known devices, optionally narrowed by device type and address block.
    pub fn devices(&self, type_id: Option<i64>, cidr: Option<&str>) -> Result<Vec<Value>> {
        let mut params = no_params();
        if let Some(type_id) = type_id {
            params.push(("type_id".to_string(), type_id.to_string()));
        }
        if let Some(cidr) = cidr.filter(|c| !c.is_empty()) {
            params.push(("cidr".to_string(), cidr.to_string()));
        }
        into_array(self.get(DEVICES_PREFIX, &params)?, "devices")
    }

    pub fn device_details(&self, ipaddr: &str) -> Result<Value> {
        self.get(&format!("{}/{}.json", DEVICES_PREFIX, ipaddr), &no_params())
    }

    /// Distinct `(type_id, type)` pairs over all devices, ordered by id.
    pub fn device_types(&self) -> Result<Vec<(i64, String)>> {
        let mut types = BTreeSet::new();
        for device in self.devices(None, None)? {
            let id = device.get("type_id").and_then(Value::as_i64);
            let name = device.get("type").and_then(Value::as_str);
            match (id, name) {
                (Some(id), Some(name)) => {
                    types.insert((id, name.to_string()));
                }
                _ => {
                    return Err(ProfilerError::Parse(format!(
                        "device entry without type_id/type: {}",
                        device
                    )))
                }
            }
        }
        Ok(types.into_iter().collect())
    }

    // services

    pub fn services(&self) -> Result<Vec<Value>> {
        into_array(self.get(SERVICES_PREFIX, &no_params())?, "services")
    }

    // host group types

    pub fn host_group_types(&self) -> Result<Vec<Value>> {
        into_array(self.get(&self.hgt(""), &no_params())?, "host group types")
    }

    pub fn host_group_type(&self, type_id: i64) -> Result<Value> {
        self.get(&self.hgt(&format!("/{}", type_id)), &no_params())
    }

    pub fn host_group_type_config(&self, type_id: i64) -> Result<Value> {
        self.get(&self.hgt(&format!("/{}/config", type_id)), &no_params())
    }

    pub fn host_group_type_groups(&self, type_id: i64) -> Result<Vec<Value>> {
        into_array(
            self.get(&self.hgt(&format!("/{}/groups", type_id)), &no_params())?,
            "host groups",
        )
    }

    pub fn create_host_group_type(&self, body: &Value) -> Result<Value> {
        Ok(self
            .conn
            .json_request(Method::Post, &self.hgt(""), Some(body), &no_params())?)
    }

    pub fn update_host_group_type(&self, type_id: i64, body: &Value) -> Result<Value> {
        Ok(self.conn.json_request(
            Method::Put,
            &self.hgt(&format!("/{}", type_id)),
            Some(body),
            &no_params(),
        )?)
    }

    pub fn delete_host_group_type(&self, type_id: i64) -> Result<()> {
        self.conn.json_request(
            Method::Delete,
            &self.hgt(&format!("/{}", type_id)),
            None,
            &no_params(),
        )?;
        Ok(())
    }
}

impl ColumnSource for ProfilerApi {
    fn fetch_columns(&self, triplet: &Triplet) -> Result<Vec<Value>> {
        self.columns(triplet)
    }
}

//! Scripted in-memory `Connection` for unit tests.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

use crate::api::connection::{Connection, Method};
use crate::error::HttpError;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
}

/// Replays queued responses per (method, path). The last queued response
/// for a route repeats; unscripted routes answer 404.
#[derive(Default)]
pub struct FakeConnection {
    host: String,
    routes: Mutex<HashMap<(Method, String), VecDeque<Result<Value, HttpError>>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeConnection {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    pub fn on(&self, method: Method, path: &str, response: Result<Value, HttpError>) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

pub fn not_found() -> HttpError {
    HttpError::Status {
        code: 404,
        body: "not found".to_string(),
    }
}

impl Connection for FakeConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn json_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        params: &[(String, String)],
    ) -> Result<Value, HttpError> {
        self.calls.lock().push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
            params: params.to_vec(),
        });

        let mut routes = self.routes.lock();
        match routes.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Err(not_found())),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Err(not_found())),
            None => Err(not_found()),
        }
    }
}

pub const INFO: &str = "/api/common/1.0/info.json";
pub const COLUMNS: &str = "/api/profiler/1.0/reporting/columns.json";
pub const AREAS: &str = "/api/profiler/1.0/reporting/areas.json";
pub const REPORTS: &str = "/api/profiler/1.0/reporting/reports";

fn column(id: i64, strid: &str, category: &str, kind: &str) -> Value {
    serde_json::json!({
        "id": id,
        "strid": strid,
        "name": strid.trim_start_matches("ID_").replace('_', " "),
        "category": category,
        "type": kind,
    })
}

/// Column list served for every triplet.
pub fn standard_columns() -> Value {
    Value::Array(vec![
        column(98, "ID_TIME", "time", "int"),
        column(16, "ID_PROTOCOL", "key", "int"),
        column(17, "ID_HOST_IP", "key", "ipaddr"),
        column(18, "ID_PROTOPORT", "key", "string"),
        column(19, "ID_PORT", "key", "int"),
        column(20, "ID_APP_NAME", "key", "string"),
        column(21, "ID_GROUP_NAME", "key", "string"),
        column(22, "ID_CLI_HOST_IP", "key", "ipaddr"),
        column(23, "ID_SRV_HOST_IP", "key", "ipaddr"),
        column(33, "ID_AVG_BYTES", "data", "float"),
        column(34, "ID_AVG_PKTS", "data", "float"),
        column(35, "ID_TOTAL_BYTES", "data", "int"),
        column(41, "ID_INTERFACE", "key", "string"),
        column(42, "ID_INTERFACE_DNS", "key", "string"),
        column(45, "ID_IN_AVG_BYTES", "data", "float"),
        column(46, "ID_OUT_AVG_BYTES", "data", "float"),
        column(47, "ID_IN_TOTAL_BYTES", "data", "int"),
        column(48, "ID_OUT_TOTAL_BYTES", "data", "int"),
        column(60, "ID_USERNAME", "key", "string"),
        column(61, "ID_FULL_USERNAME", "key", "string"),
        column(62, "ID_LOGIN_OK", "key", "string"),
        column(63, "ID_HOST_DNS", "key", "string"),
        column(64, "ID_HOST_SWITCH", "key", "string"),
        column(65, "ID_HOST_SWITCH_DNS", "key", "string"),
        column(66, "ID_DOMAIN", "key", "string"),
        column(70, "ID_IDX", "key", "int"),
        column(71, "ID_PARENT_ID", "key", "int"),
        column(72, "ID_TREE_KEY_CTXT", "key", "string"),
        column(73, "ID_TREE_KEY_ID", "key", "string"),
        column(74, "ID_TREE_KEY_TYPE", "key", "string"),
        column(75, "ID_HEALTH_CTXT", "data", "string"),
    ])
}

/// Connection answering the calls `NetProfiler::connect` makes.
pub fn scripted(host: &str) -> std::sync::Arc<FakeConnection> {
    let conn = FakeConnection::new(host);
    conn.on(Method::Get, INFO, Ok(serde_json::json!({"sw_version": "10.23"})));
    conn.on(Method::Get, COLUMNS, Ok(standard_columns()));
    conn.on(
        Method::Get,
        AREAS,
        Ok(serde_json::json!([{"id": 1, "name": "Data Center"}, {"id": 2, "name": "Branch"}])),
    );
    std::sync::Arc::new(conn)
}

pub fn connect(conn: &std::sync::Arc<FakeConnection>) -> crate::profiler::NetProfiler {
    crate::profiler::NetProfiler::connect(
        conn.clone(),
        std::sync::Arc::new(crate::metadata::store::MemoryStore::new()),
        crate::config::ProfilerConfig::default(),
    )
    .unwrap()
}

//! Transport seam between the report core and the appliance.

use std::fmt;

use serde_json::Value;

use crate::error::HttpError;

/// HTTP verb of a JSON request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated JSON transport to one appliance.
///
/// Implementations return the decoded response body, `Value::Null` for an
/// empty body, and a typed [`HttpError`] for non-2xx statuses.
pub trait Connection: Send + Sync {
    /// Host name used in log lines.
    fn host(&self) -> &str;

    fn json_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        params: &[(String, String)],
    ) -> Result<Value, HttpError>;
}

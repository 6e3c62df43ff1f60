//! Error types.
//!
//! Column and combination errors are raised while a report is being built and
//! never reach the appliance. Transport errors come from the `Connection`
//! and are propagated as-is except where a caller documents otherwise.

use thiserror::Error;

/// Errors raised by a `Connection`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HttpError {
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response decode error: {0}")]
    Decode(String),
}

impl HttpError {
    /// True for a 404 from the appliance.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::Status { code: 404, .. })
    }
}

/// Errors raised by the report core.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("{0} is not a valid column for this netprofiler")]
    UnknownColumn(String),

    #[error("{column} is not a valid column for groupby {groupby}")]
    ColumnNotValidForGroupby { column: String, groupby: String },

    #[error("invalid combination realm={realm} centricity={centricity} groupby={groupby}")]
    InvalidRealmGroupbyCombination {
        realm: String,
        centricity: String,
        groupby: String,
    },

    #[error("failed to retrieve report id from report creation response: {0}")]
    ReportSubmissionFailed(String),

    #[error("no report id set, run a report first")]
    NotSubmitted,

    #[error("report {0} did not complete before the poll timeout")]
    ReportTimedOut(i64),

    #[error("report has no query at index {0}")]
    QueryNotFound(usize),

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("invalid time filter: {0}")]
    InvalidTimeFilter(String),

    #[error("{0} is not a valid area for this netprofiler")]
    InvalidArea(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("column metadata unavailable: every triplet fetch failed ({0} attempted)")]
    MetadataUnavailable(usize),

    #[error("host group error: {0}")]
    HostGroup(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("local store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;

//! NetProfiler Core - report lifecycle and column resolution
//!
//! This crate talks to a NetProfiler appliance's reporting API: it discovers
//! which columns are valid for each (realm, centricity, groupby) triplet,
//! submits reports, polls them to completion and returns their data decoded
//! against a legend of resolved columns.
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `api` - `Connection` trait, endpoint calls and the HTTP transport
//! - `metadata` - Triplets, columns, the persisted column cache and catalog
//! - `report` - Report building, polling, column resolution and report variants
//! - `hostgroup` - Host group type editing
//! - `datasource` - Job-facing query runners and triggers
//! - `profiler` - The connected appliance handle tying it together
//! - `config` - Poll and cache settings
//! - `logging` - Structured logging with appliance and report context

pub mod api;
pub mod config;
pub mod datasource;
pub mod error;
pub mod hostgroup;
pub mod logging;
pub mod metadata;
pub mod profiler;
pub mod report;

pub use config::ProfilerConfig;
pub use error::{HttpError, ProfilerError, Result};
pub use hostgroup::{ConfigEntry, HostGroup, HostGroupType};
pub use metadata::{Centricity, Column, ColumnRef, Groupby, Realm, Triplet};
pub use profiler::NetProfiler;
pub use report::{Report, ReportSpec, Resolution, Table, TimeFilter};

/// Initialize the process-wide logger at `info`. `RUST_LOG` overrides the
/// level. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

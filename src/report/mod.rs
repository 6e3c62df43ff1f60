//! Report building, submission and result access.
//!
//! A [`ReportSpec`] describes one request. [`Report`] submits it, polls the
//! appliance and resolves query data against per-report columns. The
//! fixed-shape reports in [`variants`], [`wan`], [`services`] and [`top_n`]
//! are thin layers over [`Report`].

pub mod criteria;
pub mod engine;
pub mod query;
pub mod resolver;
pub mod services;
pub mod table;
pub mod time;
pub mod top_n;
pub mod values;
pub mod variants;
pub mod wan;

pub use criteria::*;
pub use engine::*;
pub use query::*;
pub use resolver::ColumnResolver;
pub use services::{LocationHealth, ServiceHealth, ServiceLocationReport};
pub use table::Table;
pub use time::*;
pub use top_n::{TopNKind, TopNRequest, TopNTimeSeries};
pub use values::{decode_row, Coercion};
pub use variants::*;
pub use wan::{Direction, WanSummaryReport, WanTimeSeriesReport};

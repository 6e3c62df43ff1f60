//! Structured logging with appliance and report context.
//!
//! Provides logging macros and utilities that include the appliance host and
//! report id in every log message for easy correlation.

pub mod structured;

pub use structured::*;

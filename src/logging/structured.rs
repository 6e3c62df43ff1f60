//! Structured logging utilities.
//!
//! Every report-related log line carries the appliance host and, once known,
//! the remote report id and query id.

use std::fmt;

use uuid::Uuid;

/// Logging context for one appliance and, optionally, one report.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub profiler: String,
    pub run_id: Option<String>,
    pub report_id: Option<i64>,
    pub query_id: Option<String>,
}

impl LogContext {
    pub fn new(profiler: &str) -> Self {
        Self {
            profiler: profiler.to_string(),
            run_id: None,
            report_id: None,
            query_id: None,
        }
    }

    /// Context for a new local report run, tagged before the appliance has
    /// assigned an id.
    pub fn for_run(&self) -> Self {
        Self {
            profiler: self.profiler.clone(),
            run_id: Some(format!("run-{}", &Uuid::new_v4().to_string()[..8])),
            report_id: None,
            query_id: None,
        }
    }

    pub fn with_report(&self, report_id: i64) -> Self {
        Self {
            report_id: Some(report_id),
            ..self.clone()
        }
    }

    pub fn with_query(&self, query_id: &str) -> Self {
        Self {
            query_id: Some(query_id.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[profiler={}]", self.profiler)?;
        if let Some(run) = &self.run_id {
            write!(f, " [{}]", run)?;
        }
        if let Some(rid) = self.report_id {
            write!(f, " [report={}]", rid)?;
        }
        if let Some(qid) = &self.query_id {
            write!(f, " [query={}]", qid)?;
        }
        Ok(())
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr) => {
        log::info!("{} {}", $ctx, $event);
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr) => {
        log::warn!("{} {}", $ctx, $event);
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr) => {
        log::error!("{} {}", $ctx, $event);
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::error!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr) => {
        log::debug!("{} {}", $ctx, $event);
    };
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),*), $($value),*)
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("np.example.com");
        assert_eq!(format!("{}", ctx), "[profiler=np.example.com]");

        let ctx_with_report = ctx.with_report(42).with_query("q-1");
        assert_eq!(
            format!("{}", ctx_with_report),
            "[profiler=np.example.com] [report=42] [query=q-1]"
        );
    }

    #[test]
    fn test_run_context_has_tag() {
        let ctx = LogContext::new("np").for_run();
        let run = ctx.run_id.clone().unwrap();
        assert!(run.starts_with("run-"));
        assert_eq!(run.len(), 12);
        assert!(format!("{}", ctx).contains(&run));
    }
}

//! Time frames and data resolution.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ProfilerError, Result};

lazy_static! {
    static ref DURATION_RE: Regex =
        Regex::new(r"^\s*(?P<num>[0-9]+(?:\.[0-9]+)?)\s*(?P<unit>[a-zA-Z]*)\s*$").unwrap();
    static ref LAST_RE: Regex = Regex::new(r"^\s*last\s+(?P<dur>.+)$").unwrap();
    static ref RANGE_RE: Regex = Regex::new(r"^\s*(?P<start>.+?)\s+to\s+(?P<end>.+?)\s*$").unwrap();
}

/// Parse a duration like `15m`, `1 min`, `2 hours` or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let caps = DURATION_RE
        .captures(s)
        .ok_or_else(|| ProfilerError::InvalidTimeFilter(format!("cannot parse duration {:?}", s)))?;
    let num: f64 = caps["num"]
        .parse()
        .map_err(|_| ProfilerError::InvalidTimeFilter(format!("bad number in {:?}", s)))?;
    let unit_secs = match caps["unit"].to_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "wk" | "week" | "weeks" => 604_800.0,
        other => {
            return Err(ProfilerError::InvalidTimeFilter(format!(
                "unknown duration unit {:?}",
                other
            )))
        }
    };
    let millis = (num * unit_secs * 1000.0).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return Err(ProfilerError::InvalidTimeFilter(format!("duration {:?} out of range", s)));
    }
    Duration::try_milliseconds(millis as i64)
        .ok_or_else(|| ProfilerError::InvalidTimeFilter(format!("duration {:?} out of range", s)))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return Ok(dt);
        }
    }
    Err(ProfilerError::InvalidTimeFilter(format!("cannot parse time {:?}", s)))
}

/// Requested report window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeFilter {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(ProfilerError::InvalidTimeFilter(format!(
                "end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `duration` ending now. Starts no earlier than the earliest
    /// representable instant.
    pub fn last(duration: Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end.checked_sub_signed(duration).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    /// Parse `last <duration>` or `<time> to <time>`.
    pub fn parse_range(s: &str) -> Result<Self> {
        Self::parse_range_at(s, Utc::now())
    }

    /// As [`TimeFilter::parse_range`], with relative ranges ending at `now`.
    pub fn parse_range_at(s: &str, now: DateTime<Utc>) -> Result<Self> {
        if let Some(caps) = LAST_RE.captures(s) {
            let duration = parse_duration(&caps["dur"])?;
            let start = now.checked_sub_signed(duration).ok_or_else(|| {
                ProfilerError::InvalidTimeFilter(format!("window {:?} starts before the representable range", s))
            })?;
            return Self::new(start, now);
        }
        if let Some(caps) = RANGE_RE.captures(s) {
            return Self::new(parse_instant(&caps["start"])?, parse_instant(&caps["end"])?);
        }
        Err(ProfilerError::InvalidTimeFilter(format!("cannot parse range {:?}", s)))
    }

    pub fn start_secs(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_secs(&self) -> i64 {
        self.end.timestamp()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Data bucket size of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resolution {
    #[default]
    Auto,
    Min1,
    Min15,
    Hour,
    Hour6,
    Day,
    Week,
    Month,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Auto => "auto",
            Resolution::Min1 => "1min",
            Resolution::Min15 => "15min",
            Resolution::Hour => "hour",
            Resolution::Hour6 => "6hour",
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
        }
    }

    /// Map a bucket size in seconds onto its label.
    pub fn from_seconds(secs: i64) -> Result<Self> {
        match secs {
            60 => Ok(Resolution::Min1),
            900 => Ok(Resolution::Min15),
            3600 => Ok(Resolution::Hour),
            21_600 => Ok(Resolution::Hour6),
            86_400 => Ok(Resolution::Day),
            604_800 => Ok(Resolution::Week),
            other => Err(ProfilerError::InvalidResolution(format!("{} seconds", other))),
        }
    }

    pub fn is_auto(&self) -> bool {
        *self == Resolution::Auto
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = ProfilerError;

    /// Accepts a label (`15min`, `auto`) or a duration (`15 min`, `900`).
    fn from_str(s: &str) -> Result<Self> {
        let labelled = [
            Resolution::Auto,
            Resolution::Min1,
            Resolution::Min15,
            Resolution::Hour,
            Resolution::Hour6,
            Resolution::Day,
            Resolution::Week,
            Resolution::Month,
        ];
        if let Some(r) = labelled.iter().find(|r| r.as_str() == s) {
            return Ok(*r);
        }
        let duration =
            parse_duration(s).map_err(|_| ProfilerError::InvalidResolution(s.to_string()))?;
        Self::from_seconds(duration.num_seconds())
            .map_err(|_| ProfilerError::InvalidResolution(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_duration("1 min").unwrap(), Duration::minutes(1));
        assert_eq!(parse_duration("2 hours").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("3600").unwrap(), Duration::hours(1));
        assert!(parse_duration("fortnight").is_err());
        assert!(parse_duration("5 parsecs").is_err());
    }

    #[test]
    fn test_resolution_labels_and_durations() {
        assert_eq!("auto".parse::<Resolution>().unwrap(), Resolution::Auto);
        assert_eq!("month".parse::<Resolution>().unwrap(), Resolution::Month);
        assert_eq!("1 min".parse::<Resolution>().unwrap(), Resolution::Min1);
        assert_eq!("15m".parse::<Resolution>().unwrap(), Resolution::Min15);
        assert_eq!("21600".parse::<Resolution>().unwrap(), Resolution::Hour6);
        assert_eq!("1 week".parse::<Resolution>().unwrap(), Resolution::Week);
        assert!(matches!("7 min".parse::<Resolution>(), Err(ProfilerError::InvalidResolution(_))));
    }

    #[test]
    fn test_parse_last_range() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let tf = TimeFilter::parse_range_at("last 15 m", now).unwrap();
        assert_eq!(tf.end, now);
        assert_eq!(tf.duration(), Duration::minutes(15));

        let tf = TimeFilter::parse_range_at("last 1h", now).unwrap();
        assert_eq!(tf.start_secs(), now.timestamp() - 3600);
    }

    #[test]
    fn test_oversized_last_range_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(matches!(
            TimeFilter::parse_range_at("last 99999999999 weeks", now),
            Err(ProfilerError::InvalidTimeFilter(_))
        ));
        assert!(matches!(
            TimeFilter::parse_range_at("last 20000000 weeks", now),
            Err(ProfilerError::InvalidTimeFilter(_))
        ));
        let huge = format!("{} weeks", "9".repeat(400));
        assert!(matches!(parse_duration(&huge), Err(ProfilerError::InvalidTimeFilter(_))));

        let tf = TimeFilter::last(Duration::weeks(100_000_000));
        assert_eq!(tf.start, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_parse_absolute_range() {
        let tf = TimeFilter::parse_range("2024-05-01 10:00:00 to 2024-05-01 11:30:00").unwrap();
        assert_eq!(tf.duration(), Duration::minutes(90));

        let tf = TimeFilter::parse_range("2024-05-01T10:00:00Z to 2024-05-01T10:05:00Z").unwrap();
        assert_eq!(tf.duration(), Duration::minutes(5));

        assert!(TimeFilter::parse_range("2024-05-01 11:00 to 2024-05-01 10:00").is_err());
        assert!(TimeFilter::parse_range("yesterday-ish").is_err());
    }
}

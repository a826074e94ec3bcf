//! Time-of-day session windows.
//!
//! A window is written `HH:MM-HH:MM`, is half-open (`start <= t < end`) and
//! may wrap midnight (`22:00-02:00`). Equal endpoints cover the whole day.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t < self.end
        } else if self.start > self.end {
            t >= self.start || t < self.end
        } else {
            true
        }
    }
}

impl FromStr for TimeWindow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidWindow {
            window: s.to_string(),
            reason: reason.to_string(),
        };
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected HH:MM-HH:MM"))?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
            .map_err(|_| invalid("bad start time"))?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
            .map_err(|_| invalid("bad end time"))?;
        Ok(Self { start, end })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Parse a list of window strings, failing on the first malformed one.
pub fn parse_windows(specs: &[String]) -> Result<Vec<TimeWindow>, ConfigError> {
    specs.iter().map(|s| s.parse()).collect()
}

/// Outcome of checking a timestamp against an allow-list and a deny-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowGate {
    Open,
    OutsideEntryWindow,
    Excluded,
}

impl WindowGate {
    /// Reason string reported when the gate blocks an evaluation.
    pub fn reason(self) -> Option<&'static str> {
        match self {
            Self::Open => None,
            Self::OutsideEntryWindow => Some("blocked: outside entry window"),
            Self::Excluded => Some("blocked: excluded window"),
        }
    }
}

/// Allow-list and deny-list pair. An empty allow-list admits the whole day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionWindows {
    pub allow: Vec<TimeWindow>,
    pub deny: Vec<TimeWindow>,
}

impl SessionWindows {
    pub fn new(allow: Vec<TimeWindow>, deny: Vec<TimeWindow>) -> Self {
        Self { allow, deny }
    }

    pub fn gate(&self, ts: NaiveDateTime) -> WindowGate {
        let t = ts.time();
        if !self.allow.is_empty() && !self.allow.iter().any(|w| w.contains(t)) {
            return WindowGate::OutsideEntryWindow;
        }
        if self.deny.iter().any(|w| w.contains(t)) {
            return WindowGate::Excluded;
        }
        WindowGate::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_and_display() {
        let w: TimeWindow = "08:00-10:30".parse().unwrap();
        assert_eq!(w.start, t(8, 0));
        assert_eq!(w.end, t(10, 30));
        assert_eq!(w.to_string(), "08:00-10:30");
    }

    #[test]
    fn malformed_windows_are_errors() {
        assert!("08:00".parse::<TimeWindow>().is_err());
        assert!("8am-10am".parse::<TimeWindow>().is_err());
        assert!("25:00-10:00".parse::<TimeWindow>().is_err());
        let err = parse_windows(&["08:00-09:00".into(), "x".into()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { .. }));
    }

    #[test]
    fn half_open_bounds() {
        let w: TimeWindow = "08:00-10:00".parse().unwrap();
        assert!(w.contains(t(8, 0)));
        assert!(w.contains(t(9, 55)));
        assert!(!w.contains(t(10, 0)));
        assert!(!w.contains(t(7, 55)));
    }

    #[test]
    fn wrapping_window() {
        let w: TimeWindow = "22:00-02:00".parse().unwrap();
        assert!(w.contains(t(23, 0)));
        assert!(w.contains(t(1, 55)));
        assert!(!w.contains(t(2, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn gate_checks_allow_before_deny() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let windows = SessionWindows::new(
            vec!["08:00-12:00".parse().unwrap()],
            vec!["09:00-09:30".parse().unwrap()],
        );
        assert_eq!(windows.gate(day.and_time(t(8, 30))), WindowGate::Open);
        assert_eq!(windows.gate(day.and_time(t(9, 10))), WindowGate::Excluded);
        assert_eq!(
            windows.gate(day.and_time(t(13, 0))),
            WindowGate::OutsideEntryWindow
        );
        assert_eq!(
            WindowGate::OutsideEntryWindow.reason(),
            Some("blocked: outside entry window")
        );
    }

    #[test]
    fn empty_allow_list_admits_all_day() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let windows = SessionWindows::default();
        assert_eq!(windows.gate(day.and_time(t(3, 0))), WindowGate::Open);
    }
}

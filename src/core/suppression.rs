// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Post-alarm suppression window

use chrono::{Duration, NaiveDateTime};

use super::Moment;

/// Cool-down after an alarm stop during which triggers are dropped.
///
/// There is no explicit clear: the window lapses once the monotonic
/// reading reaches the deadline. The wall time is kept for display only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressionWindow {
    until: Option<Moment>,
}

impl SuppressionWindow {
    pub fn new() -> Self {
        Self { until: None }
    }

    /// Start a fresh window at `now`, replacing any previous one
    pub fn open(&mut self, now: Moment, length: Duration) {
        self.until = Some(now.after(length));
    }

    /// Wall time at which the window lapses
    pub fn until(&self) -> Option<NaiveDateTime> {
        self.until.map(|until| until.wall)
    }

    /// Whether a trigger arriving at `now` may pass
    pub fn allows(&self, now: Moment) -> bool {
        match self.until {
            Some(until) => now.elapsed >= until.elapsed,
            None => true,
        }
    }

    pub fn is_active(&self, now: Moment) -> bool {
        !self.allows(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> Moment {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .into()
    }

    #[test]
    fn test_empty_window_allows() {
        assert!(SuppressionWindow::new().allows(at(0, 0, 0)));
    }

    #[test]
    fn test_window_is_half_open() {
        let mut window = SuppressionWindow::new();
        window.open(at(12, 0, 0), Duration::seconds(5));

        assert!(!window.allows(at(12, 0, 0)));
        assert!(!window.allows(at(12, 0, 4)));
        assert!(window.allows(at(12, 0, 5)));
        assert!(window.allows(at(12, 1, 0)));
    }

    #[test]
    fn test_reopen_overwrites() {
        let mut window = SuppressionWindow::new();
        window.open(at(12, 0, 0), Duration::seconds(5));
        window.open(at(12, 0, 1), Duration::seconds(5));
        assert_eq!(window.until(), Some(at(12, 0, 6).wall));
        assert!(window.is_active(at(12, 0, 5)));
    }

    #[test]
    fn test_wall_clock_going_back_does_not_extend_window() {
        let stopped = at(2, 59, 58);
        let mut window = SuppressionWindow::new();
        window.open(stopped, Duration::seconds(5));

        // an hour fall-back happens, then 30 real seconds pass
        let later = Moment::new(at(2, 0, 28).wall, stopped.elapsed + Duration::seconds(30));
        assert!(window.allows(later));

        let early = Moment::new(at(2, 0, 0).wall, stopped.elapsed + Duration::seconds(2));
        assert!(window.is_active(early));
    }
}

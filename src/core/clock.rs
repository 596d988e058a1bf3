// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Time sources
//!
//! Schedules and log stamps follow local wall time. Durations such as the
//! suppression window are measured on a monotonic reading, so DST changes
//! and clock steps cannot stretch or shrink them.

use chrono::{Duration, Local, NaiveDateTime};
use parking_lot::Mutex;
use std::time::Instant;

/// One reading of both clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// Local wall time
    pub wall: NaiveDateTime,
    /// Monotonic time since the clock's origin
    pub elapsed: Duration,
}

impl Moment {
    pub fn new(wall: NaiveDateTime, elapsed: Duration) -> Self {
        Self { wall, elapsed }
    }

    /// Both readings moved forward by `by`
    pub fn after(self, by: Duration) -> Self {
        Self {
            wall: self.wall + by,
            elapsed: self.elapsed + by,
        }
    }
}

/// A wall time taken as its own monotonic reading, for replays where
/// the wall clock never steps.
impl From<NaiveDateTime> for Moment {
    fn from(wall: NaiveDateTime) -> Self {
        let elapsed = Duration::milliseconds(wall.and_utc().timestamp_millis());
        Self { wall, elapsed }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Moment;
}

/// Local system time plus a process-local monotonic counter
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        let elapsed = Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| Duration::max_value());
        Moment::new(Local::now().naive_local(), elapsed)
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Moment>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(Moment::from(start)),
        }
    }

    /// Let real time pass: both readings move by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.after(by);
    }

    /// Jump to a later wall time, with the same real time passing
    pub fn set(&self, wall: NaiveDateTime) {
        let mut now = self.now.lock();
        let by = wall - now.wall;
        *now = now.after(by);
    }

    /// Step the wall clock only, as a DST change or time sync does
    pub fn step_wall(&self, wall: NaiveDateTime) {
        self.now.lock().wall = wall;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Moment {
        *self.now.lock()
    }
}

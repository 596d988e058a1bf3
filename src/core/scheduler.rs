// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Arming schedule and the monitor that enforces it

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Clock, Command, CommandOrigin, ControllerHandle, EventBus};
use crate::error::{ControlError, ControlResult};

/// Parse a 24-hour `HH:MM` time of day
pub fn parse_time(input: &str) -> ControlResult<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| ControlError::InvalidFormat(input.to_string()))
}

/// Daily arming window. `start > stop` spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            stop: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl Schedule {
    pub fn new(start: NaiveTime, stop: NaiveTime) -> Self {
        Self { start, stop }
    }

    /// Parse both bounds; either failing rejects the pair
    pub fn parse(start: &str, stop: &str) -> ControlResult<Self> {
        Ok(Self::new(parse_time(start)?, parse_time(stop)?))
    }

    pub fn is_overnight(&self) -> bool {
        self.start >= self.stop
    }

    /// Whether the system should be armed at this time of day
    pub fn should_be_armed(&self, now: NaiveTime) -> bool {
        if self.start < self.stop {
            self.start <= now && now < self.stop
        } else {
            now >= self.start || now < self.stop
        }
    }

    /// Next arm/disarm event as seen from `now`
    pub fn next_event(&self, armed: bool, now: NaiveDateTime) -> NextEvent {
        let (action, time) = if armed {
            (ScheduleAction::Deactivate, self.stop)
        } else {
            (ScheduleAction::Activate, self.start)
        };

        let mut at = now.date().and_time(time);
        if at < now {
            at += chrono::Duration::days(1);
        }

        NextEvent { action, at }
    }

    pub fn start_label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn stop_label(&self) -> String {
        self.stop.format("%H:%M").to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_label(), self.stop_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleAction {
    Activate,
    Deactivate,
}

/// Upcoming scheduled transition, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextEvent {
    pub action: ScheduleAction,
    pub at: NaiveDateTime,
}

impl fmt::Display for NextEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}", self.action, self.at.format("%a %H:%M"))
    }
}

/// Polls the schedule and asks the engine to arm or disarm.
///
/// Every tick starts from the latest engine snapshot and the current
/// time, so pausing the monitor never desynchronizes it.
pub struct ScheduleMonitor {
    handle: ControllerHandle,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    interval: Duration,
}

impl ScheduleMonitor {
    pub fn new(
        handle: ControllerHandle,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
        interval: Duration,
    ) -> Self {
        Self {
            handle,
            clock,
            event_bus,
            interval,
        }
    }

    /// Evaluate the schedule once
    pub fn tick(&self) -> NextEvent {
        let snapshot = self.handle.snapshot();
        let now = self.clock.now().wall;
        let should_be_armed = snapshot.schedule.should_be_armed(now.time());

        if should_be_armed != snapshot.armed {
            let command = if should_be_armed {
                info!("Schedule: auto-arming ({})", snapshot.schedule);
                Command::Arm { origin: CommandOrigin::Schedule }
            } else {
                info!("Schedule: auto-disarming ({})", snapshot.schedule);
                Command::Disarm { origin: CommandOrigin::Schedule }
            };
            if let Err(e) = self.handle.submit(command) {
                warn!("Schedule monitor could not reach engine: {}", e);
            }
        }

        let next = snapshot.schedule.next_event(should_be_armed, now);
        self.event_bus.publish_next_event(next);
        next
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Schedule monitor started (every {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let next = self.tick();
                    debug!("Next scheduled event: {}", next);
                }
                _ = shutdown.recv() => {
                    info!("Schedule monitor shutting down...");
                    break;
                }
            }
        }
    }
}

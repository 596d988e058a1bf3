// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Core module - the alarm engine and everything that feeds it
//!
//! Producers (schedule monitor, hardware link, simulator, operator
//! console) only ever submit [`Command`]s. The [`Controller`] applies
//! them one at a time to the [`AlarmEngine`], which answers with
//! [`Intent`]s describing the side effects to carry out.

mod clock;
mod controller;
mod engine;
mod event_bus;
mod scheduler;
mod suppression;

pub use clock::{Clock, ManualClock, Moment, SystemClock};
pub use controller::{Collaborators, Controller, ControllerHandle};
pub use engine::{AlarmEngine, EngineSettings, EngineState, Outcome};
pub use event_bus::{EngineEvent, Event, EventBus};
pub use scheduler::{parse_time, NextEvent, Schedule, ScheduleAction, ScheduleMonitor};
pub use suppression::SuppressionWindow;

use std::collections::BTreeSet;
use std::fmt;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::PersistedState;
use crate::notify::{AlertRecord, Channel};
use crate::sensors::{Position, Sensor, SensorType, TriggerOrigin};

/// Who asked for an arm/disarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOrigin {
    Manual,
    Schedule,
    /// Armed flag carried over from the previous run
    Restore,
}

/// Requests accepted by the engine, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Arm { origin: CommandOrigin },
    Disarm { origin: CommandOrigin },
    /// A normalized trigger from a sensor feed, resolved by type
    Trigger { sensor_type: SensorType, origin: TriggerOrigin },
    /// Operator-raised trigger; first sensor in the registry when unnamed
    ManualTrigger { sensor: Option<String> },
    StopAlarm,
    AddSensor { sensor_type: SensorType, position: Position },
    RenameSensor { old: String, new: String },
    RemoveSensor { name: String },
    MoveSensor { name: String, position: Position },
    SetSchedule { start: String, stop: String },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Arm { .. } => "arm",
            Command::Disarm { .. } => "disarm",
            Command::Trigger { .. } => "trigger",
            Command::ManualTrigger { .. } => "manual-trigger",
            Command::StopAlarm => "stop-alarm",
            Command::AddSensor { .. } => "add-sensor",
            Command::RenameSensor { .. } => "rename-sensor",
            Command::RemoveSensor { .. } => "remove-sensor",
            Command::MoveSensor { .. } => "move-sensor",
            Command::SetSchedule { .. } => "set-schedule",
        }
    }
}

/// Successful answer to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Applied,
    SensorAdded(String),
    /// Preconditions not met; nothing changed
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Suppressed,
    Disarmed,
    NoSensorOfType(SensorType),
    NoSensors,
    AlreadyArmed,
    AlreadyDisarmed,
    NotSounding,
    Unchanged,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::Suppressed => f.write_str("suppression window active"),
            IgnoreReason::Disarmed => f.write_str("system is disarmed"),
            IgnoreReason::NoSensorOfType(t) => write!(f, "no {} sensor registered", t),
            IgnoreReason::NoSensors => f.write_str("no sensors registered"),
            IgnoreReason::AlreadyArmed => f.write_str("already armed"),
            IgnoreReason::AlreadyDisarmed => f.write_str("already disarmed"),
            IgnoreReason::NotSounding => f.write_str("alarm is not sounding"),
            IgnoreReason::Unchanged => f.write_str("nothing to change"),
        }
    }
}

/// Why an alarm episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Manual,
    Disarmed,
    /// The last triggered sensor was deleted
    SensorRemoved,
}

/// Side effects requested by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Persist(PersistedState),
    StartProducers,
    StopProducers,
    StartSiren { episode: Uuid },
    StopSiren { episode: Uuid, reason: StopReason, at: NaiveDateTime },
    LogAlert { episode: Uuid, record: AlertRecord },
    Notify { channel: Channel, message: String },
    Redraw,
}

/// Alarm state of the current episode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmState {
    pub sounding: bool,
    pub triggered: BTreeSet<String>,
    pub episode: Option<Uuid>,
}

/// Logical engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    Disarmed,
    ArmedIdle,
    ArmedAlarm,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Disarmed => f.write_str("SYSTEM INACTIVE"),
            EngineMode::ArmedIdle => f.write_str("SYSTEM ACTIVE"),
            EngineMode::ArmedAlarm => f.write_str("SYSTEM ALARM: INTRUSION!"),
        }
    }
}

/// Read-only view handed to everything outside the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub mode: EngineMode,
    pub armed: bool,
    pub sounding: bool,
    pub triggered: Vec<String>,
    pub suppressed_until: Option<NaiveDateTime>,
    pub schedule: Schedule,
    pub sensors: Vec<Sensor>,
}

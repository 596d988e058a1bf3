// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Alarm coordination engine
//!
//! ```text
//!              arm                      trigger (gate open)
//!  Disarmed ─────────► Armed-Idle ──────────────────────► Armed-Alarm
//!     ▲                  │   ▲                               │    ▲
//!     │      disarm      │   │  stop-alarm / last triggered  │    │ trigger
//!     └──────────────────┘   └─────── sensor removed ────────┘────┘
//!     ▲                                                      │
//!     └──────────────── disarm (forces stop) ────────────────┘
//! ```
//!
//! The engine is a plain state machine: it never performs I/O. Each
//! command returns the side effects to perform as [`Intent`]s, and at
//! most one start burst (siren, log entry, notifications) is emitted
//! per alarm episode.

use chrono::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    Ack, AlarmState, Command, EngineMode, IgnoreReason, Intent, Moment, Schedule,
    StatusSnapshot, StopReason, SuppressionWindow,
};
use crate::db::PersistedState;
use crate::error::{ControlError, ControlResult};
use crate::notify::{AlertRecord, Channel};
use crate::sensors::{Position, SensorRegistry, SensorStatus, SensorType};

/// Label logged for operator-raised triggers
pub const MANUAL_TRIGGER_LABEL: &str = "Manual Trigger";

/// Tunables for the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Length of the cool-down opened by every alarm stop
    pub suppression: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            suppression: Duration::seconds(5),
        }
    }
}

/// Everything the engine owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineState {
    pub armed: bool,
    pub alarm: AlarmState,
    pub suppression: SuppressionWindow,
    pub registry: SensorRegistry,
    pub schedule: Schedule,
}

/// Result of applying one command
#[derive(Debug)]
pub struct Outcome {
    pub result: ControlResult<Ack>,
    pub intents: Vec<Intent>,
}

impl Outcome {
    fn ignored(reason: IgnoreReason) -> Self {
        Self {
            result: Ok(Ack::Ignored(reason)),
            intents: Vec::new(),
        }
    }

    fn rejected(error: ControlError) -> Self {
        Self {
            result: Err(error),
            intents: Vec::new(),
        }
    }
}

/// Single-writer alarm state machine
pub struct AlarmEngine {
    state: EngineState,
    settings: EngineSettings,
}

impl AlarmEngine {
    /// New engine: disarmed, silent, no suppression
    pub fn new(registry: SensorRegistry, schedule: Schedule, settings: EngineSettings) -> Self {
        Self {
            state: EngineState {
                armed: false,
                alarm: AlarmState::default(),
                suppression: SuppressionWindow::new(),
                registry,
                schedule,
            },
            settings,
        }
    }

    /// Engine over previously saved data.
    ///
    /// The saved armed flag is not applied here; callers submit an arm
    /// command so the usual side effects run.
    pub fn from_persisted(persisted: PersistedState, settings: EngineSettings) -> Self {
        let mut registry = SensorRegistry::from_sensors(persisted.sensors);
        registry.reset_all();
        Self::new(registry, persisted.schedule, settings)
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn mode(&self) -> EngineMode {
        match (self.state.armed, self.state.alarm.sounding) {
            (false, _) => EngineMode::Disarmed,
            (true, false) => EngineMode::ArmedIdle,
            (true, true) => EngineMode::ArmedAlarm,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            mode: self.mode(),
            armed: self.state.armed,
            sounding: self.state.alarm.sounding,
            triggered: self.state.alarm.triggered.iter().cloned().collect(),
            suppressed_until: self.state.suppression.until(),
            schedule: self.state.schedule,
            sensors: self.state.registry.sensors().to_vec(),
        }
    }

    pub fn persisted(&self) -> PersistedState {
        PersistedState {
            armed: self.state.armed,
            schedule: self.state.schedule,
            sensors: self.state.registry.sensors().to_vec(),
        }
    }

    /// Apply one command at time `now`
    pub fn handle(&mut self, command: Command, now: impl Into<Moment>) -> Outcome {
        let now = now.into();
        let kind = command.kind();
        let outcome = match command {
            Command::Arm { origin } => {
                debug!("Arm requested ({:?})", origin);
                self.arm()
            }
            Command::Disarm { origin } => {
                debug!("Disarm requested ({:?})", origin);
                self.disarm(now)
            }
            Command::Trigger { sensor_type, origin } => {
                debug!("{} trigger from {}", sensor_type, origin);
                self.trigger(sensor_type, now)
            }
            Command::ManualTrigger { sensor } => self.manual_trigger(sensor, now),
            Command::StopAlarm => self.stop(now),
            Command::AddSensor { sensor_type, position } => self.add_sensor(sensor_type, position),
            Command::RenameSensor { old, new } => self.rename_sensor(&old, &new),
            Command::RemoveSensor { name } => self.remove_sensor(&name, now),
            Command::MoveSensor { name, position } => self.move_sensor(&name, position),
            Command::SetSchedule { start, stop } => self.set_schedule(&start, &stop),
        };

        match &outcome.result {
            Ok(Ack::Ignored(reason)) => debug!("Command {} ignored: {}", kind, reason),
            Err(e) => warn!("Command {} rejected: {}", kind, e),
            Ok(_) => {}
        }
        outcome
    }

    fn applied(&self, ack: Ack, mut intents: Vec<Intent>) -> Outcome {
        intents.push(Intent::Persist(self.persisted()));
        intents.push(Intent::Redraw);
        Outcome {
            result: Ok(ack),
            intents,
        }
    }

    fn arm(&mut self) -> Outcome {
        if self.state.armed {
            return Outcome::ignored(IgnoreReason::AlreadyArmed);
        }
        self.state.armed = true;
        info!("System armed");
        self.applied(Ack::Applied, vec![Intent::StartProducers])
    }

    fn disarm(&mut self, now: Moment) -> Outcome {
        if !self.state.armed {
            return Outcome::ignored(IgnoreReason::AlreadyDisarmed);
        }
        self.state.armed = false;

        let mut intents = vec![Intent::StopProducers];
        if self.state.alarm.sounding {
            self.silence(now, StopReason::Disarmed, &mut intents);
        }
        self.state.registry.reset_all();
        self.state.alarm.triggered.clear();

        info!("System disarmed");
        self.applied(Ack::Applied, intents)
    }

    fn trigger(&mut self, sensor_type: SensorType, now: Moment) -> Outcome {
        if !self.state.suppression.allows(now) {
            return Outcome::ignored(IgnoreReason::Suppressed);
        }
        if !self.state.armed {
            return Outcome::ignored(IgnoreReason::Disarmed);
        }
        let name = match self.state.registry.resolve_by_type(sensor_type) {
            Some(name) => name.to_string(),
            None => return Outcome::ignored(IgnoreReason::NoSensorOfType(sensor_type)),
        };
        self.raise(&name, sensor_type.prefix(), now)
    }

    fn manual_trigger(&mut self, sensor: Option<String>, now: Moment) -> Outcome {
        if !self.state.suppression.allows(now) {
            return Outcome::ignored(IgnoreReason::Suppressed);
        }
        if !self.state.armed {
            return Outcome::ignored(IgnoreReason::Disarmed);
        }
        let name = match sensor {
            Some(name) if self.state.registry.contains(&name) => name,
            Some(name) => return Outcome::rejected(ControlError::NotFound(name)),
            None => match self.state.registry.first() {
                Some(first) => first.name.clone(),
                None => return Outcome::ignored(IgnoreReason::NoSensors),
            },
        };
        self.raise(&name, MANUAL_TRIGGER_LABEL, now)
    }

    /// Attribute a trigger to `name`, starting an episode if none is open
    fn raise(&mut self, name: &str, trigger: &str, now: Moment) -> Outcome {
        let newly_added = self.state.alarm.triggered.insert(name.to_string());
        if self.state.alarm.sounding && !newly_added {
            return Outcome::ignored(IgnoreReason::Unchanged);
        }

        self.state.registry.set_status(name, SensorStatus::Triggered);

        let mut intents = Vec::new();
        if !self.state.alarm.sounding {
            let episode = Uuid::new_v4();
            self.state.alarm.sounding = true;
            self.state.alarm.episode = Some(episode);

            let record = AlertRecord::new(now.wall, name, trigger);
            warn!("ALARM: {}", record.message);

            let message = record.message.clone();
            intents.push(Intent::StartSiren { episode });
            intents.push(Intent::LogAlert { episode, record });
            intents.push(Intent::Notify {
                channel: Channel::Email,
                message: message.clone(),
            });
            intents.push(Intent::Notify {
                channel: Channel::Sms,
                message,
            });
        } else {
            info!("Alarm already sounding; added {} to triggered set", name);
        }

        self.applied(Ack::Applied, intents)
    }

    fn stop(&mut self, now: Moment) -> Outcome {
        if !self.state.alarm.sounding {
            return Outcome::ignored(IgnoreReason::NotSounding);
        }
        let mut intents = Vec::new();
        self.silence(now, StopReason::Manual, &mut intents);
        self.applied(Ack::Applied, intents)
    }

    /// End the current episode: siren off, every sensor back to normal,
    /// fresh suppression window.
    fn silence(&mut self, now: Moment, reason: StopReason, intents: &mut Vec<Intent>) {
        let episode = self.state.alarm.episode.take().unwrap_or_else(Uuid::nil);
        self.state.alarm.sounding = false;
        self.state.alarm.triggered.clear();
        self.state.registry.reset_all();
        self.state.suppression.open(now, self.settings.suppression);

        info!("Alarm stopped ({:?}); ignoring triggers until {:?}", reason, self.state.suppression.until());
        intents.push(Intent::StopSiren { episode, reason, at: now.wall });
    }

    fn add_sensor(&mut self, sensor_type: SensorType, position: Position) -> Outcome {
        match self.state.registry.add(sensor_type, position) {
            Ok(name) => {
                info!("Added new sensor: {} ({})", name, sensor_type);
                self.applied(Ack::SensorAdded(name), Vec::new())
            }
            Err(e) => Outcome::rejected(e),
        }
    }

    fn rename_sensor(&mut self, old: &str, new: &str) -> Outcome {
        match self.state.registry.rename(old, new) {
            Ok(false) => Outcome::ignored(IgnoreReason::Unchanged),
            Ok(true) => {
                let new = new.trim();
                if self.state.alarm.triggered.remove(old) {
                    self.state.alarm.triggered.insert(new.to_string());
                }
                info!("Sensor renamed from '{}' to '{}'", old, new);
                self.applied(Ack::Applied, Vec::new())
            }
            Err(e) => Outcome::rejected(e),
        }
    }

    fn remove_sensor(&mut self, name: &str, now: Moment) -> Outcome {
        if let Err(e) = self.state.registry.remove(name) {
            return Outcome::rejected(e);
        }

        let mut intents = Vec::new();
        if self.state.alarm.triggered.remove(name)
            && self.state.alarm.sounding
            && self.state.alarm.triggered.is_empty()
        {
            self.silence(now, StopReason::SensorRemoved, &mut intents);
        }

        info!("Deleted sensor: {}", name);
        self.applied(Ack::Applied, intents)
    }

    fn move_sensor(&mut self, name: &str, position: Position) -> Outcome {
        match self.state.registry.move_to(name, position) {
            Ok(()) => self.applied(Ack::Applied, Vec::new()),
            Err(e) => Outcome::rejected(e),
        }
    }

    fn set_schedule(&mut self, start: &str, stop: &str) -> Outcome {
        match Schedule::parse(start, stop) {
            Ok(schedule) => {
                self.state.schedule = schedule;
                info!("Schedule updated: {}", schedule);
                self.applied(Ack::Applied, Vec::new())
            }
            Err(e) => Outcome::rejected(e),
        }
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor traits and common types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sensor types supported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Passive infrared / beam-break
    #[serde(rename = "IR")]
    Ir,
    /// Microphone threshold
    Sound,
}

impl SensorType {
    /// Prefix used when generating sensor names
    pub fn prefix(&self) -> &'static str {
        match self {
            SensorType::Ir => "IR",
            SensorType::Sound => "Sound",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ir" => Ok(SensorType::Ir),
            "sound" => Ok(SensorType::Sound),
            other => Err(format!("unknown sensor type '{}'", other)),
        }
    }
}

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorStatus {
    #[default]
    Normal,
    Triggered,
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStatus::Normal => f.write_str("Normal"),
            SensorStatus::Triggered => f.write_str("Triggered"),
        }
    }
}

/// Position on the floor plan, in map pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Floor plan area new sensors are dropped into
    pub const PLACEMENT_X: (i32, i32) = (50, 350);
    pub const PLACEMENT_Y: (i32, i32) = (50, 200);

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Random spot inside the placement area
    pub fn random_on_floorplan() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            x: rng.gen_range(Self::PLACEMENT_X.0..=Self::PLACEMENT_X.1),
            y: rng.gen_range(Self::PLACEMENT_Y.0..=Self::PLACEMENT_Y.1),
        }
    }
}

/// A registered sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub sensor_type: SensorType,
    pub position: Position,
    pub status: SensorStatus,
}

impl Sensor {
    pub fn new(name: &str, sensor_type: SensorType, position: Position) -> Self {
        Self {
            name: name.to_string(),
            sensor_type,
            position,
            status: SensorStatus::Normal,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.status == SensorStatus::Triggered
    }
}

/// Where a trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOrigin {
    Hardware,
    Simulator,
    Manual,
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerOrigin::Hardware => f.write_str("hardware"),
            TriggerOrigin::Simulator => f.write_str("simulator"),
            TriggerOrigin::Manual => f.write_str("manual"),
        }
    }
}

/// Blocking source of raw trigger codes, driven by a producer thread.
///
/// `poll` must return within a short bounded time so the producer can
/// observe its stop signal; `pause` tells the producer how long to wait
/// before polling again.
pub trait TriggerFeed: Send {
    /// Feed name used in logs
    fn label(&self) -> &str;

    /// Origin attached to every trigger this feed produces
    fn origin(&self) -> TriggerOrigin;

    /// Read the next chunk of raw codes, if any arrived
    fn poll(&mut self) -> Result<Option<String>>;

    /// Delay before the next poll
    fn pause(&self) -> Duration;
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor registry - the set of named sensors on the floor plan
//!
//! Names are the identity of a sensor and stay unique at all times.
//! Iteration order is insertion order; it decides which sensor a
//! type-based trigger lands on, so it is kept stable.

use tracing::{debug, warn};

use super::{Position, Sensor, SensorStatus, SensorType};
use crate::error::{ControlError, ControlResult};

/// Highest numeric suffix tried when generating a sensor name
pub const MAX_NAME_SUFFIX: u32 = 99;

/// Ordered, name-unique collection of sensors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorRegistry {
    sensors: Vec<Sensor>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self { sensors: Vec::new() }
    }

    /// Layout used when no saved state exists
    pub fn with_defaults() -> Self {
        let defaults = [
            ("IR_LivingRoom", SensorType::Ir, 50, 50),
            ("Sound_Kitchen", SensorType::Sound, 200, 70),
            ("IR_Hallway", SensorType::Ir, 100, 200),
            ("Sound_BackDoor", SensorType::Sound, 350, 150),
        ];

        Self {
            sensors: defaults
                .iter()
                .map(|(name, sensor_type, x, y)| Sensor::new(name, *sensor_type, Position::new(*x, *y)))
                .collect(),
        }
    }

    /// Build from loaded records. Later duplicates of a name are dropped.
    pub fn from_sensors(sensors: Vec<Sensor>) -> Self {
        let mut registry = Self::new();
        for sensor in sensors {
            if registry.contains(&sensor.name) {
                warn!("Dropping duplicate sensor record '{}'", sensor.name);
                continue;
            }
            registry.sensors.push(sensor);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn get(&self, name: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First sensor in iteration order
    pub fn first(&self) -> Option<&Sensor> {
        self.sensors.first()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.sensors.iter().position(|s| s.name == name)
    }

    /// Smallest free `<prefix>_<n>` name with `n` in `1..=MAX_NAME_SUFFIX`
    pub fn generate_name(&self, sensor_type: SensorType) -> ControlResult<String> {
        let prefix = sensor_type.prefix();
        (1..=MAX_NAME_SUFFIX)
            .map(|n| format!("{}_{}", prefix, n))
            .find(|candidate| !self.contains(candidate))
            .ok_or_else(|| ControlError::ResourceExhausted(prefix.to_string()))
    }

    /// Add a new sensor under a generated name
    pub fn add(&mut self, sensor_type: SensorType, position: Position) -> ControlResult<String> {
        let name = self.generate_name(sensor_type)?;
        self.sensors.push(Sensor::new(&name, sensor_type, position));
        debug!("Registered sensor {} ({}) at ({}, {})", name, sensor_type, position.x, position.y);
        Ok(name)
    }

    /// Move a sensor to a new name.
    ///
    /// Returns `Ok(false)` when `new == old`. The renamed record moves to
    /// the end of the iteration order.
    pub fn rename(&mut self, old: &str, new: &str) -> ControlResult<bool> {
        let new = new.trim();
        if new.is_empty() {
            return Err(ControlError::InvalidName);
        }
        let index = self
            .index_of(old)
            .ok_or_else(|| ControlError::NotFound(old.to_string()))?;
        if new == old {
            return Ok(false);
        }
        if self.contains(new) {
            return Err(ControlError::AlreadyExists(new.to_string()));
        }

        let mut sensor = self.sensors.remove(index);
        sensor.name = new.to_string();
        self.sensors.push(sensor);
        Ok(true)
    }

    pub fn remove(&mut self, name: &str) -> ControlResult<Sensor> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        Ok(self.sensors.remove(index))
    }

    pub fn move_to(&mut self, name: &str, position: Position) -> ControlResult<()> {
        let index = self
            .index_of(name)
            .ok_or_else(|| ControlError::NotFound(name.to_string()))?;
        self.sensors[index].position = position;
        Ok(())
    }

    /// Set a sensor's status. Unknown names are reported and ignored.
    pub fn set_status(&mut self, name: &str, status: SensorStatus) -> bool {
        match self.sensors.iter_mut().find(|s| s.name == name) {
            Some(sensor) => {
                sensor.status = status;
                true
            }
            None => {
                warn!("Status update for unknown sensor '{}' ignored", name);
                false
            }
        }
    }

    /// Reset every sensor to `Normal`, returning how many changed
    pub fn reset_all(&mut self) -> usize {
        let mut changed = 0;
        for sensor in self.sensors.iter_mut().filter(|s| s.is_triggered()) {
            sensor.status = SensorStatus::Normal;
            changed += 1;
        }
        changed
    }

    /// Pick a sensor of the given type, preferring one that is not
    /// already triggered.
    pub fn resolve_by_type(&self, sensor_type: SensorType) -> Option<&str> {
        let mut of_type = self.sensors.iter().filter(|s| s.sensor_type == sensor_type);
        let fallback = of_type.clone().next();
        of_type
            .find(|s| !s.is_triggered())
            .or(fallback)
            .map(|s| s.name.as_str())
    }
}

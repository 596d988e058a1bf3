// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Trigger code normalization
//!
//! The sensor link speaks single characters: `I` (IR), `S` (Sound) and
//! `B` (both). Anything else on the line is noise and is dropped.

use tracing::debug;

use super::SensorType;

/// A recognized trigger code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCode {
    Ir,
    Sound,
    Both,
}

impl TriggerCode {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'I' => Some(TriggerCode::Ir),
            'S' => Some(TriggerCode::Sound),
            'B' => Some(TriggerCode::Both),
            _ => None,
        }
    }

    /// Sensor types this code fans out to, in emission order
    pub fn sensor_types(&self) -> &'static [SensorType] {
        match self {
            TriggerCode::Ir => &[SensorType::Ir],
            TriggerCode::Sound => &[SensorType::Sound],
            TriggerCode::Both => &[SensorType::Ir, SensorType::Sound],
        }
    }
}

/// All codes in a chunk read from a stream, in order
pub fn scan(chunk: &str) -> impl Iterator<Item = TriggerCode> + '_ {
    chunk
        .chars()
        .filter(|c| !c.is_whitespace())
        .filter_map(|c| {
            let code = TriggerCode::from_char(c);
            if code.is_none() {
                debug!("Dropped unknown trigger byte {:?}", c);
            }
            code
        })
}

/// Sensor types requested by a chunk, `Both` already expanded
pub fn expand(chunk: &str) -> Vec<SensorType> {
    scan(chunk)
        .flat_map(|code| code.sensor_types().iter().copied())
        .collect()
}

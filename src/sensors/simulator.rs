// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor simulator for demo/testing
//!
//! Emits the same single-character codes as the hardware link, at
//! random, so the whole pipeline can run without a board attached.

use anyhow::Result;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::time::Duration;

use super::{TriggerFeed, TriggerOrigin};

const CODES: [char; 3] = ['I', 'S', 'B'];

#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    /// Wait between quiet ticks
    pub tick: Duration,
    /// Chance of an intrusion on each tick
    pub intrusion_probability: f64,
    /// Wait after an emitted intrusion
    pub cooldown: Duration,
    pub seed: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            intrusion_probability: 0.001,
            cooldown: Duration::from_millis(5000),
            seed: None,
        }
    }
}

/// Random intrusion generator
pub struct SensorSimulator {
    settings: SimulatorSettings,
    rng: StdRng,
    next_pause: Duration,
}

impl SensorSimulator {
    pub fn new(settings: SimulatorSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let probability = if settings.intrusion_probability.is_nan() {
            0.0
        } else {
            settings.intrusion_probability.clamp(0.0, 1.0)
        };

        Self {
            settings: SimulatorSettings {
                intrusion_probability: probability,
                ..settings
            },
            rng,
            next_pause: settings.tick,
        }
    }

    /// One simulation tick
    pub fn tick(&mut self) -> Option<char> {
        if self.rng.gen_bool(self.settings.intrusion_probability) {
            let code = CODES[self.rng.gen_range(0..CODES.len())];
            self.next_pause = self.settings.cooldown;
            Some(code)
        } else {
            self.next_pause = self.settings.tick;
            None
        }
    }
}

impl TriggerFeed for SensorSimulator {
    fn label(&self) -> &str {
        "simulator"
    }

    fn origin(&self) -> TriggerOrigin {
        TriggerOrigin::Simulator
    }

    fn poll(&mut self) -> Result<Option<String>> {
        Ok(self.tick().map(String::from))
    }

    fn pause(&self) -> Duration {
        self.next_pause
    }
}

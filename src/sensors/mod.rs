// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor module - registry, trigger sources and code normalization

mod link;
mod normalizer;
mod producer;
mod registry;
mod simulator;
mod traits;

pub use link::{connect as connect_link, looks_like_board, LinkSettings, ReaderFeed};
pub use normalizer::{expand, scan, TriggerCode};
pub use producer::{ProducerSettings, ProducerSupervisor, TriggerSink};
pub use registry::{SensorRegistry, MAX_NAME_SUFFIX};
pub use simulator::{SensorSimulator, SimulatorSettings};
pub use traits::{Position, Sensor, SensorStatus, SensorType, TriggerFeed, TriggerOrigin};

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! HearthGuard - Home Intrusion Alarm Controller
//!
//! Arms and disarms on a daily schedule or by hand, turns trigger codes
//! from a serial sensor board (or a simulator) into alarm episodes, and
//! keeps a small registry of named sensors on a floor plan.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────┐
//! │ Schedule     │  │ Serial link  │  │ Simulator    │  │ Console │
//! │ Monitor      │  │ producer     │  │ producer     │  │         │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  └────┬────┘
//!        └─────────────────┴──── commands ───┴───────────────┘
//!                                   ↓
//!                  ┌────────────────────────────────┐
//!                  │ Controller (single consumer)   │
//!                  │   └─ AlarmEngine state machine │
//!                  └───────────────┬────────────────┘
//!                                  ↓ intents
//!   ┌──────────┐  ┌──────────┐  ┌───────┐  ┌───────────┐  ┌──────────┐
//!   │ Database │  │ Notifier │  │ Siren │  │ Alert log │  │ EventBus │→ MQTT
//!   └──────────┘  └──────────┘  └───────┘  └───────────┘  └──────────┘
//! ```

pub mod config;
pub mod console;
pub mod core;
pub mod db;
pub mod error;
pub mod notify;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use config::Config;
pub use core::{AlarmEngine, Command, Controller, ControllerHandle, EventBus};
pub use db::Database;
pub use error::{ControlError, ControlResult};
pub use sensors::{Sensor, SensorRegistry, SensorType};

/// HearthGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

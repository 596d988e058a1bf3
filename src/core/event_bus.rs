// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event bus towards the presentation layer

use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{NextEvent, StatusSnapshot, StopReason};
use crate::notify::AlertRecord;

/// What the presentation layer gets told about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Full state after a command was applied
    Status(StatusSnapshot),
    /// First trigger of an episode
    AlarmStarted { episode: Uuid, alert: AlertRecord },
    AlarmStopped { episode: Uuid, reason: StopReason, at: NaiveDateTime },
    NextSchedule(NextEvent),
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EngineEvent,
}

/// Fan-out of engine events. Publishing never blocks; slow
/// subscribers lag and skip.
pub struct EventBus {
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_status(&self, snapshot: StatusSnapshot) {
        self.publish(EngineEvent::Status(snapshot));
    }

    pub fn publish_alarm_started(&self, episode: Uuid, alert: AlertRecord) {
        self.publish(EngineEvent::AlarmStarted { episode, alert });
    }

    pub fn publish_alarm_stopped(&self, episode: Uuid, reason: StopReason, at: NaiveDateTime) {
        self.publish(EngineEvent::AlarmStopped { episode, reason, at });
    }

    pub fn publish_next_event(&self, next: NextEvent) {
        self.publish(EngineEvent::NextSchedule(next));
    }

    pub fn publish(&self, payload: EngineEvent) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

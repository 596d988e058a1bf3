// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Trigger producers
//!
//! Each [`TriggerFeed`] runs on its own OS thread because the feeds do
//! blocking reads. A thread owns its feed while running and hands it
//! back over a crossbeam channel when it exits, so the supervisor can
//! restart it later. A thread that does not finish within the stop
//! timeout is abandoned and its feed is lost.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::normalizer::expand;
use super::{SensorType, TriggerFeed, TriggerOrigin};

/// Longest uninterrupted sleep; bounds how late a stop is noticed
const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

/// Where producers deliver normalized triggers
pub trait TriggerSink: Send + Sync {
    /// Returns `false` once the receiving side is gone
    fn deliver(&self, sensor_type: SensorType, origin: TriggerOrigin) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct ProducerSettings {
    /// Bounded wait for producer threads to finish on stop
    pub stop_timeout: Duration,
    /// Ceiling for the read-error back-off
    pub max_backoff: Duration,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

struct Running {
    stop: Arc<AtomicBool>,
    done_rx: Receiver<Box<dyn TriggerFeed>>,
    thread: thread::JoinHandle<()>,
}

enum SlotState {
    Idle(Box<dyn TriggerFeed>),
    Running(Running),
    Lost,
}

struct Slot {
    label: String,
    state: SlotState,
}

/// Starts and stops the producer threads
pub struct ProducerSupervisor {
    slots: Mutex<Vec<Slot>>,
    settings: ProducerSettings,
}

impl ProducerSupervisor {
    pub fn new(settings: ProducerSettings) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub fn add_feed(&self, feed: Box<dyn TriggerFeed>) {
        info!("Registered trigger feed: {}", feed.label());
        self.slots.lock().push(Slot {
            label: feed.label().to_string(),
            state: SlotState::Idle(feed),
        });
    }

    pub fn feed_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of producer threads currently running
    pub fn running(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| matches!(&s.state, SlotState::Running(r) if !r.thread.is_finished()))
            .count()
    }

    /// Start every idle feed. Running producers are left alone.
    pub fn start_all(&self, sink: Arc<dyn TriggerSink>) -> usize {
        let mut slots = self.slots.lock();
        let mut started = 0;

        for slot in slots.iter_mut() {
            let feed = match std::mem::replace(&mut slot.state, SlotState::Lost) {
                SlotState::Idle(feed) => feed,
                // A thread that exited on its own has handed its feed back
                SlotState::Running(running) => match running.done_rx.try_recv() {
                    Ok(feed) => feed,
                    Err(_) => {
                        debug!("Producer {} already running", slot.label);
                        slot.state = SlotState::Running(running);
                        continue;
                    }
                },
                SlotState::Lost => {
                    warn!("Producer {} was abandoned and cannot restart", slot.label);
                    continue;
                }
            };

            match self.spawn(feed, sink.clone()) {
                Ok(running) => {
                    slot.state = SlotState::Running(running);
                    started += 1;
                }
                Err(e) => error!("Failed to start producer {}: {}", slot.label, e),
            }
        }

        if started > 0 {
            info!("Started {} trigger producer(s)", started);
        }
        started
    }

    fn spawn(&self, feed: Box<dyn TriggerFeed>, sink: Arc<dyn TriggerSink>) -> std::io::Result<Running> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = channel::bounded(1);
        let flag = stop.clone();
        let max_backoff = self.settings.max_backoff;

        let thread = thread::Builder::new()
            .name(format!("producer-{}", feed.label()))
            .spawn(move || run_feed(feed, flag, sink, max_backoff, done_tx))?;

        Ok(Running { stop, done_rx, thread })
    }

    /// Signal every producer and wait, bounded, for them to finish.
    ///
    /// Returns how many stopped in time.
    pub fn stop_all(&self) -> usize {
        let mut slots = self.slots.lock();

        for slot in slots.iter() {
            if let SlotState::Running(running) = &slot.state {
                running.stop.store(true, Ordering::SeqCst);
            }
        }

        let deadline = Instant::now() + self.settings.stop_timeout;
        let mut stopped = 0;

        for slot in slots.iter_mut() {
            let running = match std::mem::replace(&mut slot.state, SlotState::Lost) {
                SlotState::Running(running) => running,
                other => {
                    slot.state = other;
                    continue;
                }
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            match running.done_rx.recv_timeout(remaining) {
                Ok(feed) => {
                    let _ = running.thread.join();
                    slot.state = SlotState::Idle(feed);
                    stopped += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Producer {} did not stop within {:?}; abandoning it",
                        slot.label, self.settings.stop_timeout
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Producer {} exited without returning its feed", slot.label);
                }
            }
        }

        if stopped > 0 {
            info!("Stopped {} trigger producer(s)", stopped);
        }
        stopped
    }
}

/// Sleep for `total`, waking early when `stop` is raised
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(STOP_POLL_SLICE));
    }
}

fn run_feed(
    mut feed: Box<dyn TriggerFeed>,
    stop: Arc<AtomicBool>,
    sink: Arc<dyn TriggerSink>,
    max_backoff: Duration,
    done_tx: Sender<Box<dyn TriggerFeed>>,
) {
    let origin = feed.origin();
    let mut backoff: Option<Duration> = None;
    debug!("Producer {} running", feed.label());

    'outer: while !stop.load(Ordering::SeqCst) {
        match feed.poll() {
            Ok(Some(chunk)) => {
                backoff = None;
                for sensor_type in expand(&chunk) {
                    debug!("{} -> {} trigger", feed.label(), sensor_type);
                    if !sink.deliver(sensor_type, origin) {
                        warn!("Engine gone; producer {} exiting", feed.label());
                        break 'outer;
                    }
                }
            }
            Ok(None) => backoff = None,
            Err(e) => {
                let next = backoff
                    .map(|b| b * 2)
                    .unwrap_or_else(|| feed.pause() * 2)
                    .min(max_backoff);
                warn!("{} read error: {} (retrying in {:?})", feed.label(), e, next);
                backoff = Some(next);
            }
        }

        sleep_unless_stopped(backoff.unwrap_or_else(|| feed.pause()), &stop);
    }

    debug!("Producer {} stopped", feed.label());
    let _ = done_tx.send(feed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(SensorType, TriggerOrigin)>>,
    }

    impl TriggerSink for Recorder {
        fn deliver(&self, sensor_type: SensorType, origin: TriggerOrigin) -> bool {
            self.seen.lock().push((sensor_type, origin));
            true
        }
    }

    /// Replays scripted chunks, then stays quiet
    struct Scripted {
        script: VecDeque<Result<Option<String>>>,
        polls: Arc<Mutex<usize>>,
    }

    impl TriggerFeed for Scripted {
        fn label(&self) -> &str {
            "scripted"
        }

        fn origin(&self) -> TriggerOrigin {
            TriggerOrigin::Simulator
        }

        fn poll(&mut self) -> Result<Option<String>> {
            *self.polls.lock() += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn pause(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    /// Ignores the stop flag by blocking far longer than any timeout
    struct Stuck;

    impl TriggerFeed for Stuck {
        fn label(&self) -> &str {
            "stuck"
        }

        fn origin(&self) -> TriggerOrigin {
            TriggerOrigin::Hardware
        }

        fn poll(&mut self) -> Result<Option<String>> {
            thread::sleep(Duration::from_secs(2));
            Ok(None)
        }

        fn pause(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_triggers_are_normalized_in_order() {
        let supervisor = ProducerSupervisor::new(ProducerSettings::default());
        supervisor.add_feed(Box::new(Scripted {
            script: VecDeque::from(vec![
                Ok(Some("I\n".to_string())),
                Ok(Some("x".to_string())),
                Ok(Some("B".to_string())),
            ]),
            polls: Arc::new(Mutex::new(0)),
        }));

        let sink = Arc::new(Recorder::default());
        assert_eq!(supervisor.start_all(sink.clone()), 1);
        wait_for(|| sink.seen.lock().len() >= 3);
        assert_eq!(supervisor.stop_all(), 1);

        let seen: Vec<_> = sink.seen.lock().iter().map(|(t, _)| *t).collect();
        assert_eq!(seen, vec![SensorType::Ir, SensorType::Ir, SensorType::Sound]);
        assert!(sink.seen.lock().iter().all(|(_, o)| *o == TriggerOrigin::Simulator));
    }

    #[test]
    fn test_start_is_idempotent_and_restartable() {
        let supervisor = ProducerSupervisor::new(ProducerSettings::default());
        let polls = Arc::new(Mutex::new(0));
        supervisor.add_feed(Box::new(Scripted {
            script: VecDeque::new(),
            polls: polls.clone(),
        }));
        let sink: Arc<dyn TriggerSink> = Arc::new(Recorder::default());

        assert_eq!(supervisor.start_all(sink.clone()), 1);
        assert_eq!(supervisor.start_all(sink.clone()), 0);
        assert_eq!(supervisor.running(), 1);

        assert_eq!(supervisor.stop_all(), 1);
        assert_eq!(supervisor.running(), 0);

        assert_eq!(supervisor.start_all(sink), 1);
        assert_eq!(supervisor.stop_all(), 1);
        assert!(*polls.lock() > 0);
    }

    #[test]
    fn test_read_errors_back_off() {
        let polls = Arc::new(Mutex::new(0));
        let supervisor = ProducerSupervisor::new(ProducerSettings {
            stop_timeout: Duration::from_secs(1),
            max_backoff: Duration::from_millis(400),
        });
        supervisor.add_feed(Box::new(Scripted {
            script: (0..100).map(|_| Err(anyhow!("device unplugged"))).collect(),
            polls: polls.clone(),
        }));

        supervisor.start_all(Arc::new(Recorder::default()));
        thread::sleep(Duration::from_millis(300));
        supervisor.stop_all();

        // 10, 20, 40, 80, 160 ms waits: at most a handful of polls
        let count = *polls.lock();
        assert!(count >= 2 && count <= 7, "polled {} times", count);
    }

    #[test]
    fn test_stuck_producer_is_abandoned() {
        let supervisor = ProducerSupervisor::new(ProducerSettings {
            stop_timeout: Duration::from_millis(100),
            max_backoff: Duration::from_millis(100),
        });
        supervisor.add_feed(Box::new(Stuck));
        supervisor.start_all(Arc::new(Recorder::default()));
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert_eq!(supervisor.stop_all(), 0);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(supervisor.start_all(Arc::new(Recorder::default())), 0);
    }
}

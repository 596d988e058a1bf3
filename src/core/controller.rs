// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Controller - owns the engine and runs the single consumer loop
//!
//! Commands arrive over an unbounded channel and are applied strictly in
//! arrival order. Intents are handed to background workers (persistence,
//! producer control) or spawned tasks (notifications, alert log), so the
//! loop never waits on I/O.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AlarmEngine, Clock, Command, EventBus, Intent, Outcome, StatusSnapshot};
use crate::core::Ack;
use crate::db::{PersistedState, StateStore};
use crate::error::{ControlError, ControlResult};
use crate::notify::{AlertLog, NotificationHub, Siren};
use crate::sensors::{Position, ProducerSupervisor, SensorType, TriggerOrigin, TriggerSink};

/// External collaborators the intents are carried out against
pub struct Collaborators {
    pub store: Arc<dyn StateStore>,
    pub notifications: NotificationHub,
    pub siren: Arc<dyn Siren>,
    pub alert_log: AlertLog,
    pub producers: Arc<ProducerSupervisor>,
    pub event_bus: Arc<EventBus>,
}

struct Request {
    command: Command,
    reply: Option<oneshot::Sender<ControlResult<Ack>>>,
}

/// Cloneable entry point for every producer of commands
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<StatusSnapshot>,
}

impl ControllerHandle {
    /// Enqueue a command without waiting for its outcome
    pub fn submit(&self, command: Command) -> ControlResult<()> {
        self.tx
            .send(Request { command, reply: None })
            .map_err(|_| ControlError::EngineStopped)
    }

    /// Enqueue a command and wait until the engine has applied it
    pub async fn request(&self, command: Command) -> ControlResult<Ack> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Request {
                command,
                reply: Some(reply_tx),
            })
            .map_err(|_| ControlError::EngineStopped)?;
        reply_rx.await.map_err(|_| ControlError::EngineStopped)?
    }

    /// Add a sensor, at a random floor plan spot when no position is given
    pub async fn add_sensor(&self, sensor_type: SensorType, position: Option<Position>) -> ControlResult<Ack> {
        self.request(Command::AddSensor {
            sensor_type,
            position: position.unwrap_or_else(Position::random_on_floorplan),
        })
        .await
    }

    /// Latest published engine state
    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}

impl TriggerSink for ControllerHandle {
    fn deliver(&self, sensor_type: SensorType, origin: TriggerOrigin) -> bool {
        self.submit(Command::Trigger { sensor_type, origin }).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum ProducerControl {
    Start,
    Stop,
}

struct Workers {
    persist_tx: mpsc::UnboundedSender<PersistedState>,
    persist_task: JoinHandle<()>,
    producer_tx: mpsc::UnboundedSender<ProducerControl>,
    producer_task: JoinHandle<()>,
}

/// Single consumer of the command queue
pub struct Controller {
    engine: AlarmEngine,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    rx: mpsc::UnboundedReceiver<Request>,
    status_tx: watch::Sender<StatusSnapshot>,
    sink: ControllerHandle,
}

impl Controller {
    pub fn new(engine: AlarmEngine, clock: Arc<dyn Clock>, collaborators: Collaborators) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(engine.snapshot());
        let handle = ControllerHandle { tx, status };

        let controller = Self {
            engine,
            clock,
            collaborators,
            rx,
            status_tx,
            sink: handle.clone(),
        };
        (controller, handle)
    }

    /// Consume commands until shutdown, then stop producers and the
    /// siren and write the final state.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("Alarm controller started");
        let workers = self.spawn_workers();
        self.publish_status();

        loop {
            tokio::select! {
                request = self.rx.recv() => match request {
                    Some(request) => self.apply(request, &workers),
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("Alarm controller shutting down...");
                    break;
                }
            }
        }

        self.finish(workers).await;
        Ok(())
    }

    fn spawn_workers(&self) -> Workers {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let persist_task = tokio::spawn(persistence_worker(self.collaborators.store.clone(), persist_rx));

        let (producer_tx, producer_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn TriggerSink> = Arc::new(self.sink.clone());
        let producer_task = tokio::spawn(producer_worker(
            self.collaborators.producers.clone(),
            sink,
            producer_rx,
        ));

        Workers {
            persist_tx,
            persist_task,
            producer_tx,
            producer_task,
        }
    }

    fn apply(&mut self, request: Request, workers: &Workers) {
        let now = self.clock.now();
        let schedule_change = matches!(request.command, Command::SetSchedule { .. });

        let Outcome { result, intents } = self.engine.handle(request.command, now);

        for intent in intents {
            self.dispatch(intent, workers);
        }

        if schedule_change && result.is_ok() {
            let schedule = self.engine.state().schedule;
            let next = schedule.next_event(schedule.should_be_armed(now.wall.time()), now.wall);
            self.collaborators.event_bus.publish_next_event(next);
        }

        if let Some(reply) = request.reply {
            let _ = reply.send(result);
        }
    }

    fn dispatch(&self, intent: Intent, workers: &Workers) {
        match intent {
            Intent::Persist(state) => {
                if workers.persist_tx.send(state).is_err() {
                    warn!("Persistence worker gone; state not saved");
                }
            }
            Intent::StartProducers => {
                let _ = workers.producer_tx.send(ProducerControl::Start);
            }
            Intent::StopProducers => {
                let _ = workers.producer_tx.send(ProducerControl::Stop);
            }
            Intent::StartSiren { episode } => {
                if let Err(e) = self.collaborators.siren.start(episode) {
                    warn!("Siren failed to start: {}", e);
                }
            }
            Intent::StopSiren { episode, reason, at } => {
                if let Err(e) = self.collaborators.siren.stop(episode) {
                    warn!("Siren failed to stop: {}", e);
                }
                self.collaborators.event_bus.publish_alarm_stopped(episode, reason, at);
            }
            Intent::LogAlert { episode, record } => {
                let log = self.collaborators.alert_log.clone();
                let entry = record.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = log.append(&entry) {
                        warn!("Could not write alert log {:?}: {}", log.path(), e);
                    }
                });
                self.collaborators.event_bus.publish_alarm_started(episode, record);
            }
            Intent::Notify { channel, message } => {
                self.collaborators.notifications.dispatch(channel, message);
            }
            Intent::Redraw => self.publish_status(),
        }
    }

    fn publish_status(&self) {
        let snapshot = self.engine.snapshot();
        self.status_tx.send_replace(snapshot.clone());
        self.collaborators.event_bus.publish_status(snapshot);
    }

    async fn finish(self, workers: Workers) {
        let _ = workers.producer_tx.send(ProducerControl::Stop);
        drop(workers.producer_tx);
        if let Err(e) = workers.producer_task.await {
            error!("Producer worker failed: {}", e);
        }

        let state = self.engine.state();
        if state.alarm.sounding {
            if let Some(episode) = state.alarm.episode {
                if let Err(e) = self.collaborators.siren.stop(episode) {
                    warn!("Siren failed to stop: {}", e);
                }
            }
        }

        let _ = workers.persist_tx.send(self.engine.persisted());
        drop(workers.persist_tx);
        if let Err(e) = workers.persist_task.await {
            error!("Persistence worker failed: {}", e);
        }

        info!("Alarm controller stopped");
    }
}

/// Saves state off the async threads; a burst of saves collapses to
/// the newest one.
async fn persistence_worker(store: Arc<dyn StateStore>, mut rx: mpsc::UnboundedReceiver<PersistedState>) {
    while let Some(mut state) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            state = newer;
        }

        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.save(&state)).await {
            Ok(Ok(())) => debug!("State saved"),
            Ok(Err(e)) => warn!("Failed to save state: {}", e),
            Err(e) => error!("Save task failed: {}", e),
        }
    }
}

/// Applies start/stop requests in order; stopping waits on threads
async fn producer_worker(
    supervisor: Arc<ProducerSupervisor>,
    sink: Arc<dyn TriggerSink>,
    mut rx: mpsc::UnboundedReceiver<ProducerControl>,
) {
    while let Some(control) = rx.recv().await {
        let supervisor = supervisor.clone();
        let sink = sink.clone();
        let result = tokio::task::spawn_blocking(move || match control {
            ProducerControl::Start => {
                supervisor.start_all(sink);
            }
            ProducerControl::Stop => {
                supervisor.stop_all();
            }
        })
        .await;

        if let Err(e) = result {
            error!("Producer {:?} failed: {}", control, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        CommandOrigin, EngineEvent, EngineMode, EngineSettings, ManualClock, Schedule, ScheduleMonitor,
    };
    use crate::db::Database;
    use crate::notify::LogSiren;
    use crate::sensors::{ProducerSettings, SensorRegistry, SensorSimulator, SimulatorSettings};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Rig {
        handle: ControllerHandle,
        clock: Arc<ManualClock>,
        store: Arc<dyn StateStore>,
        siren: Arc<dyn Siren>,
        bus: Arc<EventBus>,
        log_path: PathBuf,
        shutdown: broadcast::Sender<()>,
        task: JoinHandle<Result<()>>,
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 4, 20)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn rig_from(producers: ProducerSupervisor, store: Arc<dyn StateStore>, siren: Arc<dyn Siren>) -> Rig {
        let clock = Arc::new(ManualClock::new(at(21, 0, 0)));
        let bus = Arc::new(EventBus::new(1024));
        let log_path = std::env::temp_dir()
            .join(format!("hearthguard-ctl-{}", uuid::Uuid::new_v4()))
            .join("alerts.log");

        let engine = AlarmEngine::new(
            SensorRegistry::with_defaults(),
            Schedule::default(),
            EngineSettings::default(),
        );
        let (controller, handle) = Controller::new(
            engine,
            clock.clone(),
            Collaborators {
                store: store.clone(),
                notifications: NotificationHub::new(),
                siren: siren.clone(),
                alert_log: AlertLog::new(log_path.clone()),
                producers: Arc::new(producers),
                event_bus: bus.clone(),
            },
        );

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(controller.run(shutdown_rx));

        Rig {
            handle,
            clock,
            store,
            siren,
            bus,
            log_path,
            shutdown,
            task,
        }
    }

    fn rig_with(producers: ProducerSupervisor) -> Rig {
        rig_from(
            producers,
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(LogSiren::new()),
        )
    }

    fn rig() -> Rig {
        rig_with(ProducerSupervisor::new(ProducerSettings::default()))
    }

    /// Store whose writes always fail
    #[derive(Default)]
    struct ReadOnlyStore {
        attempts: AtomicUsize,
    }

    impl StateStore for ReadOnlyStore {
        fn load(&self) -> Result<Option<PersistedState>> {
            Ok(None)
        }

        fn save(&self, _state: &PersistedState) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("database is read-only"))
        }
    }

    /// Siren with no working output
    struct DeadSiren;

    impl Siren for DeadSiren {
        fn start(&self, _episode: uuid::Uuid) -> Result<()> {
            Err(anyhow::anyhow!("no audio device"))
        }

        fn stop(&self, _episode: uuid::Uuid) -> Result<()> {
            Err(anyhow::anyhow!("no audio device"))
        }

        fn is_sounding(&self) -> bool {
            false
        }
    }

    async fn eventually(cond: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    fn ir() -> Command {
        Command::Trigger {
            sensor_type: SensorType::Ir,
            origin: TriggerOrigin::Hardware,
        }
    }

    #[tokio::test]
    async fn test_arm_is_persisted_and_published() {
        let rig = rig();
        let ack = rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await;
        assert_eq!(ack, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::ArmedIdle);

        let store = rig.store.clone();
        assert!(
            eventually(|| store.load().ok().flatten().map(|s| s.armed).unwrap_or(false)).await
        );
    }

    #[tokio::test]
    async fn test_alarm_episode_end_to_end() {
        let rig = rig();
        let mut events = rig.bus.subscribe();

        rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await.unwrap();
        rig.clock.set(at(22, 30, 0));
        for _ in 0..3 {
            rig.handle.submit(ir()).unwrap();
        }
        rig.handle.request(Command::ManualTrigger { sensor: None }).await.unwrap();

        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot.mode, EngineMode::ArmedAlarm);
        assert_eq!(snapshot.triggered, vec!["IR_Hallway", "IR_LivingRoom"]);
        assert!(rig.siren.is_sounding());

        let ack = rig.handle.request(Command::StopAlarm).await;
        assert_eq!(ack, Ok(Ack::Applied));
        assert!(!rig.siren.is_sounding());
        assert_eq!(rig.handle.snapshot().suppressed_until, Some(at(22, 30, 5)));

        let ack = rig.handle.request(ir()).await;
        assert_eq!(ack, Ok(Ack::Ignored(crate::core::IgnoreReason::Suppressed)));

        let log = AlertLog::new(rig.log_path.clone());
        assert!(eventually(|| log.tail(10).map(|l| l.len() == 1).unwrap_or(false)).await);

        let mut started = 0;
        let mut stopped = 0;
        while let Ok(event) = events.try_recv() {
            match event.payload {
                EngineEvent::AlarmStarted { .. } => started += 1,
                EngineEvent::AlarmStopped { .. } => stopped += 1,
                _ => {}
            }
        }
        assert_eq!((started, stopped), (1, 1));

        if let Some(dir) = rig.log_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_concurrent_triggers_start_one_episode() {
        let rig = rig();
        let mut events = rig.bus.subscribe();
        rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let handle = rig.handle.clone();
            tasks.push(tokio::spawn(async move {
                let sensor_type = if i % 2 == 0 { SensorType::Ir } else { SensorType::Sound };
                handle
                    .request(Command::Trigger { sensor_type, origin: TriggerOrigin::Simulator })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let started = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e.payload, EngineEvent::AlarmStarted { .. }))
            .count();
        assert_eq!(started, 1);
        assert_eq!(rig.handle.snapshot().triggered.len(), 4);
    }

    #[tokio::test]
    async fn test_rejections_reach_the_caller() {
        let rig = rig();
        let ack = rig
            .handle
            .request(Command::SetSchedule { start: "7pm".into(), stop: "07:00".into() })
            .await;
        assert_eq!(ack, Err(ControlError::InvalidFormat("7pm".into())));

        let ack = rig.handle.add_sensor(SensorType::Sound, None).await;
        assert_eq!(ack, Ok(Ack::SensorAdded("Sound_1".into())));
        let added = rig.handle.snapshot().sensors.into_iter().find(|s| s.name == "Sound_1").unwrap();
        assert!((50..=350).contains(&added.position.x));
        assert!((50..=200).contains(&added.position.y));
    }

    #[tokio::test]
    async fn test_schedule_monitor_drives_arming() {
        let rig = rig();
        let monitor = ScheduleMonitor::new(
            rig.handle.clone(),
            rig.clock.clone(),
            rig.bus.clone(),
            Duration::from_secs(5),
        );

        rig.clock.set(at(23, 0, 0));
        let next = monitor.tick();
        assert_eq!(next.at, at(7, 0, 0) + chrono::Duration::days(1));
        let handle = rig.handle.clone();
        assert!(eventually(|| handle.snapshot().armed).await);

        // Manual disarm inside the window is undone on the next tick, so
        // the next event stays the morning disarm
        rig.handle.request(Command::Disarm { origin: CommandOrigin::Manual }).await.unwrap();
        assert_eq!(monitor.tick().action, crate::core::ScheduleAction::Deactivate);
        assert!(eventually(|| handle.snapshot().armed).await);

        rig.clock.set(at(7, 0, 0) + chrono::Duration::days(1));
        monitor.tick();
        assert!(eventually(|| !handle.snapshot().armed).await);
    }

    #[tokio::test]
    async fn test_arming_starts_simulator_producer() {
        let producers = ProducerSupervisor::new(ProducerSettings::default());
        producers.add_feed(Box::new(SensorSimulator::new(SimulatorSettings {
            tick: Duration::from_millis(5),
            intrusion_probability: 1.0,
            cooldown: Duration::from_millis(20),
            seed: Some(1),
        })));
        let rig = rig_with(producers);
        rig.clock.set(at(23, 0, 0));

        rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await.unwrap();
        let handle = rig.handle.clone();
        assert!(eventually(|| handle.snapshot().sounding).await);

        rig.handle.request(Command::Disarm { origin: CommandOrigin::Manual }).await.unwrap();
        assert_eq!(rig.handle.snapshot().mode, EngineMode::Disarmed);
        assert!(!rig.siren.is_sounding());

        let _ = rig.shutdown.send(());
        rig.task.await.unwrap().unwrap();
        if let Some(dir) = rig.log_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_shutdown_saves_and_closes_intake() {
        let rig = rig();
        rig.handle.add_sensor(SensorType::Ir, Some(Position::new(60, 60))).await.unwrap();

        let _ = rig.shutdown.send(());
        rig.task.await.unwrap().unwrap();

        let saved = rig.store.load().unwrap().unwrap();
        assert_eq!(saved.sensors.len(), 5);
        assert_eq!(rig.handle.submit(Command::StopAlarm), Err(ControlError::EngineStopped));
        assert_eq!(
            rig.handle.request(Command::StopAlarm).await,
            Err(ControlError::EngineStopped)
        );
    }

    #[tokio::test]
    async fn test_failed_saves_do_not_stall_the_engine() {
        let store = Arc::new(ReadOnlyStore::default());
        let rig = rig_from(
            ProducerSupervisor::new(ProducerSettings::default()),
            store.clone(),
            Arc::new(LogSiren::new()),
        );

        let ack = rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await;
        assert_eq!(ack, Ok(Ack::Applied));
        rig.clock.set(at(22, 0, 0));
        assert_eq!(rig.handle.request(ir()).await, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::ArmedAlarm);
        assert!(rig.siren.is_sounding());

        assert_eq!(rig.handle.request(Command::StopAlarm).await, Ok(Ack::Applied));
        let snapshot = rig.handle.snapshot();
        assert_eq!(snapshot.mode, EngineMode::ArmedIdle);
        assert!(snapshot.triggered.is_empty());

        assert!(eventually(|| store.attempts.load(Ordering::SeqCst) > 0).await);
        let ack = rig.handle.request(Command::Disarm { origin: CommandOrigin::Manual }).await;
        assert_eq!(ack, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::Disarmed);

        let _ = rig.shutdown.send(());
        rig.task.await.unwrap().unwrap();
        if let Some(dir) = rig.log_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_dead_siren_still_logs_and_stops() {
        let rig = rig_from(
            ProducerSupervisor::new(ProducerSettings::default()),
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(DeadSiren),
        );

        rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await.unwrap();
        rig.clock.set(at(22, 0, 0));
        assert_eq!(rig.handle.request(ir()).await, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::ArmedAlarm);

        let log = AlertLog::new(rig.log_path.clone());
        assert!(eventually(|| log.tail(10).map(|l| l.len() == 1).unwrap_or(false)).await);

        assert_eq!(rig.handle.request(Command::StopAlarm).await, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::ArmedIdle);

        let _ = rig.shutdown.send(());
        rig.task.await.unwrap().unwrap();
        if let Some(dir) = rig.log_path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn test_suppression_ignores_wall_clock_steps() {
        let rig = rig();
        rig.handle.request(Command::Arm { origin: CommandOrigin::Manual }).await.unwrap();

        rig.clock.set(at(2, 59, 50) + chrono::Duration::days(1));
        rig.handle.request(ir()).await.unwrap();
        rig.clock.advance(chrono::Duration::seconds(8));
        rig.handle.request(Command::StopAlarm).await.unwrap();

        // fall-back: wall clock returns to 02:00 while real time moves on
        rig.clock.step_wall(at(2, 0, 0) + chrono::Duration::days(1));
        rig.clock.advance(chrono::Duration::seconds(2));
        let ack = rig.handle.request(ir()).await;
        assert_eq!(ack, Ok(Ack::Ignored(crate::core::IgnoreReason::Suppressed)));

        rig.clock.advance(chrono::Duration::seconds(28));
        assert_eq!(rig.handle.request(ir()).await, Ok(Ack::Applied));
        assert_eq!(rig.handle.snapshot().mode, EngineMode::ArmedAlarm);
    }
}

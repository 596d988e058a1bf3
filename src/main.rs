// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! HearthGuard - Home Intrusion Alarm Controller
//!
//! Features:
//! - Schedule-driven arming with manual override
//! - Serial sensor board link with simulator fallback
//! - One alarm episode per intrusion, with post-stop suppression
//! - Email/SMS webhooks, alert log, siren and MQTT status

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hearthguard::core::{
    AlarmEngine, Clock, Collaborators, Command, CommandOrigin, Controller, EventBus, ScheduleMonitor,
    SystemClock,
};
use hearthguard::db::{load_or_default, Database};
use hearthguard::notify::{AlertLog, CommandSiren, LogSiren, NotificationHub, Siren};
use hearthguard::sensors::{connect_link, ProducerSupervisor, SensorSimulator};
use hearthguard::streaming::MqttBridge;
use hearthguard::{console, Config, VERSION};

/// HearthGuard - Home Intrusion Alarm Controller
#[derive(Parser, Debug)]
#[command(name = "hearthguard")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Schedule-driven home intrusion alarm controller")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (state database, alert log)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Run the sensor simulator even when hardware is present
    #[arg(long)]
    simulate: bool,

    /// Do not look for the sensor board
    #[arg(long)]
    no_link: bool,

    /// Run without the stdin console
    #[arg(long)]
    no_console: bool,

    /// MQTT broker address (enables the MQTT bridge)
    #[arg(long)]
    mqtt_broker: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.trace {
        EnvFilter::new(Level::TRACE.to_string())
    } else if args.debug {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("HearthGuard v{} - Home Intrusion Alarm Controller", VERSION);

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if let Some(data_dir) = args.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if args.simulate {
        config.simulator.enabled = true;
    }
    if args.no_link {
        config.link.enabled = false;
    }
    if let Some(mqtt) = args.mqtt_broker.clone() {
        config.mqtt.enabled = true;
        config.mqtt.broker = mqtt;
    }

    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(config, !args.no_console));
    // stdin reads live on blocking threads that never finish by themselves
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

fn open_store(config: &Config) -> Result<Arc<Database>> {
    let path = config.state_db_path();
    match Database::open(&path) {
        Ok(db) => Ok(Arc::new(db)),
        Err(e) => {
            warn!("Cannot open state database {:?} ({}); state will not survive a restart", path, e);
            Ok(Arc::new(Database::open_in_memory()?))
        }
    }
}

async fn build_producers(config: &Config) -> ProducerSupervisor {
    let producers = ProducerSupervisor::new(config.producer_settings());

    let mut have_link = false;
    if config.link.enabled {
        let settings = config.link_settings();
        match tokio::task::spawn_blocking(move || connect_link(&settings)).await {
            Ok(Ok(feed)) => {
                producers.add_feed(feed);
                have_link = true;
            }
            Ok(Err(e)) => warn!("Sensor board unavailable: {}", e),
            Err(e) => warn!("Sensor board discovery failed: {}", e),
        }
    }

    if config.simulator.enabled || !have_link {
        info!("Running with simulated sensors");
        producers.add_feed(Box::new(SensorSimulator::new(config.simulator_settings())));
    }

    info!("{} trigger feed(s) ready", producers.feed_count());
    producers
}

fn build_siren(config: &Config) -> Arc<dyn Siren> {
    match config.siren.command.clone() {
        Some(argv) => match CommandSiren::new(argv) {
            Ok(siren) => Arc::new(siren),
            Err(e) => {
                warn!("Siren command rejected ({}), logging only", e);
                Arc::new(LogSiren::new())
            }
        },
        None => Arc::new(LogSiren::new()),
    }
}

async fn run(config: Config, with_console: bool) -> Result<()> {
    let store = open_store(&config)?;
    let persisted = load_or_default(store.as_ref(), config.default_schedule());
    let restore_armed = persisted.armed;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let event_bus = Arc::new(EventBus::default());
    let alert_log = AlertLog::new(config.alert_log_path());

    let engine = AlarmEngine::from_persisted(persisted, config.engine_settings());
    let (controller, handle) = Controller::new(
        engine,
        clock.clone(),
        Collaborators {
            store,
            notifications: NotificationHub::from_config(&config.notify),
            siren: build_siren(&config),
            alert_log: alert_log.clone(),
            producers: Arc::new(build_producers(&config).await),
            event_bus: event_bus.clone(),
        },
    );

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(4);
    let controller_task = tokio::spawn(controller.run(shutdown_tx.subscribe()));

    if restore_armed {
        info!("Restoring armed state from last run");
        handle.submit(Command::Arm { origin: CommandOrigin::Restore })?;
    }

    if config.schedule.enabled {
        let monitor = ScheduleMonitor::new(
            handle.clone(),
            clock,
            event_bus.clone(),
            Duration::from_secs(config.schedule.poll_interval_secs.max(1)),
        );
        tokio::spawn(monitor.run(shutdown_tx.subscribe()));
    }

    if config.mqtt.enabled {
        let bridge = MqttBridge::new(&config.mqtt);
        let events = event_bus.subscribe();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = bridge.run(events, shutdown).await {
                warn!("MQTT bridge stopped: {}", e);
            }
        });
    }

    if with_console {
        let console_handle = handle.clone();
        let console_shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = console::run(console_handle, alert_log, console_shutdown).await {
                warn!("Console stopped: {}", e);
            }
        });
    }

    info!("HearthGuard running");
    info!("   Press Ctrl+C to shutdown");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, cleaning up...");
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown requested, cleaning up...");
        }
    }

    let _ = shutdown_tx.send(());
    controller_task.await??;

    info!("HearthGuard shutdown complete");
    Ok(())
}

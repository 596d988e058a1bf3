// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Database module for persistent storage
//!
//! Only the armed flag, the schedule and the sensor registry survive a
//! restart. Alarm state is always rebuilt from safe defaults.

use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{parse_time, Schedule};
use crate::sensors::{Position, Sensor, SensorRegistry, SensorStatus, SensorType};

const KEY_ARMED: &str = "armed";
const KEY_SCHEDULE_START: &str = "schedule_start";
const KEY_SCHEDULE_STOP: &str = "schedule_stop";

/// Everything written back after a state-affecting command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub armed: bool,
    pub schedule: Schedule,
    pub sensors: Vec<Sensor>,
}

impl PersistedState {
    /// First-run state: disarmed, given schedule, default sensor map
    pub fn defaults(schedule: Schedule) -> Self {
        Self {
            armed: false,
            schedule,
            sensors: SensorRegistry::with_defaults().sensors().to_vec(),
        }
    }
}

/// Load/save contract for persisted state
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing was saved yet
    fn load(&self) -> Result<Option<PersistedState>>;

    fn save(&self, state: &PersistedState) -> Result<()>;
}

/// Load saved state, falling back to defaults when there is none or it
/// cannot be read.
pub fn load_or_default(store: &dyn StateStore, default_schedule: Schedule) -> PersistedState {
    match store.load() {
        Ok(Some(state)) => {
            info!(
                "Loaded saved state: {} sensors, schedule {}, armed={}",
                state.sensors.len(),
                state.schedule,
                state.armed
            );
            state
        }
        Ok(None) => {
            info!("No saved state found, starting with defaults");
            PersistedState::defaults(default_schedule)
        }
        Err(e) => {
            warn!("Saved state unreadable ({}), starting with defaults", e);
            PersistedState::defaults(default_schedule)
        }
    }
}

/// SQLite-backed state store
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", path);
        Ok(db)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Sensors table; ord keeps registry order
            CREATE TABLE IF NOT EXISTS sensors (
                name TEXT PRIMARY KEY,
                ord INTEGER NOT NULL,
                sensor_type TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'Normal'
            );

            -- Settings table
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;

        Ok(())
    }

    fn write_setting(conn: &Connection, key: &str, value: &str, now: &str) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
        let result: rusqlite::Result<String> = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_sensors(conn: &Connection) -> Result<Vec<Sensor>> {
        let mut stmt =
            conn.prepare("SELECT name, sensor_type, x, y, status FROM sensors ORDER BY ord")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut sensors = Vec::new();
        for row in rows {
            let (name, sensor_type, x, y, status) = row?;
            let sensor_type: SensorType = sensor_type
                .parse()
                .map_err(|e: String| anyhow!("sensor '{}': {}", name, e))?;
            let status = match status.as_str() {
                "Triggered" => SensorStatus::Triggered,
                _ => SensorStatus::Normal,
            };
            sensors.push(Sensor {
                name,
                sensor_type,
                position: Position::new(x, y),
                status,
            });
        }
        Ok(sensors)
    }
}

impl StateStore for Database {
    fn load(&self) -> Result<Option<PersistedState>> {
        let conn = self.conn.lock();

        let armed = match Self::read_setting(&conn, KEY_ARMED)? {
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| anyhow!("invalid armed flag '{}'", value))?,
            None => return Ok(None),
        };

        let start = Self::read_setting(&conn, KEY_SCHEDULE_START)?
            .ok_or_else(|| anyhow!("missing schedule start"))?;
        let stop = Self::read_setting(&conn, KEY_SCHEDULE_STOP)?
            .ok_or_else(|| anyhow!("missing schedule stop"))?;
        let schedule = Schedule::new(parse_time(&start)?, parse_time(&stop)?);

        let sensors = Self::read_sensors(&conn)?;
        debug!("Read {} sensors from database", sensors.len());

        Ok(Some(PersistedState {
            armed,
            schedule,
            sensors,
        }))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for (key, value) in [
            (KEY_ARMED, state.armed.to_string()),
            (KEY_SCHEDULE_START, state.schedule.start_label()),
            (KEY_SCHEDULE_STOP, state.schedule.stop_label()),
        ] {
            Self::write_setting(&tx, key, &value, &now)?;
        }

        tx.execute("DELETE FROM sensors", [])?;
        for (ord, sensor) in state.sensors.iter().enumerate() {
            tx.execute(
                "INSERT INTO sensors (name, ord, sensor_type, x, y, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    sensor.name,
                    ord as i64,
                    sensor.sensor_type.prefix(),
                    sensor.position.x,
                    sensor.position.y,
                    sensor.status.to_string()
                ],
            )?;
        }

        tx.commit()?;
        debug!("Saved state ({} sensors)", state.sensors.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_database_has_no_state() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load().unwrap().is_none());

        let state = load_or_default(&db, Schedule::default());
        assert!(!state.armed);
        assert_eq!(state.sensors.len(), 4);
        assert_eq!(state.sensors[0].name, "IR_LivingRoom");
    }

    #[test]
    fn test_save_and_load_keeps_order() {
        let db = Database::open_in_memory().unwrap();
        let mut state = PersistedState::defaults(Schedule::parse("21:30", "06:15").unwrap());
        state.armed = true;
        state.sensors.reverse();
        state.sensors[1].status = SensorStatus::Triggered;

        db.save(&state).unwrap();
        assert_eq!(db.load().unwrap(), Some(state.clone()));

        state.sensors.pop();
        db.save(&state).unwrap();
        assert_eq!(db.load().unwrap().unwrap().sensors.len(), 3);
    }

    #[test]
    fn test_corrupt_state_falls_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.save(&PersistedState::defaults(Schedule::default())).unwrap();
        Database::write_setting(&db.conn.lock(), KEY_SCHEDULE_START, "late evening", "").unwrap();

        assert!(db.load().is_err());
        let state = load_or_default(&db, Schedule::parse("20:00", "05:00").unwrap());
        assert_eq!(state.schedule.start_label(), "20:00");
        assert_eq!(state.sensors.len(), 4);
    }

    #[test]
    fn test_settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.lock();
        assert_eq!(Database::read_setting(&conn, "missing").unwrap(), None);
        Database::write_setting(&conn, "k", "v", "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(Database::read_setting(&conn, "k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_open_creates_file() {
        let dir = std::env::temp_dir().join(format!("hearthguard-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.save(&PersistedState::defaults(Schedule::default())).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.load().unwrap().is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}

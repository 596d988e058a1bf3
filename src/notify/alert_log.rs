// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Append-only alert log

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One alarm-start entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: NaiveDateTime,
    pub sensor: String,
    pub trigger: String,
    pub message: String,
}

impl AlertRecord {
    pub fn new(timestamp: NaiveDateTime, sensor: &str, trigger: &str) -> Self {
        Self {
            timestamp,
            sensor: sensor.to_string(),
            trigger: trigger.to_string(),
            message: format!("Intrusion detected by {} ({})!", sensor, trigger),
        }
    }

    /// `[YYYY-MM-DD HH:MM:SS] - <sensor> | <trigger> | <message>`
    pub fn log_line(&self) -> String {
        format!(
            "[{}] - {} | {} | {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.sensor,
            self.trigger,
            self.message
        )
    }
}

/// Text file that alert lines are appended to
#[derive(Debug, Clone)]
pub struct AlertLog {
    path: PathBuf,
}

impl AlertLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AlertRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.log_line())?;
        debug!("Appended alert to {:?}", self.path);
        Ok(())
    }

    /// Last `count` lines of the log; empty when it does not exist yet
    pub fn tail(&self, count: usize) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = content.lines().collect();
        let skip = lines.len().saturating_sub(count);
        Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(23, 4, 9)
            .unwrap()
    }

    #[test]
    fn test_log_line_format() {
        let record = AlertRecord::new(stamp(), "IR_LivingRoom", "IR");
        assert_eq!(
            record.log_line(),
            "[2026-01-05 23:04:09] - IR_LivingRoom | IR | Intrusion detected by IR_LivingRoom (IR)!"
        );
    }

    #[test]
    fn test_append_and_tail() {
        let dir = std::env::temp_dir().join(format!("hearthguard-log-{}", uuid::Uuid::new_v4()));
        let log = AlertLog::new(dir.join("alerts.log"));
        assert!(log.tail(5).unwrap().is_empty());

        for sensor in ["A", "B", "C"] {
            log.append(&AlertRecord::new(stamp(), sensor, "Sound")).unwrap();
        }

        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("- B |"));
        assert!(tail[1].contains("- C |"));

        let _ = std::fs::remove_dir_all(dir);
    }
}

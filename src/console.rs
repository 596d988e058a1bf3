// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Operator console on stdin
//!
//! A line-oriented stand-in for the floor plan UI: every manual action
//! the UI offers maps to one command here.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::{Ack, Command, CommandOrigin, ControllerHandle, StatusSnapshot};
use crate::notify::AlertLog;
use crate::sensors::{Position, SensorType};

const DEFAULT_LOG_LINES: usize = 20;

const HELP: &str = "\
Commands:
  arm | disarm              switch the system on or off
  stop                      silence a sounding alarm
  trigger [name]            raise a manual trigger
  add <ir|sound> [x y]      add a sensor (random spot without x y)
  rename <old> <new>        rename a sensor
  remove <name>             delete a sensor
  move <name> <x> <y>       move a sensor
  schedule <HH:MM> <HH:MM>  set the arming window
  status                    show system state
  log [n]                   show the last n alert lines
  help                      this text
  quit                      shut down";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Engine(Command),
    Add { sensor_type: SensorType, position: Option<Position> },
    Status,
    Log(usize),
    Help,
    Quit,
}

fn coordinate(value: &str) -> Result<i32, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' is not a coordinate", value))
}

/// Parse one input line. Empty lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (verb.to_ascii_lowercase().as_str(), args) {
        ("arm", []) => ConsoleCommand::Engine(Command::Arm { origin: CommandOrigin::Manual }),
        ("disarm", []) => ConsoleCommand::Engine(Command::Disarm { origin: CommandOrigin::Manual }),
        ("stop", []) => ConsoleCommand::Engine(Command::StopAlarm),
        ("trigger", []) => ConsoleCommand::Engine(Command::ManualTrigger { sensor: None }),
        ("trigger", [name]) => ConsoleCommand::Engine(Command::ManualTrigger {
            sensor: Some(name.to_string()),
        }),
        ("add", [kind]) => ConsoleCommand::Add {
            sensor_type: kind.parse()?,
            position: None,
        },
        ("add", [kind, x, y]) => ConsoleCommand::Add {
            sensor_type: kind.parse()?,
            position: Some(Position::new(coordinate(x)?, coordinate(y)?)),
        },
        ("rename", [old, new]) => ConsoleCommand::Engine(Command::RenameSensor {
            old: old.to_string(),
            new: new.to_string(),
        }),
        ("remove", [name]) => ConsoleCommand::Engine(Command::RemoveSensor {
            name: name.to_string(),
        }),
        ("move", [name, x, y]) => ConsoleCommand::Engine(Command::MoveSensor {
            name: name.to_string(),
            position: Position::new(coordinate(x)?, coordinate(y)?),
        }),
        ("schedule", [start, stop]) => ConsoleCommand::Engine(Command::SetSchedule {
            start: start.to_string(),
            stop: stop.to_string(),
        }),
        ("status", []) => ConsoleCommand::Status,
        ("log", []) => ConsoleCommand::Log(DEFAULT_LOG_LINES),
        ("log", [n]) => ConsoleCommand::Log(
            n.parse()
                .map_err(|_| format!("'{}' is not a line count", n))?,
        ),
        ("help", _) | ("?", _) => ConsoleCommand::Help,
        ("quit", []) | ("exit", []) => ConsoleCommand::Quit,
        (verb, _) => return Err(format!("unknown or malformed command '{}' (try 'help')", verb)),
    };

    Ok(Some(command))
}

/// Human-readable status block
pub fn render_status(snapshot: &StatusSnapshot) -> String {
    let mut out = format!("{}\nSchedule: {}\n", snapshot.mode, snapshot.schedule);
    if let Some(until) = snapshot.suppressed_until {
        out.push_str(&format!("Triggers suppressed until {}\n", until.format("%H:%M:%S")));
    }
    out.push_str("Sensors:\n");
    for sensor in &snapshot.sensors {
        out.push_str(&format!(
            "  {:<20} {:<6} ({:>3}, {:>3})  {}\n",
            sensor.name, sensor.sensor_type, sensor.position.x, sensor.position.y, sensor.status
        ));
    }
    out
}

fn render_ack(ack: &Ack) -> String {
    match ack {
        Ack::Applied => "ok".to_string(),
        Ack::SensorAdded(name) => format!("added {}", name),
        Ack::Ignored(reason) => format!("ignored: {}", reason),
    }
}

/// Read commands until `quit`, end of input or shutdown. Requests a
/// shutdown on `quit`.
pub async fn run(
    handle: ControllerHandle,
    alert_log: AlertLog,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let mut shutdown = shutdown_tx.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => {
                    debug!("Console input closed");
                    return Ok(());
                }
            },
            _ = shutdown.recv() => return Ok(()),
        };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            ConsoleCommand::Engine(command) => match handle.request(command).await {
                Ok(ack) => println!("{}", render_ack(&ack)),
                Err(e) => println!("error: {}", e),
            },
            ConsoleCommand::Add { sensor_type, position } => {
                match handle.add_sensor(sensor_type, position).await {
                    Ok(ack) => println!("{}", render_ack(&ack)),
                    Err(e) => println!("error: {}", e),
                }
            }
            ConsoleCommand::Status => print!("{}", render_status(&handle.snapshot())),
            ConsoleCommand::Log(count) => {
                let log = alert_log.clone();
                match tokio::task::spawn_blocking(move || log.tail(count)).await? {
                    Ok(lines) if lines.is_empty() => println!("(no alerts logged)"),
                    Ok(lines) => lines.iter().for_each(|l| println!("{}", l)),
                    Err(e) => println!("error reading alert log: {}", e),
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => {
                info!("Quit requested from console");
                let _ = shutdown_tx.send(());
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AlarmEngine, EngineSettings, Schedule};
    use crate::sensors::SensorRegistry;

    #[test]
    fn test_parse_engine_commands() {
        assert_eq!(
            parse_line("arm").unwrap(),
            Some(ConsoleCommand::Engine(Command::Arm { origin: CommandOrigin::Manual }))
        );
        assert_eq!(
            parse_line("  TRIGGER IR_Hallway ").unwrap(),
            Some(ConsoleCommand::Engine(Command::ManualTrigger {
                sensor: Some("IR_Hallway".into())
            }))
        );
        assert_eq!(
            parse_line("move Sound_Kitchen 120 80").unwrap(),
            Some(ConsoleCommand::Engine(Command::MoveSensor {
                name: "Sound_Kitchen".into(),
                position: Position::new(120, 80),
            }))
        );
        assert_eq!(
            parse_line("schedule 21:00 06:30").unwrap(),
            Some(ConsoleCommand::Engine(Command::SetSchedule {
                start: "21:00".into(),
                stop: "06:30".into(),
            }))
        );
    }

    #[test]
    fn test_parse_local_commands() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("log").unwrap(), Some(ConsoleCommand::Log(DEFAULT_LOG_LINES)));
        assert_eq!(parse_line("log 3").unwrap(), Some(ConsoleCommand::Log(3)));
        assert_eq!(
            parse_line("add sound").unwrap(),
            Some(ConsoleCommand::Add { sensor_type: SensorType::Sound, position: None })
        );
        assert_eq!(
            parse_line("add IR 10 20").unwrap(),
            Some(ConsoleCommand::Add {
                sensor_type: SensorType::Ir,
                position: Some(Position::new(10, 20)),
            })
        );
        assert_eq!(parse_line("quit").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_line("add laser").is_err());
        assert!(parse_line("add ir 10").is_err());
        assert!(parse_line("move A x 3").is_err());
        assert!(parse_line("rename OnlyOne").is_err());
        assert!(parse_line("log many").is_err());
        assert!(parse_line("dance").is_err());
    }

    #[test]
    fn test_render_status_lists_sensors() {
        let engine = AlarmEngine::new(SensorRegistry::with_defaults(), Schedule::default(), EngineSettings::default());
        let text = render_status(&engine.snapshot());
        assert!(text.starts_with("SYSTEM INACTIVE"));
        assert!(text.contains("22:00 - 07:00"));
        assert!(text.contains("Sound_BackDoor"));
        assert!(!text.contains("suppressed"));
    }
}

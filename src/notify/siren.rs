// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Siren output

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Audible alarm. Calls must not block.
pub trait Siren: Send + Sync {
    fn start(&self, episode: Uuid) -> Result<()>;

    fn stop(&self, episode: Uuid) -> Result<()>;

    fn is_sounding(&self) -> bool;
}

/// Siren that only logs
#[derive(Debug, Default)]
pub struct LogSiren {
    sounding: AtomicBool,
}

impl LogSiren {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Siren for LogSiren {
    fn start(&self, episode: Uuid) -> Result<()> {
        self.sounding.store(true, Ordering::SeqCst);
        warn!("SIREN ON (episode {})", episode);
        Ok(())
    }

    fn stop(&self, episode: Uuid) -> Result<()> {
        self.sounding.store(false, Ordering::SeqCst);
        info!("Siren off (episode {})", episode);
        Ok(())
    }

    fn is_sounding(&self) -> bool {
        self.sounding.load(Ordering::SeqCst)
    }
}

/// Runs shorter than this count as failed
const MIN_PLAY: Duration = Duration::from_millis(250);
const RETRY_BASE: Duration = Duration::from_millis(100);
const MAX_FAILURES: u32 = 5;

struct Playing {
    episode: Uuid,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Replays an external player command (e.g. `aplay siren.wav`) until
/// stopped. Needs a tokio runtime.
pub struct CommandSiren {
    argv: Vec<String>,
    playing: Mutex<Option<Playing>>,
}

impl CommandSiren {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(anyhow!("siren command must not be empty"));
        }
        Ok(Self {
            argv,
            playing: Mutex::new(None),
        })
    }

    async fn play_loop(argv: Vec<String>, mut stop_rx: oneshot::Receiver<()>) {
        let mut failures = 0u32;
        loop {
            let started = Instant::now();
            let mut child = match tokio::process::Command::new(&argv[0])
                .args(&argv[1..])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    warn!("Could not start siren player {:?}: {}", argv[0], e);
                    return;
                }
            };

            let status = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status,
                    Err(e) => {
                        warn!("Siren player failed: {}", e);
                        return;
                    }
                },
                _ = &mut stop_rx => {
                    if let Err(e) = child.kill().await {
                        debug!("Siren player already gone: {}", e);
                    }
                    return;
                }
            };

            // A player that dies at once would otherwise respawn in a tight loop
            if status.success() && started.elapsed() >= MIN_PLAY {
                failures = 0;
                continue;
            }
            failures += 1;
            if failures >= MAX_FAILURES {
                warn!("Siren player {:?} keeps failing ({}), giving up", argv[0], status);
                return;
            }

            let delay = RETRY_BASE * 2u32.pow(failures - 1);
            debug!("Siren player exited early ({}), retrying in {:?}", status, delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut stop_rx => return,
            }
        }
    }
}

impl Siren for CommandSiren {
    fn start(&self, episode: Uuid) -> Result<()> {
        let mut playing = self.playing.lock();
        if playing.as_ref().map(|p| !p.task.is_finished()).unwrap_or(false) {
            debug!("Siren already playing");
            return Ok(());
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::play_loop(self.argv.clone(), stop_rx));
        *playing = Some(Playing { episode, stop_tx, task });

        warn!("SIREN ON (episode {})", episode);
        Ok(())
    }

    fn stop(&self, episode: Uuid) -> Result<()> {
        if let Some(playing) = self.playing.lock().take() {
            if playing.episode != episode {
                debug!("Stopping siren of episode {} on request for {}", playing.episode, episode);
            }
            let _ = playing.stop_tx.send(());
            info!("Siren off (episode {})", episode);
        }
        Ok(())
    }

    fn is_sounding(&self) -> bool {
        self.playing
            .lock()
            .as_ref()
            .map(|p| !p.task.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_siren_tracks_state() {
        let siren = LogSiren::new();
        let episode = Uuid::new_v4();
        siren.start(episode).unwrap();
        assert!(siren.is_sounding());
        siren.stop(episode).unwrap();
        assert!(!siren.is_sounding());
    }

    #[test]
    fn test_command_siren_requires_argv() {
        assert!(CommandSiren::new(Vec::new()).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_siren_stops_player() {
        let siren = CommandSiren::new(vec!["sleep".into(), "30".into()]).unwrap();
        let episode = Uuid::new_v4();

        siren.start(episode).unwrap();
        assert!(siren.is_sounding());

        siren.stop(episode).unwrap();
        assert!(!siren.is_sounding());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_player_is_paced_then_abandoned() {
        let dir = std::env::temp_dir().join(format!("hearthguard-siren-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let runs = dir.join("runs");
        let script = format!("echo x >> {}; exit 1", runs.display());
        let siren = CommandSiren::new(vec!["sh".into(), "-c".into(), script]).unwrap();
        let episode = Uuid::new_v4();

        siren.start(episode).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let count = std::fs::read_to_string(&runs).unwrap_or_default().lines().count();
        assert!((1..=4).contains(&count), "player ran {} times", count);

        // 100 + 200 + 400 + 800 ms of back-off, then the loop ends
        let mut gave_up = false;
        for _ in 0..40 {
            if !siren.is_sounding() {
                gave_up = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(gave_up);
        let count = std::fs::read_to_string(&runs).unwrap_or_default().lines().count();
        assert_eq!(count, MAX_FAILURES as usize);

        siren.stop(episode).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}

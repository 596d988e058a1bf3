// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Hardware sensor link
//!
//! The sensor board writes one ASCII code per detection over a serial
//! line. Port discovery needs the `serial` feature; without it the link
//! is always reported unavailable and the controller falls back to the
//! simulator.

use anyhow::{anyhow, Result};
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tracing::debug;

use super::{TriggerFeed, TriggerOrigin};

#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Explicit device path; discovered when `None`
    pub port: Option<String>,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub poll_interval: Duration,
    /// Wait after opening while the board resets
    pub settle: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            read_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(30),
            settle: Duration::from_millis(1000),
        }
    }
}

/// Whether a port looks like the sensor board
pub fn looks_like_board(port_name: &str, description: Option<&str>) -> bool {
    port_name.contains("ttyACM") || description.map(|d| d.contains("Arduino")).unwrap_or(false)
}

/// Consecutive end-of-stream reads before the link counts as gone
const MAX_EMPTY_READS: u32 = 3;

/// Feed over any byte stream carrying trigger codes
pub struct ReaderFeed<R: Read + Send> {
    label: String,
    reader: R,
    poll_interval: Duration,
    buf: [u8; 64],
    empty_reads: u32,
}

impl<R: Read + Send> ReaderFeed<R> {
    pub fn new(label: &str, reader: R, poll_interval: Duration) -> Self {
        Self {
            label: label.to_string(),
            reader,
            poll_interval,
            buf: [0; 64],
            empty_reads: 0,
        }
    }
}

impl<R: Read + Send> TriggerFeed for ReaderFeed<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn origin(&self) -> TriggerOrigin {
        TriggerOrigin::Hardware
    }

    fn poll(&mut self) -> Result<Option<String>> {
        match self.reader.read(&mut self.buf) {
            // a hung-up tty reads 0 bytes instead of timing out
            Ok(0) => {
                self.empty_reads += 1;
                if self.empty_reads >= MAX_EMPTY_READS {
                    return Err(anyhow!("{} closed (end of stream)", self.label));
                }
                Ok(None)
            }
            Ok(n) => {
                self.empty_reads = 0;
                let chunk = String::from_utf8_lossy(&self.buf[..n]).into_owned();
                debug!("{} read {:?}", self.label, chunk);
                Ok(Some(chunk))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn pause(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(feature = "serial")]
mod serial {
    use anyhow::{anyhow, Result};
    use serialport::SerialPortType;
    use tracing::{debug, info};

    use super::{looks_like_board, LinkSettings, ReaderFeed};
    use crate::sensors::TriggerFeed;

    fn find_port() -> Result<String> {
        let ports = serialport::available_ports()?;
        for port in &ports {
            let description = match &port.port_type {
                SerialPortType::UsbPort(usb) => usb.product.clone().or_else(|| usb.manufacturer.clone()),
                _ => None,
            };
            debug!("Found serial port {} ({:?})", port.port_name, description);
            if looks_like_board(&port.port_name, description.as_deref()) {
                return Ok(port.port_name.clone());
            }
        }
        Err(anyhow!("no sensor board found among {} serial port(s)", ports.len()))
    }

    pub fn open(settings: &LinkSettings) -> Result<Box<dyn TriggerFeed>> {
        let path = match &settings.port {
            Some(path) => path.clone(),
            None => find_port()?,
        };

        let port = serialport::new(&path, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()?;
        info!("Connected to sensor board on {} at {} baud", path, settings.baud_rate);

        std::thread::sleep(settings.settle);
        Ok(Box::new(ReaderFeed::new(&path, port, settings.poll_interval)))
    }
}

/// Open the hardware link
#[cfg(feature = "serial")]
pub fn connect(settings: &LinkSettings) -> Result<Box<dyn TriggerFeed>> {
    serial::open(settings)
}

/// Open the hardware link
#[cfg(not(feature = "serial"))]
pub fn connect(_settings: &LinkSettings) -> Result<Box<dyn TriggerFeed>> {
    Err(anyhow!("built without serial support (enable the `serial` feature)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_board_detection() {
        assert!(looks_like_board("/dev/ttyACM0", None));
        assert!(looks_like_board("COM3", Some("Arduino Uno")));
        assert!(!looks_like_board("/dev/ttyS0", Some("16550A UART")));
        assert!(!looks_like_board("/dev/ttyUSB0", None));
    }

    #[test]
    fn test_reader_feed_passes_chunks() {
        let mut feed = ReaderFeed::new("test", Cursor::new(b"I\r\nS\r\n".to_vec()), Duration::from_millis(30));
        assert_eq!(feed.poll().unwrap().as_deref(), Some("I\r\nS\r\n"));
        assert_eq!(feed.poll().unwrap(), None);
        assert_eq!(feed.origin(), TriggerOrigin::Hardware);
    }

    #[test]
    fn test_repeated_end_of_stream_is_an_error() {
        let mut feed = ReaderFeed::new("gone", Cursor::new(Vec::new()), Duration::ZERO);
        for _ in 1..MAX_EMPTY_READS {
            assert_eq!(feed.poll().unwrap(), None);
        }
        assert!(feed.poll().is_err());
    }

    struct Flaky {
        reads: u32,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            if self.reads % 2 == 0 {
                buf[0] = b'I';
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_data_resets_end_of_stream_count() {
        let mut feed = ReaderFeed::new("flaky", Flaky { reads: 0 }, Duration::ZERO);
        for _ in 0..10 {
            assert!(feed.poll().is_ok());
        }
    }

    struct Failing(ErrorKind);

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(self.0, "boom"))
        }
    }

    #[test]
    fn test_timeouts_are_quiet_other_errors_surface() {
        let mut feed = ReaderFeed::new("t", Failing(ErrorKind::TimedOut), Duration::ZERO);
        assert_eq!(feed.poll().unwrap(), None);

        let mut feed = ReaderFeed::new("t", Failing(ErrorKind::BrokenPipe), Duration::ZERO);
        assert!(feed.poll().is_err());
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn test_link_unavailable_without_feature() {
        assert!(connect(&LinkSettings::default()).is_err());
    }
}

//! Serial ultrasonic rangefinder gate sensor
//!
//! Protocol (free-running ASCII output, MaxBotix style):
//! - Frame: `R` + 1..=5 ASCII digits (range in millimetres) + `\r`
//! - Frames stream continuously; the newest complete frame wins
//! - Garbage between frames is discarded by resynchronizing on `R`

use crate::domain::types::GateId;
use crate::io::sensor::GateSensor;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace};

const FRAME_START: u8 = b'R';
const FRAME_END: u8 = b'\r';
const MAX_DIGITS: usize = 5;

/// Large enough to take a full tty backlog in one read
const READ_BUF_LEN: usize = 4096;
/// Per-read wait when draining the port
const READ_TIMEOUT: Duration = Duration::from_millis(2);
/// Drain stops after this long even if bytes keep trickling in
const MAX_DRAIN: Duration = Duration::from_millis(20);

/// Incremental frame parser. Keeps partial frames between pushes.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(64) }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Discard any bytes before the next start byte
    fn synchronize(&mut self) {
        if self.buffer.first() == Some(&FRAME_START) {
            return;
        }
        match self.buffer.iter().position(|&b| b == FRAME_START) {
            Some(start_idx) => {
                trace!(discarded = start_idx, "rangefinder_sync_discarded_bytes");
                self.buffer.drain(..start_idx);
            }
            None => {
                if !self.buffer.is_empty() {
                    trace!(discarded = self.buffer.len(), "rangefinder_sync_no_start_byte");
                    self.buffer.clear();
                }
            }
        }
    }

    /// Next complete frame's range in millimetres, if any
    pub fn next_frame(&mut self) -> Option<u32> {
        loop {
            self.synchronize();
            if self.buffer.is_empty() {
                return None;
            }

            let body = &self.buffer[1..];
            let end = body.iter().position(|&b| !b.is_ascii_digit());
            let Some(end) = end else {
                // Only digits so far; wait for more unless it is already too long
                if body.len() > MAX_DIGITS {
                    self.buffer.drain(..1);
                    continue;
                }
                return None;
            };

            let frame_ok = body[end] == FRAME_END && (1..=MAX_DIGITS).contains(&end);
            if !frame_ok {
                // Drop this start byte and look for the next one
                self.buffer.drain(..1);
                continue;
            }

            let digits = &body[..end];
            let value = std::str::from_utf8(digits).ok().and_then(|s| s.parse::<u32>().ok());
            self.buffer.drain(..end + 2);
            if let Some(mm) = value {
                return Some(mm);
            }
        }
    }

    /// Buffered bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Gate presence from a serial rangefinder pointed across the lane
pub struct SerialRangefinder {
    gate: GateId,
    device: String,
    port: tokio_serial::SerialStream,
    parser: FrameParser,
    threshold_m: f64,
    max_distance_m: f64,
    stale_timeout: Duration,
    last_distance_m: Option<f64>,
    last_frame_at: Instant,
}

impl SerialRangefinder {
    pub fn open(
        gate: GateId,
        device: &str,
        baud: u32,
        threshold_m: f64,
        max_distance_m: f64,
        stale_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let port = tokio_serial::new(device, baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .with_context(|| format!("Failed to open rangefinder {} on {}", gate, device))?;

        info!(gate = %gate, device = %device, baud = %baud, threshold_m = %threshold_m, "rangefinder_opened");

        Ok(Self::from_stream(gate, device, port, threshold_m, max_distance_m, stale_timeout))
    }

    /// Wrap an already opened port
    pub fn from_stream(
        gate: GateId,
        device: &str,
        port: tokio_serial::SerialStream,
        threshold_m: f64,
        max_distance_m: f64,
        stale_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            device: device.to_string(),
            port,
            parser: FrameParser::new(),
            threshold_m,
            max_distance_m,
            stale_timeout,
            last_distance_m: None,
            last_frame_at: Instant::now(),
        }
    }

    /// Drain the port and return the latest range (metres), clamped to `max_distance_m`.
    ///
    /// Fails when the port errors or no valid frame arrived within the stale timeout.
    pub async fn read_distance_m(&mut self) -> anyhow::Result<f64> {
        let mut temp_buf = [0u8; READ_BUF_LEN];
        let drain_deadline = Instant::now() + MAX_DRAIN;

        // Read until the port goes quiet so frames queued since the last poll are consumed
        loop {
            match tokio::time::timeout(READ_TIMEOUT, self.port.read(&mut temp_buf)).await {
                Ok(Ok(n)) if n > 0 => self.parser.push(&temp_buf[..n]),
                Ok(Ok(_)) => break,
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => break,
                Ok(Err(e)) => {
                    return Err(e).with_context(|| {
                        format!("Rangefinder {} read failed on {}", self.gate, self.device)
                    });
                }
                // Nothing pending right now
                Err(_) => break,
            }
            if Instant::now() >= drain_deadline {
                trace!(gate = %self.gate, "rangefinder_drain_deadline");
                break;
            }
        }

        let mut latest = None;
        while let Some(mm) = self.parser.next_frame() {
            // Zero is the sensor's "no echo" value
            if mm > 0 {
                latest = Some(mm);
            }
        }

        let now = Instant::now();
        if let Some(mm) = latest {
            let distance_m = (mm as f64 / 1000.0).min(self.max_distance_m);
            self.last_distance_m = Some(distance_m);
            self.last_frame_at = now;
            trace!(gate = %self.gate, distance_m = %distance_m, "rangefinder_frame");
        } else if self.parser.pending() > 0 {
            debug!(gate = %self.gate, pending = self.parser.pending(), "rangefinder_partial_frame");
        }

        let silent_for = now.saturating_duration_since(self.last_frame_at);
        if silent_for > self.stale_timeout {
            bail!(
                "Rangefinder {} on {} sent no valid frame for {} ms",
                self.gate,
                self.device,
                silent_for.as_millis()
            );
        }

        // Before the first frame the gate is treated as clear
        Ok(self.last_distance_m.unwrap_or(self.max_distance_m))
    }
}

#[async_trait]
impl GateSensor for SerialRangefinder {
    async fn is_occupied(&mut self) -> anyhow::Result<bool> {
        let distance_m = self.read_distance_m().await?;
        Ok(distance_m < self.threshold_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_frame() {
        let mut parser = FrameParser::new();
        parser.push(b"R0250\r");
        assert_eq!(parser.next_frame(), Some(250));
        assert_eq!(parser.next_frame(), None);
        assert_eq!(parser.pending(), 0);
    }

    #[test]
    fn test_parse_split_frame() {
        let mut parser = FrameParser::new();
        parser.push(b"R01");
        assert_eq!(parser.next_frame(), None);
        assert_eq!(parser.pending(), 3);
        parser.push(b"80\rR09");
        assert_eq!(parser.next_frame(), Some(180));
        assert_eq!(parser.next_frame(), None);
        assert_eq!(parser.pending(), 3);
    }

    #[test]
    fn test_parse_skips_garbage() {
        let mut parser = FrameParser::new();
        parser.push(b"\x00\xffxyR1000\r");
        assert_eq!(parser.next_frame(), Some(1000));
    }

    #[test]
    fn test_parse_drops_malformed_frame() {
        let mut parser = FrameParser::new();
        // Missing terminator before the next frame, then an empty frame
        parser.push(b"R12R\rR0300\r");
        assert_eq!(parser.next_frame(), Some(300));
        assert_eq!(parser.next_frame(), None);
    }

    #[test]
    fn test_parse_rejects_overlong_digits() {
        let mut parser = FrameParser::new();
        parser.push(b"R1234567\rR0042\r");
        assert_eq!(parser.next_frame(), Some(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backlog_is_drained_to_newest_frame() {
        use tokio::io::AsyncWriteExt;

        let (mut remote, local) = tokio_serial::SerialStream::pair().unwrap();
        let mut sensor = SerialRangefinder::from_stream(
            GateId::B,
            "pty",
            local,
            0.25,
            1.0,
            Duration::from_secs(2),
        );

        // Frames queued while nobody was reading, then the current reading
        let mut backlog = b"R0100\r".repeat(500);
        backlog.extend_from_slice(&b"R0900\r".repeat(3));
        remote.write_all(&backlog).await.unwrap();
        remote.flush().await.unwrap();

        assert!(!sensor.is_occupied().await.unwrap());
        assert_eq!(sensor.read_distance_m().await.unwrap(), 0.9);
    }

    #[test]
    fn test_parse_many_frames_in_one_push() {
        let mut parser = FrameParser::new();
        parser.push(b"R0900\rR0500\rR0200\r");
        let frames: Vec<u32> = std::iter::from_fn(|| parser.next_frame()).collect();
        assert_eq!(frames, vec![900, 500, 200]);
    }
}

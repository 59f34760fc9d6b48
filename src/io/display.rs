//! Result display
//!
//! Every notification is rendered as a two-line character frame, then sent to
//! a backend:
//! - `Console` - logs the frame (bench runs, headless installs)
//! - `SerialLcd` - 16x2 HD44780 display behind a serial backpack
//!
//! Serial LCD command bytes: `0xFE` prefix, then `0x01` clear,
//! `0x80` cursor to line 1, `0xC0` cursor to line 2.

use crate::domain::types::SpeedBand;
use anyhow::Context;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

const LCD_COMMAND: u8 = 0xFE;
const LCD_CLEAR: u8 = 0x01;
const LCD_LINE_1: u8 = 0x80;
const LCD_LINE_2: u8 = 0xC0;

/// Display/alert surface fed by the speed trap. Notifications are one-way:
/// implementations handle their own I/O failures.
#[async_trait]
pub trait ResultSink: Send {
    async fn show_waiting(&mut self);
    async fn show_measuring(&mut self);
    async fn show_result(&mut self, speed_kmh: f64, band: SpeedBand);
    async fn show_noise_rejected(&mut self, elapsed: Duration);
    async fn show_stopped(&mut self);
    /// Terminal state after a fatal error
    async fn show_fault(&mut self, reason: &str);
}

/// Two lines of text, each at most `cols` characters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdFrame {
    pub line1: String,
    pub line2: String,
}

fn fit(text: &str, cols: usize) -> String {
    text.chars().take(cols).collect()
}

impl LcdFrame {
    pub fn new(line1: &str, line2: &str, cols: usize) -> Self {
        Self { line1: fit(line1, cols), line2: fit(line2, cols) }
    }

    pub fn waiting(cols: usize) -> Self {
        Self::new("Ready...", "Pass A then B", cols)
    }

    pub fn measuring(cols: usize) -> Self {
        Self::new("Measuring...", "A -> B", cols)
    }

    pub fn result(speed_kmh: f64, band: SpeedBand, cols: usize) -> Self {
        Self::new(&format!("Your speed:{:5.1}", speed_kmh), band.label(), cols)
    }

    pub fn noise(elapsed: Duration, cols: usize) -> Self {
        Self::new("Ignored noise", &format!("dt:{:.4}", elapsed.as_secs_f64()), cols)
    }

    pub fn stopped(cols: usize) -> Self {
        Self::new("Stopped.", "", cols)
    }

    pub fn fault(reason: &str, cols: usize) -> Self {
        Self::new("FAULT", reason, cols)
    }

    /// Byte stream for a serial LCD backpack. Non-ASCII characters become `?`.
    pub fn to_lcd_bytes(&self, cols: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + cols * 2);
        bytes.extend_from_slice(&[LCD_COMMAND, LCD_CLEAR]);
        for (cmd, line) in [(LCD_LINE_1, &self.line1), (LCD_LINE_2, &self.line2)] {
            bytes.extend_from_slice(&[LCD_COMMAND, cmd]);
            bytes.extend(line.chars().map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' }));
        }
        bytes
    }
}

enum Backend {
    Console,
    SerialLcd { device: String, port: tokio_serial::SerialStream },
}

/// Character display sink
pub struct CharDisplay {
    cols: usize,
    backend: Backend,
    last_frame: Option<LcdFrame>,
}

impl CharDisplay {
    pub fn console(cols: usize) -> Self {
        Self { cols, backend: Backend::Console, last_frame: None }
    }

    pub fn serial_lcd(device: &str, baud: u32, cols: usize) -> anyhow::Result<Self> {
        let port = tokio_serial::new(device, baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .with_context(|| format!("Failed to open LCD on {}", device))?;
        info!(device = %device, baud = %baud, cols = %cols, "lcd_opened");
        Ok(Self {
            cols,
            backend: Backend::SerialLcd { device: device.to_string(), port },
            last_frame: None,
        })
    }

    /// Last frame rendered
    pub fn last_frame(&self) -> Option<&LcdFrame> {
        self.last_frame.as_ref()
    }

    async fn render(&mut self, frame: LcdFrame) {
        match &mut self.backend {
            Backend::Console => {
                info!(line1 = %frame.line1, line2 = %frame.line2, "display");
            }
            Backend::SerialLcd { device, port } => {
                let bytes = frame.to_lcd_bytes(self.cols);
                if let Err(e) = port.write_all(&bytes).await {
                    warn!(device = %device, error = %e, "lcd_write_error");
                }
            }
        }
        self.last_frame = Some(frame);
    }
}

#[async_trait]
impl ResultSink for CharDisplay {
    async fn show_waiting(&mut self) {
        self.render(LcdFrame::waiting(self.cols)).await;
    }

    async fn show_measuring(&mut self) {
        self.render(LcdFrame::measuring(self.cols)).await;
    }

    async fn show_result(&mut self, speed_kmh: f64, band: SpeedBand) {
        self.render(LcdFrame::result(speed_kmh, band, self.cols)).await;
    }

    async fn show_noise_rejected(&mut self, elapsed: Duration) {
        self.render(LcdFrame::noise(elapsed, self.cols)).await;
    }

    async fn show_stopped(&mut self) {
        self.render(LcdFrame::stopped(self.cols)).await;
    }

    async fn show_fault(&mut self, reason: &str) {
        self.render(LcdFrame::fault(reason, self.cols)).await;
    }
}

//! Debounced rising-edge detection for one gate
//!
//! A gate is either armed or latched. The first occupied sample while armed
//! produces one edge and latches the gate; it stays latched until the object
//! has been observed to clear it.
//!
//! A presence that starts inside the debounce window is swallowed: the gate
//! then needs a clear sample before it can fire again.

use crate::domain::types::GateId;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct GateMonitor {
    gate: GateId,
    /// Minimum time between accepted edges (zero disables)
    debounce: Duration,
    latched: bool,
    /// Set by a debounced presence, cleared by the next clear sample
    suppressed: bool,
    last_edge_at: Option<Instant>,
}

impl GateMonitor {
    pub fn new(gate: GateId, debounce: Duration) -> Self {
        Self { gate, debounce, latched: false, suppressed: false, last_edge_at: None }
    }

    pub fn gate(&self) -> GateId {
        self.gate
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Feed one presence sample. Returns `true` only for a new trigger.
    pub fn sample(&mut self, in_range: bool, now: Instant) -> bool {
        if !in_range {
            self.suppressed = false;
            return false;
        }
        if self.latched || self.suppressed {
            return false;
        }

        if let Some(last) = self.last_edge_at {
            let since = now.saturating_duration_since(last);
            if since < self.debounce {
                trace!(
                    gate = %self.gate,
                    since_ms = %since.as_millis(),
                    debounce_ms = %self.debounce.as_millis(),
                    "gate_edge_debounced"
                );
                self.suppressed = true;
                return false;
            }
        }

        self.latched = true;
        self.last_edge_at = Some(now);
        debug!(gate = %self.gate, "gate_triggered");
        true
    }

    /// Unlatch the gate once it reads clear. Returns whether the gate is armed.
    pub fn rearm(&mut self, in_range: bool) -> bool {
        if in_range {
            return !self.latched;
        }
        if self.latched {
            debug!(gate = %self.gate, "gate_rearmed");
        }
        self.latched = false;
        self.suppressed = false;
        true
    }
}

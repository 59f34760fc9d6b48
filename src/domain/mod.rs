//! Domain models - core types of the speed gate
//!
//! This module contains the canonical data types used throughout the system:
//! - `GateId`, `SpeedBand`, `SpeedThresholds` - gate identity and speed bands
//! - `Measurement` - a completed pass that passed noise rejection
//! - `NoiseRejected` - a pass too short to be a real transit
//! - `PassRecord` - serializable record of a finished pass for egress

pub mod pass;
pub mod types;

pub use pass::{PassOutcome, PassRecord};
pub use types::{GateId, Measurement, NoiseRejected, SpeedBand, SpeedThresholds};

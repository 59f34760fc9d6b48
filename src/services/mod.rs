//! Services - measurement logic and the polling loop
//!
//! - `gate_monitor` - Debounced edge detection per gate
//! - `pass_timer` - Idle/Armed/Completed timing state
//! - `estimator` - Elapsed time to speed, with a noise floor
//! - `classifier` - Speed band classification
//! - `speed_trap` - Session that polls the gates and drives the above

pub mod classifier;
pub mod estimator;
pub mod gate_monitor;
pub mod pass_timer;
pub mod speed_trap;

pub use classifier::classify;
pub use estimator::SpeedEstimator;
pub use gate_monitor::GateMonitor;
pub use pass_timer::{PassState, PassTimer};
pub use speed_trap::SpeedTrap;

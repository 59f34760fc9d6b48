//! IO modules - external system interfaces
//!
//! - `sensor` - Gate presence interface and scripted sensors
//! - `rangefinder` - Serial rangefinder adapter
//! - `display` - Result display (console or serial LCD)
//! - `alert` - Too-fast alert sinks
//! - `egress` - Pass output to file (JSONL format)
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `mqtt_egress` - MQTT publisher for egress events

pub mod alert;
pub mod display;
pub mod egress;
pub mod egress_channel;
pub mod mqtt_egress;
pub mod rangefinder;
pub mod sensor;

// Re-export commonly used types
pub use alert::{AlertFanout, AlertSink, LogAlert};
pub use display::{CharDisplay, LcdFrame, ResultSink};
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use mqtt_egress::MqttPublisher;
pub use rangefinder::SerialRangefinder;
pub use sensor::{simulated_pair, GateSensor, ScriptedSensor};

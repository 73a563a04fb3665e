//! Shared data structures for the telemetry alerting pipeline
//!
//! - `equipment`: units, health tiers, alert severity, default fleet
//! - `telemetry`: inbound readings, validated samples, feature vectors
//! - `records`: persisted predictions, alerts and maintenance tasks
//! - `events`: notification payloads for live observers

mod equipment;
mod events;
mod records;
mod telemetry;

pub use equipment::*;
pub use events::*;
pub use records::*;
pub use telemetry::*;

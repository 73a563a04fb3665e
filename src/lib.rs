//! PlantWatch: streaming anomaly detection and alerting for industrial equipment
//!
//! ## Architecture
//!
//! - **Pipeline**: validate, persist, score and alert on every reading
//! - **Model**: per-unit adaptive isolation forest over a sliding window
//! - **Health**: single owner of each unit's healthy/warning/critical status
//! - **Notify**: timeout-bounded fan-out of alerts and periodic status updates
//! - **Storage**: sled (durable) or in-memory persistence behind one trait
//! - **Generator**: synthetic plant load for demos and soak runs

pub mod api;
pub mod config;
pub mod emitter;
pub mod generator;
pub mod health;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod policy;
pub mod storage;
pub mod types;

// Re-export plant configuration
pub use config::PlantConfig;

// Re-export commonly used types
pub use types::{
    Alert, EquipmentId, EquipmentStatus, EquipmentUnit, FeatureVector, MaintenanceTask,
    NotificationEvent, Prediction, SensorReading, Severity, TelemetrySample,
};

// Re-export pipeline components
pub use emitter::AlertAndPredictionEmitter;
pub use health::EquipmentHealthRegistry;
pub use model::{AdaptiveAnomalyModel, AnomalyVerdict, ModelRegistry};
pub use notify::{NotificationFanout, Observer};
pub use pipeline::{IngestError, IngestOutcome, IngestionPipeline, ReadingSink};
pub use policy::ClassificationPolicy;

// Re-export storage
pub use storage::{AnomalyIds, InMemoryStore, PersistenceError, PersistenceLayer, SledStore};

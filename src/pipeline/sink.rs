//! Reading sink abstraction.
//!
//! Producers (the HTTP handler, the synthetic load generator) submit readings
//! through this trait and never touch the pipeline's internals.

use async_trait::async_trait;

use super::{IngestError, IngestOutcome};
use crate::types::SensorReading;

#[async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    /// Process one reading to completion (persist, score, alert).
    async fn submit(&self, reading: SensorReading) -> Result<IngestOutcome, IngestError>;
}

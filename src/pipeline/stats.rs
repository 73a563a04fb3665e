use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Ingestion counters shared between the pipeline and `/health`
#[derive(Debug, Default)]
pub struct PipelineStats {
    ingested: AtomicU64,
    rejected: AtomicU64,
    anomalies: AtomicU64,
    persistence_failures: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn record_ingested(&self) {
        self.ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub ingested: u64,
    pub rejected: u64,
    pub anomalies: u64,
    pub persistence_failures: u64,
}

impl std::fmt::Display for PipelineStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} readings, {} anomalies, {} rejected, {} persistence failures",
            self.ingested, self.anomalies, self.rejected, self.persistence_failures
        )
    }
}

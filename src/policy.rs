//! Verdict -> health status / alert severity mapping

use serde::Serialize;

use crate::config::PolicyConfig;
use crate::model::AnomalyVerdict;
use crate::types::{EquipmentStatus, Severity};

/// Result of classifying one verdict. `severity` is `Some` exactly when an
/// alert should be raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: EquipmentStatus,
    pub severity: Option<Severity>,
}

/// Pure, deterministic classification
#[derive(Debug, Clone)]
pub struct ClassificationPolicy {
    critical_confidence: f64,
}

impl ClassificationPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            critical_confidence: config.critical_confidence,
        }
    }

    pub fn classify(&self, verdict: &AnomalyVerdict) -> Classification {
        if !verdict.anomalous {
            return Classification {
                status: EquipmentStatus::Healthy,
                severity: None,
            };
        }

        let severity = if verdict.confidence > self.critical_confidence {
            Severity::Critical
        } else {
            Severity::Warning
        };
        Classification {
            status: severity.into(),
            severity: Some(severity),
        }
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

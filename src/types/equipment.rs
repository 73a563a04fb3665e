//! Equipment units and health tiers

use serde::{Deserialize, Serialize};

/// Equipment identifier (stable across restarts, assigned at seed time)
pub type EquipmentId = u32;

// ============================================================================
// Health Status
// ============================================================================

/// Health tier of an equipment unit
///
/// Owned by the `EquipmentHealthRegistry`; every other component only reads it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

impl EquipmentStatus {
    /// Stable lowercase label used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Healthy => "healthy",
            EquipmentStatus::Warning => "warning",
            EquipmentStatus::Critical => "critical",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, EquipmentStatus::Healthy)
    }
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity. Only anomalous verdicts carry one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Severity> for EquipmentStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => EquipmentStatus::Warning,
            Severity::Critical => EquipmentStatus::Critical,
        }
    }
}

// ============================================================================
// Equipment Unit
// ============================================================================

/// One monitored physical machine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EquipmentUnit {
    pub id: EquipmentId,
    pub name: String,
    /// Equipment category (press, mill, compressor, ...)
    pub category: String,
    #[serde(default)]
    pub location: Option<String>,
    /// ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub install_date: Option<String>,
    /// ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub last_maintenance: Option<String>,
    #[serde(default)]
    pub status: EquipmentStatus,
}

impl EquipmentUnit {
    pub fn new(id: EquipmentId, name: &str, category: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            category: category.to_string(),
            location: None,
            install_date: None,
            last_maintenance: None,
            status: EquipmentStatus::Healthy,
        }
    }

    fn with_site(mut self, location: &str, install_date: &str, last_maintenance: &str) -> Self {
        self.location = Some(location.to_string());
        self.install_date = Some(install_date.to_string());
        self.last_maintenance = Some(last_maintenance.to_string());
        self
    }
}

/// The plant's default fleet, seeded into an empty store at startup.
pub fn default_fleet() -> Vec<EquipmentUnit> {
    vec![
        EquipmentUnit::new(1, "Hydraulic Press #1", "press")
            .with_site("Factory Floor A", "2020-03-15", "2024-11-01"),
        EquipmentUnit::new(2, "CNC Mill #3", "mill")
            .with_site("Workshop B", "2019-07-22", "2024-10-15"),
        EquipmentUnit::new(3, "Compressor Unit A", "compressor")
            .with_site("Utility Room", "2021-01-10", "2024-11-20"),
        EquipmentUnit::new(4, "Conveyor Belt #2", "conveyor")
            .with_site("Assembly Line", "2020-05-18", "2024-11-10"),
        EquipmentUnit::new(5, "Injection Molder #1", "molder")
            .with_site("Production Zone C", "2018-11-30", "2024-10-25"),
        EquipmentUnit::new(6, "Packaging Robot #4", "robot")
            .with_site("Packaging Area", "2022-02-14", "2024-12-01"),
    ]
}

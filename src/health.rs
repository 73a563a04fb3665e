//! Equipment health registry
//!
//! Single owner of each unit's current `EquipmentStatus`. Transitions are
//! last-write-wins with no debounce. The store mirrors the status but is
//! never read back for decisions.
//!
//! Recovery: with `recovery_clean_samples = Some(m)`, a degraded unit returns
//! to healthy after `m` consecutive non-anomalous samples. With `None` only
//! an explicit `transition` (operator resolve) clears it.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::types::{EquipmentId, EquipmentStatus, EquipmentStatusEntry, EquipmentUnit};

#[derive(Debug, Clone)]
struct HealthEntry {
    name: String,
    status: EquipmentStatus,
    clean_streak: u32,
}

/// Fleet-wide status tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

pub struct EquipmentHealthRegistry {
    entries: RwLock<BTreeMap<EquipmentId, HealthEntry>>,
    recovery_clean_samples: Option<u32>,
}

impl EquipmentHealthRegistry {
    /// Build from the stored units, taking their persisted status as current
    pub fn from_units(units: &[EquipmentUnit], recovery_clean_samples: Option<u32>) -> Self {
        let entries = units
            .iter()
            .map(|u| {
                (
                    u.id,
                    HealthEntry {
                        name: u.name.clone(),
                        status: u.status,
                        clean_streak: 0,
                    },
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
            recovery_clean_samples,
        }
    }

    // A poisoned lock still holds a consistent map: every write is a single assignment
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<EquipmentId, HealthEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<EquipmentId, HealthEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrite the status. Returns the previous status, or `None` for an unknown id.
    pub fn transition(&self, id: EquipmentId, status: EquipmentStatus) -> Option<EquipmentStatus> {
        let mut entries = self.write();
        let entry = entries.get_mut(&id)?;
        let previous = entry.status;
        entry.status = status;
        entry.clean_streak = 0;
        Some(previous)
    }

    pub fn current(&self, id: EquipmentId) -> Option<EquipmentStatus> {
        self.read().get(&id).map(|e| e.status)
    }

    pub fn contains(&self, id: EquipmentId) -> bool {
        self.read().contains_key(&id)
    }

    /// Register a unit created after startup. Existing entries are left alone.
    pub fn register(&self, unit: &EquipmentUnit) {
        self.write().entry(unit.id).or_insert_with(|| HealthEntry {
            name: unit.name.clone(),
            status: unit.status,
            clean_streak: 0,
        });
    }

    pub fn name(&self, id: EquipmentId) -> Option<String> {
        self.read().get(&id).map(|e| e.name.clone())
    }

    /// Count a non-anomalous sample toward recovery.
    ///
    /// Returns `Some(Healthy)` when this sample completed the recovery streak
    /// and the status was changed; the caller mirrors it to the store.
    pub fn record_clean(&self, id: EquipmentId) -> Option<EquipmentStatus> {
        let needed = self.recovery_clean_samples?;
        let mut entries = self.write();
        let entry = entries.get_mut(&id)?;
        if entry.status.is_healthy() {
            return None;
        }
        entry.clean_streak += 1;
        if entry.clean_streak >= needed {
            entry.status = EquipmentStatus::Healthy;
            entry.clean_streak = 0;
            return Some(EquipmentStatus::Healthy);
        }
        None
    }

    /// `{id, name, status}` for every unit, ordered by id
    pub fn snapshot(&self) -> Vec<EquipmentStatusEntry> {
        self.read()
            .iter()
            .map(|(id, e)| EquipmentStatusEntry {
                id: *id,
                name: e.name.clone(),
                status: e.status,
            })
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        self.read()
            .values()
            .fold(StatusCounts::default(), |mut acc, e| {
                match e.status {
                    EquipmentStatus::Healthy => acc.healthy += 1,
                    EquipmentStatus::Warning => acc.warning += 1,
                    EquipmentStatus::Critical => acc.critical += 1,
                }
                acc
            })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

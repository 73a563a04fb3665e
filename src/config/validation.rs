//! Config validation: unknown-key detection with Levenshtein suggestions
//! and operating range checks.
//!
//! The raw TOML is first parsed into a `toml::Value`, its key tree compared
//! against the known field names, and a warning with a "did you mean?"
//! suggestion emitted for each stray key. Typed deserialization runs after.
//! Unknown keys never fail a load.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `PlantConfig`.
///
/// Kept by hand in step with plant_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [plant]
        "plant",
        "plant.name",
        "plant.savings_per_prediction",
        "plant.savings_window_days",
        // [server]
        "server",
        "server.addr",
        // [storage]
        "storage",
        "storage.backend",
        "storage.path",
        // [model]
        "model",
        "model.window_size",
        "model.min_training_samples",
        "model.retrain_every",
        "model.n_trees",
        "model.max_samples",
        "model.contamination",
        "model.seed",
        "model.seed_from_history",
        // [policy]
        "policy",
        "policy.critical_confidence",
        "policy.recovery_clean_samples",
        // [alerts]
        "alerts",
        "alerts.temperature_max",
        "alerts.vibration_max",
        "alerts.pressure_max",
        "alerts.efficiency_min",
        "alerts.failure_horizon_min_days",
        "alerts.failure_horizon_max_days",
        // [notifications]
        "notifications",
        "notifications.status_interval_secs",
        "notifications.delivery_timeout_ms",
        "notifications.observer_buffer",
        // [generator]
        "generator",
        "generator.enabled",
        "generator.startup_delay_secs",
        "generator.cycle_interval_secs",
        "generator.unit_spacing_ms",
        "generator.spike_every",
        "generator.spike_units",
        "generator.error_backoff_secs",
        "generator.seed",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every unknown key in a raw TOML document.
///
/// Parse errors yield no warnings here; typed deserialization reports them.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Operating Range Validation
// ============================================================================

/// Range checks on a parsed `PlantConfig`.
///
/// Returns (errors, warnings): errors block startup, warnings are logged.
pub fn validate_operating_ranges(
    config: &super::PlantConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let a = &config.alerts;
    if !(0.0..=100.0).contains(&a.efficiency_min) {
        errors.push(format!(
            "alerts.efficiency_min = {:.1} is outside the efficiency range (0-100 %)",
            a.efficiency_min
        ));
    }
    if a.vibration_max < 0.0 {
        errors.push(format!(
            "alerts.vibration_max = {:.1} cannot be negative",
            a.vibration_max
        ));
    }

    if config.plant.savings_per_prediction < 0.0 {
        errors.push("plant.savings_per_prediction cannot be negative".to_string());
    }
    if config.plant.savings_window_days <= 0 {
        errors.push("plant.savings_window_days must be > 0".to_string());
    }

    let m = &config.model;
    if m.window_size > 10_000 {
        warnings.push(ValidationWarning {
            field: "model.window_size".to_string(),
            message: format!(
                "model.window_size = {} refits a large window on every sample",
                m.window_size
            ),
            suggestion: None,
        });
    }
    if m.n_trees > 1_000 {
        warnings.push(ValidationWarning {
            field: "model.n_trees".to_string(),
            message: format!("model.n_trees = {} is unusually large", m.n_trees),
            suggestion: None,
        });
    }

    let timeout = config.notifications.delivery_timeout_ms;
    if timeout > 30_000 {
        warnings.push(ValidationWarning {
            field: "notifications.delivery_timeout_ms".to_string(),
            message: format!(
                "notifications.delivery_timeout_ms = {timeout} lets one slow observer stall alert fanout"
            ),
            suggestion: None,
        });
    }

    let spikes = &config.generator.spike_units;
    if config.generator.enabled && spikes.is_empty() {
        warnings.push(ValidationWarning {
            field: "generator.spike_units".to_string(),
            message: "generator.spike_units is empty, no anomalies will be injected".to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlantConfig;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("window", "window"), 0);
        assert_eq!(levenshtein("contamnation", "contamination"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [model]
            window_size = 50
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"model".to_string()));
        assert!(keys.contains(&"model.window_size".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[model]
contamnation = 0.05
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "model.contamnation");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("model.contamination")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[plant]
name = "Line 4"

[policy]
critical_confidence = 80.0

[generator]
spike_units = [2]
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[telemetry]\nrate = 1\n");
        assert!(warnings.iter().any(|w| w.field == "telemetry"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_default_config_serializes_only_known_keys() {
        let toml_str = PlantConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&toml_str).is_empty());
    }

    #[test]
    fn test_operating_ranges_defaults_clean() {
        let (errors, warnings) = validate_operating_ranges(&PlantConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_operating_ranges_efficiency_out_of_range() {
        let mut config = PlantConfig::default();
        config.alerts.efficiency_min = 120.0;
        let (errors, _) = validate_operating_ranges(&config);
        assert_eq!(errors.len(), 1);
    }
}

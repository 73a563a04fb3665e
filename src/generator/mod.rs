//! Synthetic load generator
//!
//! Replays a plant's worth of readings against any `ReadingSink`: each cycle
//! perturbs every unit's baseline with uniform noise and, on spike cycles,
//! pushes the designated units well outside their normal band so the
//! anomaly path gets exercised.
//!
//! Timing per cycle:
//!
//! ```text
//! unit 1 --spacing-- unit 2 --spacing-- ... unit N --cycle interval-- next cycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::pipeline::ReadingSink;
use crate::types::{EquipmentId, SensorReading};

// ============================================================================
// Unit Profiles
// ============================================================================

/// Baseline operating point of one unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitProfile {
    pub equipment_id: EquipmentId,
    pub temperature: f64,
    pub vibration: f64,
    /// `None` for units without a pressure sensor
    pub pressure: Option<f64>,
    pub power_consumption: f64,
    pub efficiency: f64,
}

impl UnitProfile {
    const fn new(
        equipment_id: EquipmentId,
        temperature: f64,
        vibration: f64,
        pressure: Option<f64>,
        power_consumption: f64,
        efficiency: f64,
    ) -> Self {
        Self {
            equipment_id,
            temperature,
            vibration,
            pressure,
            power_consumption,
            efficiency,
        }
    }
}

/// Baselines for the seeded fleet
pub fn default_profiles() -> Vec<UnitProfile> {
    vec![
        UnitProfile::new(1, 75.0, 3.5, Some(120.0), 85.0, 92.0),
        UnitProfile::new(2, 68.0, 2.8, Some(95.0), 78.0, 94.0),
        UnitProfile::new(3, 65.0, 2.0, Some(110.0), 88.0, 96.0),
        UnitProfile::new(4, 58.0, 1.5, None, 45.0, 95.0),
        UnitProfile::new(5, 72.0, 3.2, Some(125.0), 92.0, 91.0),
        UnitProfile::new(6, 62.0, 2.3, None, 55.0, 97.0),
    ]
}

// ============================================================================
// Noise
// ============================================================================

struct Noise {
    temperature: Uniform<f64>,
    vibration: Uniform<f64>,
    pressure: Uniform<f64>,
    power: Uniform<f64>,
    efficiency: Uniform<f64>,
}

impl Noise {
    fn new() -> Self {
        Self {
            temperature: Uniform::new_inclusive(-3.0, 3.0),
            vibration: Uniform::new_inclusive(-0.5, 0.5),
            pressure: Uniform::new_inclusive(-5.0, 5.0),
            power: Uniform::new_inclusive(-3.0, 3.0),
            efficiency: Uniform::new_inclusive(-2.0, 2.0),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn perturb<R: Rng>(profile: &UnitProfile, spike: bool, noise: &Noise, rng: &mut R) -> SensorReading {
    let mut temperature = profile.temperature + noise.temperature.sample(rng);
    let mut vibration = profile.vibration + noise.vibration.sample(rng);
    let mut pressure = profile.pressure.map(|p| p + noise.pressure.sample(rng));
    let power = profile.power_consumption + noise.power.sample(rng);
    let mut efficiency = profile.efficiency + noise.efficiency.sample(rng);

    if spike {
        temperature += rng.gen_range(10.0..=20.0);
        vibration += rng.gen_range(3.0..=6.0);
        pressure = pressure.map(|p| p + rng.gen_range(15.0..=25.0));
        efficiency -= rng.gen_range(10.0..=20.0);
    }

    SensorReading::new(
        profile.equipment_id,
        round1(temperature),
        round1(vibration.max(0.0)),
        pressure.map(round1),
        round1(power.max(0.0)),
        round1(efficiency.clamp(0.0, 100.0)),
    )
}

// ============================================================================
// Generator
// ============================================================================

/// Totals reported when the generator stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneratorReport {
    pub cycles: u64,
    pub submitted: u64,
    pub failures: u64,
}

pub struct SyntheticLoadGenerator<S: ReadingSink> {
    sink: Arc<S>,
    profiles: Vec<UnitProfile>,
    config: GeneratorConfig,
    rng: StdRng,
    noise: Noise,
    cycle: u64,
}

impl<S: ReadingSink> SyntheticLoadGenerator<S> {
    pub fn new(sink: Arc<S>, profiles: Vec<UnitProfile>, config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            sink,
            profiles,
            config,
            rng,
            noise: Noise::new(),
            cycle: 0,
        }
    }

    /// Whether `equipment_id` spikes on `cycle`
    pub fn is_spike(&self, equipment_id: EquipmentId, cycle: u64) -> bool {
        self.config.spike_every > 0
            && cycle % self.config.spike_every == 0
            && self.config.spike_units.contains(&equipment_id)
    }

    /// Readings for the current cycle, one per profile, then advance the cycle counter.
    pub fn next_cycle(&mut self) -> Vec<SensorReading> {
        let cycle = self.cycle;
        let spikes: Vec<bool> = self
            .profiles
            .iter()
            .map(|p| self.is_spike(p.equipment_id, cycle))
            .collect();
        let readings = self
            .profiles
            .iter()
            .zip(spikes)
            .map(|(profile, spike)| perturb(profile, spike, &self.noise, &mut self.rng))
            .collect();
        self.cycle += 1;
        readings
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
        if duration.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Run until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> GeneratorReport {
        let startup = Duration::from_secs(self.config.startup_delay_secs);
        let spacing = Duration::from_millis(self.config.unit_spacing_ms);
        let cycle_interval = Duration::from_secs(self.config.cycle_interval_secs);
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        info!(
            "[LoadGenerator] Task starting: {} units, first cycle in {:?}",
            self.profiles.len(),
            startup
        );
        let mut report = GeneratorReport::default();

        if !Self::pause(startup, &cancel).await {
            info!("[LoadGenerator] Cancelled before first cycle");
            return report;
        }

        loop {
            let cycle = self.cycle;
            let readings = self.next_cycle();
            let mut cycle_failures = 0u64;

            for (i, reading) in readings.into_iter().enumerate() {
                if i > 0 && !Self::pause(spacing, &cancel).await {
                    info!("[LoadGenerator] Received shutdown signal after {} cycles", report.cycles);
                    return report;
                }
                let equipment_id = reading.equipment_id;
                match self.sink.submit(reading).await {
                    Ok(outcome) => {
                        report.submitted += 1;
                        if outcome.anomaly_detected {
                            debug!(
                                equipment_id,
                                cycle,
                                confidence = outcome.confidence,
                                "[LoadGenerator] Reading flagged"
                            );
                        }
                    }
                    Err(e) => {
                        cycle_failures += 1;
                        warn!(equipment_id, cycle, error = %e, "[LoadGenerator] Submit failed");
                    }
                }
            }

            report.cycles += 1;
            report.failures += cycle_failures;

            let wait = if cycle_failures > 0 {
                warn!(
                    "[LoadGenerator] Cycle {} had {} failures, backing off {:?}",
                    cycle, cycle_failures, backoff
                );
                cycle_interval + backoff
            } else {
                cycle_interval
            };
            if !Self::pause(wait, &cancel).await {
                info!("[LoadGenerator] Received shutdown signal after {} cycles", report.cycles);
                return report;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{IngestError, IngestOutcome};
    use crate::types::EquipmentStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        readings: Mutex<Vec<SensorReading>>,
        reject_unit: Option<EquipmentId>,
    }

    #[async_trait]
    impl ReadingSink for RecordingSink {
        async fn submit(&self, reading: SensorReading) -> Result<IngestOutcome, IngestError> {
            if Some(reading.equipment_id) == self.reject_unit {
                return Err(IngestError::UnknownEquipment(reading.equipment_id));
            }
            let mut readings = self.readings.lock().unwrap();
            readings.push(reading);
            Ok(IngestOutcome {
                reading_id: readings.len() as u64,
                anomaly_detected: false,
                confidence: 50.0,
                equipment_status: EquipmentStatus::Healthy,
                alert_id: None,
                prediction_id: None,
                model_trained: false,
            })
        }
    }

    fn seeded(config: GeneratorConfig) -> SyntheticLoadGenerator<RecordingSink> {
        SyntheticLoadGenerator::new(
            Arc::new(RecordingSink::default()),
            default_profiles(),
            GeneratorConfig {
                seed: Some(7),
                ..config
            },
        )
    }

    #[test]
    fn test_spike_on_cycle_zero_for_designated_units() {
        let mut generator = seeded(GeneratorConfig::default());
        let first = generator.next_cycle();
        // Unit 1 baseline 75 +-3, spike adds at least 10
        assert!(first[0].temperature.unwrap() >= 82.0);
        assert!(first[0].efficiency.unwrap() <= 84.0);
        // Unit 2 never spikes
        assert!((first[1].temperature.unwrap() - 68.0).abs() <= 3.05);

        let second = generator.next_cycle();
        assert!((second[0].temperature.unwrap() - 75.0).abs() <= 3.05);
        assert!(generator.is_spike(5, 20));
        assert!(!generator.is_spike(5, 21));
        assert!(!generator.is_spike(2, 40));
    }

    #[test]
    fn test_readings_rounded_and_clamped() {
        let mut generator = seeded(GeneratorConfig::default());
        for _ in 0..30 {
            for reading in generator.next_cycle() {
                let eff = reading.efficiency.unwrap();
                assert!((0.0..=100.0).contains(&eff));
                assert!(reading.vibration.unwrap() >= 0.0);
                let t = reading.temperature.unwrap();
                assert!(((t * 10.0).round() - t * 10.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_units_without_pressure_stay_without() {
        let mut generator = seeded(GeneratorConfig::default());
        let readings = generator.next_cycle();
        assert_eq!(readings.len(), 6);
        assert!(readings[3].pressure.is_none());
        assert!(readings[5].pressure.is_none());
        assert!(readings[0].pressure.is_some());
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = seeded(GeneratorConfig::default());
        let mut b = seeded(GeneratorConfig::default());
        assert_eq!(a.next_cycle(), b.next_cycle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_submits_and_survives_failures() {
        let sink = Arc::new(RecordingSink {
            readings: Mutex::new(Vec::new()),
            reject_unit: Some(3),
        });
        let config = GeneratorConfig {
            startup_delay_secs: 0,
            cycle_interval_secs: 1,
            unit_spacing_ms: 10,
            error_backoff_secs: 1,
            seed: Some(1),
            ..GeneratorConfig::default()
        };
        let generator = SyntheticLoadGenerator::new(Arc::clone(&sink), default_profiles(), config);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(generator.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();
        let report = task.await.unwrap();

        assert!(report.cycles >= 2);
        assert_eq!(report.failures, report.cycles);
        assert!(sink.readings.lock().unwrap().iter().all(|r| r.equipment_id != 3));
        assert_eq!(report.submitted, sink.readings.lock().unwrap().len() as u64);
    }
}

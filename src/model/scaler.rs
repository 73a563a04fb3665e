//! Per-feature standardization fitted on a training window.
//!
//! `z = (x - mean) / std` with population statistics. A feature that is
//! constant over the window gets scale 1 so it maps to zero instead of NaN.

use statrs::statistics::Statistics;

use crate::types::{FeatureVector, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit on a non-empty set of vectors. Returns `None` for an empty slice.
    pub fn fit(rows: &[FeatureVector]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }

        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];
        for feature in 0..FEATURE_COUNT {
            let column: Vec<f64> = rows.iter().map(|r| r.get(feature)).collect();
            mean[feature] = column.iter().mean();
            let std = column.iter().population_std_dev();
            if std.is_finite() && std > f64::EPSILON {
                scale[feature] = std;
            }
        }

        Some(Self { mean, scale })
    }

    pub fn transform(&self, row: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in row.as_slice().iter().enumerate() {
            out[i] = (value - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<[f64; FEATURE_COUNT]> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: [f64; FEATURE_COUNT]) -> FeatureVector {
        FeatureVector(values)
    }

    #[test]
    fn test_empty_input_has_no_scaler() {
        assert!(StandardScaler::fit(&[]).is_none());
    }

    #[test]
    fn test_population_statistics() {
        let rows = [
            fv([1.0, 10.0, 0.0, 5.0, 90.0]),
            fv([3.0, 20.0, 0.0, 5.0, 92.0]),
        ];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean()[0], 2.0);
        // Population std of {1, 3} is 1, not sqrt(2)
        assert!((scaler.scale()[0] - 1.0).abs() < 1e-12);
        assert!((scaler.scale()[1] - 5.0).abs() < 1e-12);

        let z = scaler.transform(&rows[1]);
        assert!((z[0] - 1.0).abs() < 1e-12);
        assert!((z[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_feature_gets_unit_scale() {
        let rows = [
            fv([70.0, 3.0, 0.0, 85.0, 92.0]),
            fv([72.0, 3.1, 0.0, 86.0, 91.0]),
            fv([74.0, 2.9, 0.0, 84.0, 93.0]),
        ];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.scale()[2], 1.0);
        let z = scaler.transform(&fv([71.0, 3.0, 0.0, 85.0, 92.0]));
        assert_eq!(z[2], 0.0);
        assert!(z.iter().all(|v| v.is_finite()));
    }
}

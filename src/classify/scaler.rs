use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Per-feature standardisation: `(x - mean) / scale`.
///
/// `scale` is the population standard deviation; constant features get a scale of 1.0
/// so they pass through centred instead of dividing by zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; 3],
    pub scale: [f64; 3],
}

impl StandardScaler {
    pub fn fit(rows: &[[f64; 3]]) -> Result<Self> {
        if rows.is_empty() {
            return Err(anyhow!("cannot fit scaler on an empty dataset"));
        }
        let n = rows.len() as f64;
        let mut mean = [0.0; 3];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = [0.0; 3];
        for row in rows {
            for i in 0..3 {
                let d = row[i] - mean[i];
                scale[i] += d * d;
            }
        }
        for s in &mut scale {
            *s = (*s / n).sqrt();
            if *s == 0.0 || !s.is_finite() {
                *s = 1.0;
            }
        }
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: [f64; 3]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for i in 0..3 {
            out[i] = (x[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_all(&self, rows: &[[f64; 3]]) -> Vec<[f64; 3]> {
        rows.iter().map(|row| self.transform(*row)).collect()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.mean.iter().chain(&self.scale).any(|v| !v.is_finite()) {
            return Err(anyhow!("scaler parameters must be finite"));
        }
        if self.scale.iter().any(|s| *s <= 0.0) {
            return Err(anyhow!("scaler scale must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_centres_and_scales() {
        let rows = [[1.0, 10.0, 5.0], [3.0, 30.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        assert_eq!(scaler.mean, [2.0, 20.0, 5.0]);
        assert_eq!(scaler.scale, [1.0, 10.0, 1.0]);
        assert_eq!(scaler.transform([3.0, 10.0, 5.0]), [1.0, -1.0, 0.0]);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(StandardScaler::fit(&[]).is_err());
    }

    #[test]
    fn validate_rejects_zero_scale() {
        let scaler = StandardScaler {
            mean: [0.0; 3],
            scale: [1.0, 0.0, 1.0],
        };
        assert!(scaler.validate().is_err());
    }
}

//! Trained artifact pair: scaler + model.
//!
//! Both artifacts are JSON documents carrying a format version and the digest of the
//! training rows they were fitted on. Loading rejects a pair whose digests differ, so
//! a scaler from one run can never normalise inputs for a model from another.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::gate::{top_index, ClassificationResult, ConfidenceGate};
use super::model::{MlpClassifier, ProbabilisticClassifier};
use super::scaler::StandardScaler;
use crate::frame::RawFrame;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_MODEL_PATH: &str = "modelo_red_neuronal.json";
pub const DEFAULT_SCALER_PATH: &str = "scaler.json";

#[derive(Debug, Serialize, Deserialize)]
struct ScalerArtifact {
    format_version: u32,
    dataset_digest: String,
    scaler: StandardScaler,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    dataset_digest: String,
    model: MlpClassifier,
}

/// Arg-max label plus the full distribution, before gating.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub probabilities: Vec<f64>,
}

/// Loaded scaler and model. Immutable once constructed.
#[derive(Clone, Debug)]
pub struct ClassifierParameters {
    scaler: StandardScaler,
    model: MlpClassifier,
    dataset_digest: String,
}

impl ClassifierParameters {
    pub fn new(scaler: StandardScaler, model: MlpClassifier, dataset_digest: String) -> Self {
        Self {
            scaler,
            model,
            dataset_digest,
        }
    }

    /// Load both artifacts. A missing file is reported with an instruction to train first.
    pub fn load(scaler_path: &Path, model_path: &Path) -> Result<Self> {
        let missing: Vec<String> = [scaler_path, model_path]
            .iter()
            .filter(|path| !path.exists())
            .map(|path| path.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!(
                "trained model not found ({}); run `train` first to fit the scaler and model",
                missing.join(", ")
            ));
        }

        let scaler: ScalerArtifact = read_artifact(scaler_path)?;
        let model: ModelArtifact = read_artifact(model_path)?;
        for (version, path) in [
            (scaler.format_version, scaler_path),
            (model.format_version, model_path),
        ] {
            if version != ARTIFACT_FORMAT_VERSION {
                return Err(anyhow!(
                    "unsupported artifact format {} in {} (expected {})",
                    version,
                    path.display(),
                    ARTIFACT_FORMAT_VERSION
                ));
            }
        }
        if scaler.dataset_digest != model.dataset_digest {
            return Err(anyhow!(
                "scaler {} and model {} come from different training runs; retrain",
                scaler_path.display(),
                model_path.display()
            ));
        }
        scaler
            .scaler
            .validate()
            .with_context(|| format!("invalid scaler {}", scaler_path.display()))?;
        model
            .model
            .validate()
            .with_context(|| format!("invalid model {}", model_path.display()))?;

        Ok(Self {
            scaler: scaler.scaler,
            model: model.model,
            dataset_digest: model.dataset_digest,
        })
    }

    /// Write both artifacts. Each file is replaced atomically.
    pub fn save(&self, scaler_path: &Path, model_path: &Path) -> Result<()> {
        let scaler = ScalerArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            dataset_digest: self.dataset_digest.clone(),
            scaler: self.scaler.clone(),
        };
        let model = ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            dataset_digest: self.dataset_digest.clone(),
            model: self.model.clone(),
        };
        let scaler_json = serde_json::to_vec_pretty(&scaler)?;
        let model_json = serde_json::to_vec_pretty(&model)?;
        crate::write_atomic(scaler_path, &scaler_json)?;
        crate::write_atomic(model_path, &model_json)?;
        Ok(())
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    pub fn dataset_digest(&self) -> &str {
        &self.dataset_digest
    }

    /// Apply the fitted centre/scale transform.
    pub fn normalize(&self, frame: RawFrame) -> [f64; 3] {
        self.scaler.transform(frame.channels())
    }

    /// Arg-max label and distribution for a normalized vector.
    pub fn classify(&self, features: &[f64; 3]) -> Prediction {
        let probabilities = self.model.predict_proba(features);
        let label = self.model.labels()[top_index(&probabilities)].clone();
        Prediction {
            label,
            probabilities,
        }
    }

    /// Scaler -> model -> gate for one frame.
    pub fn evaluate(&self, frame: RawFrame, gate: &ConfidenceGate) -> Result<ClassificationResult> {
        let prediction = self.classify(&self.normalize(frame));
        gate.decide(self.labels(), &prediction.probabilities)
            .ok_or_else(|| anyhow!("model returned a distribution that does not match its labels"))
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read artifact {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid artifact {}", path.display()))
}

mod gate;
mod model;
mod params;
mod scaler;

pub use gate::{ClassProbability, ClassificationResult, ConfidenceGate, CONFIDENCE_THRESHOLD};
pub use model::{FitReport, MlpClassifier, MlpTrainer, ProbabilisticClassifier};
pub use params::{
    ClassifierParameters, Prediction, ARTIFACT_FORMAT_VERSION, DEFAULT_MODEL_PATH,
    DEFAULT_SCALER_PATH,
};
pub use scaler::StandardScaler;

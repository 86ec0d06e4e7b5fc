//! Training pipeline: dataset -> (scaler, model) artifact pair.
//!
//! 1. Keep only the two fruit classes (background and other labels are dropped).
//! 2. Fit a standard scaler over R, G, B.
//! 3. Stratified train/test split with a fixed seed.
//! 4. Fit the perceptron on the training subset.
//! 5. Report accuracy on both subsets, per-class metrics and the test confusion matrix.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;

use crate::classify::{ClassifierParameters, FitReport, MlpTrainer, StandardScaler};
use crate::dataset::{content_digest, LabeledSample};

/// Classes the live classifier distinguishes.
pub const DEFAULT_TRAINING_CLASSES: [&str; 2] = ["limon", "manzana"];

/// Seed for the stratified split.
pub const SPLIT_SEED: u64 = 42;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

#[derive(Clone, Debug)]
pub struct TrainingOptions {
    pub classes: Vec<String>,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub trainer: MlpTrainer,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            classes: DEFAULT_TRAINING_CLASSES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: SPLIT_SEED,
            trainer: MlpTrainer::default(),
        }
    }
}

/// Precision / recall / F1 for one class on the held-out subset.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Rows are actual classes, columns are predicted classes.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    fn new(labels: &[String], actual: &[usize], predicted: &[usize]) -> Self {
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (a, p) in actual.iter().zip(predicted) {
            counts[*a][*p] += 1;
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        let n = self.labels.len();
        (0..n)
            .map(|c| {
                let tp = self.counts[c][c] as f64;
                let predicted: usize = (0..n).map(|r| self.counts[r][c]).sum();
                let support: usize = self.counts[c].iter().sum();
                let precision = ratio(tp, predicted as f64);
                let recall = ratio(tp, support as f64);
                let f1 = ratio(2.0 * precision * recall, precision + recall);
                ClassMetrics {
                    label: self.labels[c].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(|l| l.len()).max().unwrap_or(0).max(6);
        write!(f, "{:width$}", "", width = width)?;
        for label in &self.labels {
            write!(f, " {:>width$}", label, width = width)?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{:width$}", label, width = width)?;
            for count in row {
                write!(f, " {:>width$}", count, width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Everything a training run produced.
#[derive(Debug)]
pub struct TrainingOutcome {
    pub params: ClassifierParameters,
    pub class_counts: BTreeMap<String, usize>,
    pub excluded: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub fit: FitReport,
}

/// Split indices per class so both subsets keep the class proportions.
///
/// Each class with at least two samples contributes at least one sample to each
/// subset. Returns `(train, test)` index lists.
pub fn stratified_split(
    targets: &[usize],
    classes: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
        return Err(anyhow!("test fraction must be in (0, 1), got {}", test_fraction));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in 0..classes {
        let mut members: Vec<usize> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == class)
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 {
            return Err(anyhow!(
                "class index {} has {} samples; need at least 2 to split",
                class,
                members.len()
            ));
        }
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize)
            .clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok((train, test))
}

pub fn train(samples: &[LabeledSample], options: &TrainingOptions) -> Result<TrainingOutcome> {
    let mut labels = options.classes.clone();
    labels.sort();
    labels.dedup();
    if labels.len() != 2 {
        return Err(anyhow!(
            "training requires exactly two distinct classes, got {:?}",
            options.classes
        ));
    }

    let kept: Vec<LabeledSample> = samples
        .iter()
        .filter(|s| labels.contains(&s.label))
        .cloned()
        .collect();
    let excluded = samples.len() - kept.len();

    let mut class_counts = BTreeMap::new();
    for label in &labels {
        let count = kept.iter().filter(|s| &s.label == label).count();
        if count < 2 {
            return Err(anyhow!(
                "class '{}' has {} samples; collect at least 2 per class before training",
                label,
                count
            ));
        }
        class_counts.insert(label.clone(), count);
    }

    let raw: Vec<[f64; 3]> = kept.iter().map(|s| s.frame().channels()).collect();
    let targets: Vec<usize> = kept
        .iter()
        .map(|s| labels.iter().position(|l| *l == s.label).unwrap_or(0))
        .collect();

    let scaler = StandardScaler::fit(&raw)?;
    let features = scaler.transform_all(&raw);

    let (train_idx, test_idx) = stratified_split(
        &targets,
        labels.len(),
        options.test_fraction,
        options.split_seed,
    )?;
    let pick = |idx: &[usize]| -> (Vec<[f64; 3]>, Vec<usize>) {
        (
            idx.iter().map(|i| features[*i]).collect(),
            idx.iter().map(|i| targets[*i]).collect(),
        )
    };
    let (train_x, train_y) = pick(&train_idx);
    let (test_x, test_y) = pick(&test_idx);

    let (model, fit) = options.trainer.fit(labels.clone(), &train_x, &train_y)?;
    let params = ClassifierParameters::new(scaler, model, content_digest(&kept));

    let predict_all = |xs: &[[f64; 3]]| -> Vec<usize> {
        xs.iter()
            .map(|x| {
                let prediction = params.classify(x);
                labels
                    .iter()
                    .position(|l| *l == prediction.label)
                    .unwrap_or(0)
            })
            .collect()
    };
    let train_pred = predict_all(&train_x);
    let test_pred = predict_all(&test_x);

    Ok(TrainingOutcome {
        train_accuracy: accuracy(&train_y, &train_pred),
        test_accuracy: accuracy(&test_y, &test_pred),
        confusion: ConfusionMatrix::new(&labels, &test_y, &test_pred),
        class_counts,
        excluded,
        train_size: train_idx.len(),
        test_size: test_idx.len(),
        fit,
        params,
    })
}

fn accuracy(actual: &[usize], predicted: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    correct as f64 / actual.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_stratified_and_reproducible() {
        let targets: Vec<usize> = (0..50).map(|i| usize::from(i % 5 == 0)).collect();
        let (train_a, test_a) = stratified_split(&targets, 2, 0.2, 42).unwrap();
        let (train_b, test_b) = stratified_split(&targets, 2, 0.2, 42).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);

        assert_eq!(test_a.len(), 10);
        assert_eq!(train_a.len(), 40);
        let test_ones = test_a.iter().filter(|i| targets[**i] == 1).count();
        assert_eq!(test_ones, 2);

        let mut all: Vec<usize> = train_a.iter().chain(&test_a).copied().collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn different_seed_changes_split() {
        let targets: Vec<usize> = (0..40).map(|i| i % 2).collect();
        let (_, a) = stratified_split(&targets, 2, 0.2, 42).unwrap();
        let (_, b) = stratified_split(&targets, 2, 0.2, 7).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn split_needs_two_per_class() {
        assert!(stratified_split(&[0, 0, 1], 2, 0.2, 42).is_err());
        assert!(stratified_split(&[0, 0, 1, 1], 2, 0.0, 42).is_err());
    }

    #[test]
    fn confusion_matrix_and_metrics() {
        let labels = vec!["limon".to_string(), "manzana".to_string()];
        let matrix = ConfusionMatrix::new(&labels, &[0, 0, 1, 1], &[0, 1, 1, 1]);
        assert_eq!(matrix.counts, vec![vec![1, 1], vec![0, 2]]);

        let metrics = matrix.class_metrics();
        assert_eq!(metrics[0].precision, 1.0);
        assert_eq!(metrics[0].recall, 0.5);
        assert_eq!(metrics[1].support, 2);
        assert!((metrics[1].precision - 2.0 / 3.0).abs() < 1e-12);

        let rendered = matrix.to_string();
        assert!(rendered.contains("manzana"));
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn rejects_wrong_class_count() {
        let options = TrainingOptions {
            classes: vec!["limon".to_string()],
            ..TrainingOptions::default()
        };
        assert!(train(&[], &options).is_err());
    }
}

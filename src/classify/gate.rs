
/// Minimum top-class probability for a prediction to be reported as an answer.
pub const CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Probability assigned to one class.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// Outcome of a classification request.
///
/// `predicted_label` is always the arg-max class, even when `accepted` is false; the
/// full distribution is kept for display.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub predicted_label: String,
    pub probabilities: Vec<ClassProbability>,
    pub accepted: bool,
}

impl ClassificationResult {
    /// The answer to report, or `None` for "unrecognized".
    pub fn accepted_label(&self) -> Option<&str> {
        self.accepted.then_some(self.predicted_label.as_str())
    }

    pub fn confidence(&self) -> f64 {
        self.probability_of(&self.predicted_label).unwrap_or(0.0)
    }

    pub fn probability_of(&self, label: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.probability)
    }
}

/// Accept the top class only when its probability reaches the threshold.
#[derive(Clone, Copy, Debug)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: CONFIDENCE_THRESHOLD,
        }
    }
}

impl ConfidenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide on a distribution aligned with `labels`.
    ///
    /// Ties at the maximum go to the label listed first. Returns `None` only when the
    /// label set is empty or the lengths disagree.
    pub fn decide(&self, labels: &[String], probabilities: &[f64]) -> Option<ClassificationResult> {
        if labels.is_empty() || labels.len() != probabilities.len() {
            return None;
        }
        let top = top_index(probabilities);
        let top_probability = probabilities[top];
        Some(ClassificationResult {
            predicted_label: labels[top].clone(),
            probabilities: labels
                .iter()
                .zip(probabilities)
                .map(|(label, p)| ClassProbability {
                    label: label.clone(),
                    probability: *p,
                })
                .collect(),
            accepted: top_probability >= self.threshold,
        })
    }
}

/// Index of the first maximal entry.
pub(crate) fn top_index(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn threshold_is_inclusive() {
        let result = ConfidenceGate::new().decide(&labels(), &[0.70, 0.30]).unwrap();
        assert!(result.accepted);
        assert_eq!(result.accepted_label(), Some("a"));
    }

    #[test]
    fn just_below_threshold_is_unrecognized() {
        let result = ConfidenceGate::new()
            .decide(&labels(), &[0.699999, 0.300001])
            .unwrap();
        assert!(!result.accepted);
        assert_eq!(result.accepted_label(), None);
        assert_eq!(result.predicted_label, "a");
        assert_eq!(result.probabilities.len(), 2);
    }

    #[test]
    fn ties_go_to_first_label() {
        let gate = ConfidenceGate::new();
        for _ in 0..10 {
            let result = gate.decide(&labels(), &[0.5, 0.5]).unwrap();
            assert_eq!(result.predicted_label, "a");
            assert!(!result.accepted);
        }
    }

    #[test]
    fn picks_later_maximum() {
        let result = ConfidenceGate::new().decide(&labels(), &[0.1, 0.9]).unwrap();
        assert_eq!(result.accepted_label(), Some("b"));
        assert_eq!(result.confidence(), 0.9);
        assert_eq!(result.probability_of("a"), Some(0.1));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(ConfidenceGate::new().decide(&labels(), &[1.0]).is_none());
        assert!(ConfidenceGate::new().decide(&[], &[]).is_none());
    }
}

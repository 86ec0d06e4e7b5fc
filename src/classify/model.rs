use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A trained classifier that maps a normalized 3-vector to a probability
/// distribution over a fixed, ordered label set.
///
/// Implementations must be deterministic: the same input always yields the same
/// distribution for a given set of parameters.
pub trait ProbabilisticClassifier {
    /// Class labels, in the order `predict_proba` reports them.
    fn labels(&self) -> &[String];

    fn predict_proba(&self, features: &[f64; 3]) -> Vec<f64>;
}

/// Single hidden layer perceptron with ReLU activations and a softmax output.
///
/// Weights are stored row-major: `hidden_weights[h * 3 + i]` connects input `i` to
/// hidden unit `h`, `output_weights[c * hidden + h]` connects hidden unit `h` to
/// class `c`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    labels: Vec<String>,
    hidden: usize,
    hidden_weights: Vec<f64>,
    hidden_bias: Vec<f64>,
    output_weights: Vec<f64>,
    output_bias: Vec<f64>,
}

impl MlpClassifier {
    fn initialise(labels: Vec<String>, hidden: usize, rng: &mut StdRng) -> Self {
        let classes = labels.len();
        let hidden_bound = glorot_bound(3, hidden);
        let output_bound = glorot_bound(hidden, classes);
        Self {
            hidden_weights: (0..hidden * 3)
                .map(|_| rng.gen_range(-hidden_bound..hidden_bound))
                .collect(),
            hidden_bias: (0..hidden)
                .map(|_| rng.gen_range(-hidden_bound..hidden_bound))
                .collect(),
            output_weights: (0..classes * hidden)
                .map(|_| rng.gen_range(-output_bound..output_bound))
                .collect(),
            output_bias: (0..classes)
                .map(|_| rng.gen_range(-output_bound..output_bound))
                .collect(),
            labels,
            hidden,
        }
    }

    /// Check array shapes after deserialisation.
    pub(crate) fn validate(&self) -> Result<()> {
        let classes = self.labels.len();
        if classes < 2 {
            return Err(anyhow!("model must have at least two classes"));
        }
        if self.hidden == 0
            || self.hidden_weights.len() != self.hidden * 3
            || self.hidden_bias.len() != self.hidden
            || self.output_weights.len() != classes * self.hidden
            || self.output_bias.len() != classes
        {
            return Err(anyhow!("model weights do not match a 3-feature, {}-class network", classes));
        }
        let all = self
            .hidden_weights
            .iter()
            .chain(&self.hidden_bias)
            .chain(&self.output_weights)
            .chain(&self.output_bias);
        if all.into_iter().any(|w| !w.is_finite()) {
            return Err(anyhow!("model weights must be finite"));
        }
        Ok(())
    }

    fn forward(&self, x: &[f64; 3]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut pre = vec![0.0; self.hidden];
        let mut act = vec![0.0; self.hidden];
        for h in 0..self.hidden {
            let w = &self.hidden_weights[h * 3..h * 3 + 3];
            let z = w[0] * x[0] + w[1] * x[1] + w[2] * x[2] + self.hidden_bias[h];
            pre[h] = z;
            act[h] = z.max(0.0);
        }
        let classes = self.labels.len();
        let mut logits = vec![0.0; classes];
        for (c, logit) in logits.iter_mut().enumerate() {
            let w = &self.output_weights[c * self.hidden..(c + 1) * self.hidden];
            *logit = self.output_bias[c] + w.iter().zip(&act).map(|(w, a)| w * a).sum::<f64>();
        }
        (pre, act, softmax(&logits))
    }
}

impl ProbabilisticClassifier for MlpClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict_proba(&self, features: &[f64; 3]) -> Vec<f64> {
        self.forward(features).2
    }
}

fn glorot_bound(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out) as f64).sqrt()
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

// ----------------------------------------------------------------------------
// Training
// ----------------------------------------------------------------------------

/// Adam optimiser over a fixed set of flat parameter buffers.
struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
    t: i32,
}

impl Adam {
    fn new(shapes: &[usize], lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: shapes.iter().map(|len| vec![0.0; *len]).collect(),
            v: shapes.iter().map(|len| vec![0.0; *len]).collect(),
            t: 0,
        }
    }

    fn step(&mut self, params: [&mut Vec<f64>; 4], grads: [&Vec<f64>; 4]) {
        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t);
        for (idx, (param, grad)) in params.into_iter().zip(grads).enumerate() {
            for i in 0..grad.len() {
                let g = grad[i];
                self.m[idx][i] = self.beta1 * self.m[idx][i] + (1.0 - self.beta1) * g;
                self.v[idx][i] = self.beta2 * self.v[idx][i] + (1.0 - self.beta2) * g * g;
                let m_hat = self.m[idx][i] / bias_correction1;
                let v_hat = self.v[idx][i] / bias_correction2;
                param[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

/// Hyper-parameters for fitting an [`MlpClassifier`].
#[derive(Clone, Debug)]
pub struct MlpTrainer {
    pub hidden_units: usize,
    pub learning_rate: f64,
    /// L2 penalty on weights (not biases).
    pub alpha: f64,
    pub max_epochs: usize,
    /// Minimum loss improvement that resets the early-stop counter.
    pub tolerance: f64,
    /// Epochs without sufficient improvement before stopping.
    pub patience: usize,
    pub seed: u64,
}

impl Default for MlpTrainer {
    fn default() -> Self {
        Self {
            hidden_units: 10,
            learning_rate: 1e-2,
            alpha: 1e-4,
            max_epochs: 1000,
            tolerance: 1e-4,
            patience: 10,
            seed: 42,
        }
    }
}

/// Outcome of a training run.
#[derive(Clone, Debug)]
pub struct FitReport {
    pub epochs: usize,
    pub final_loss: f64,
    pub converged: bool,
}

impl MlpTrainer {
    /// Fit on normalized features. `targets[i]` indexes into `labels`.
    pub fn fit(
        &self,
        labels: Vec<String>,
        features: &[[f64; 3]],
        targets: &[usize],
    ) -> Result<(MlpClassifier, FitReport)> {
        if labels.len() < 2 {
            return Err(anyhow!("need at least two classes to train"));
        }
        if features.is_empty() || features.len() != targets.len() {
            return Err(anyhow!(
                "feature/target length mismatch ({} vs {})",
                features.len(),
                targets.len()
            ));
        }
        if let Some(bad) = targets.iter().find(|t| **t >= labels.len()) {
            return Err(anyhow!("target index {} outside label set", bad));
        }
        if self.hidden_units == 0 {
            return Err(anyhow!("hidden_units must be > 0"));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut model = MlpClassifier::initialise(labels, self.hidden_units, &mut rng);
        let mut adam = Adam::new(
            &[
                model.hidden_weights.len(),
                model.hidden_bias.len(),
                model.output_weights.len(),
                model.output_bias.len(),
            ],
            self.learning_rate,
        );

        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;
        let mut report = FitReport {
            epochs: 0,
            final_loss: f64::INFINITY,
            converged: false,
        };

        for epoch in 1..=self.max_epochs {
            let (loss, grads) = self.loss_and_gradients(&model, features, targets);
            adam.step(
                [
                    &mut model.hidden_weights,
                    &mut model.hidden_bias,
                    &mut model.output_weights,
                    &mut model.output_bias,
                ],
                [&grads[0], &grads[1], &grads[2], &grads[3]],
            );
            log::debug!("epoch {}: loss={:.6}", epoch, loss);
            report.epochs = epoch;
            report.final_loss = loss;

            if loss > best_loss - self.tolerance {
                stale_epochs += 1;
            } else {
                stale_epochs = 0;
            }
            best_loss = best_loss.min(loss);
            if stale_epochs >= self.patience {
                report.converged = true;
                break;
            }
        }

        if !report.final_loss.is_finite() {
            return Err(anyhow!("training diverged (loss is not finite)"));
        }
        Ok((model, report))
    }

    /// Mean cross-entropy plus L2 penalty, and gradients in parameter order.
    fn loss_and_gradients(
        &self,
        model: &MlpClassifier,
        features: &[[f64; 3]],
        targets: &[usize],
    ) -> (f64, [Vec<f64>; 4]) {
        let hidden = model.hidden;
        let classes = model.labels.len();
        let n = features.len() as f64;

        let mut g_hw = vec![0.0; model.hidden_weights.len()];
        let mut g_hb = vec![0.0; model.hidden_bias.len()];
        let mut g_ow = vec![0.0; model.output_weights.len()];
        let mut g_ob = vec![0.0; model.output_bias.len()];
        let mut loss = 0.0;

        for (x, &target) in features.iter().zip(targets) {
            let (pre, act, probs) = model.forward(x);
            loss -= probs[target].max(1e-12).ln();

            let mut delta_hidden = vec![0.0; hidden];
            for c in 0..classes {
                let delta = probs[c] - if c == target { 1.0 } else { 0.0 };
                g_ob[c] += delta;
                for h in 0..hidden {
                    g_ow[c * hidden + h] += delta * act[h];
                    delta_hidden[h] += delta * model.output_weights[c * hidden + h];
                }
            }
            for h in 0..hidden {
                if pre[h] <= 0.0 {
                    continue;
                }
                g_hb[h] += delta_hidden[h];
                for i in 0..3 {
                    g_hw[h * 3 + i] += delta_hidden[h] * x[i];
                }
            }
        }

        let penalty: f64 = model
            .hidden_weights
            .iter()
            .chain(&model.output_weights)
            .map(|w| w * w)
            .sum();
        loss = loss / n + 0.5 * self.alpha * penalty / n;

        for (g, w) in g_hw.iter_mut().zip(&model.hidden_weights) {
            *g = *g / n + self.alpha * w / n;
        }
        for (g, w) in g_ow.iter_mut().zip(&model.output_weights) {
            *g = *g / n + self.alpha * w / n;
        }
        for g in g_hb.iter_mut().chain(g_ob.iter_mut()) {
            *g /= n;
        }
        (loss, [g_hw, g_hb, g_ow, g_ob])
    }
}

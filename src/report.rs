//! Operator-facing text for session events.

use crate::classify::{ClassificationResult, CONFIDENCE_THRESHOLD};
use crate::dataset::LabeledSample;
use crate::frame::RawFrame;

const BAR_WIDTH: f64 = 20.0;

/// Multi-line report for one live classification.
pub fn classification_report(clock: &str, frame: RawFrame, result: &ClassificationResult) -> String {
    let mut out = String::new();
    let rgb = format!("RGB({:4}, {:4}, {:4})", frame.r, frame.g, frame.b);
    match result.accepted_label() {
        Some(label) => {
            out.push_str(&format!("[{}] {} -> {}\n", clock, rgb, label.to_uppercase()));
        }
        None => {
            out.push_str(&format!("[{}] {} -> OBJETO NO RECONOCIDO\n", clock, rgb));
            out.push_str(&format!(
                "   Confianza insuficiente (< {:.0}%)\n",
                CONFIDENCE_THRESHOLD * 100.0
            ));
        }
    }
    for class in &result.probabilities {
        out.push_str(&format!(
            "   {:10}: {:5.1}% {}\n",
            class.label,
            class.probability * 100.0,
            probability_bar(class.probability)
        ));
    }
    out
}

/// `floor(p * 20)` block characters.
pub fn probability_bar(probability: f64) -> String {
    let blocks = (probability.clamp(0.0, 1.0) * BAR_WIDTH).floor() as usize;
    "\u{2588}".repeat(blocks)
}

pub fn sample_recorded(sample: &LabeledSample) -> String {
    format!(
        "Muestra registrada: [{}, {}, {}, {}, {}]",
        sample.timestamp, sample.label, sample.r, sample.g, sample.b
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ConfidenceGate;

    fn labels() -> Vec<String> {
        vec!["limon".to_string(), "manzana".to_string()]
    }

    #[test]
    fn bar_floors_to_twentieths() {
        assert_eq!(probability_bar(1.0).chars().count(), 20);
        assert_eq!(probability_bar(0.74).chars().count(), 14);
        assert_eq!(probability_bar(0.0), "");
        assert_eq!(probability_bar(1.5).chars().count(), 20);
    }

    #[test]
    fn accepted_report_names_label() {
        let result = ConfidenceGate::new().decide(&labels(), &[0.9, 0.1]).unwrap();
        let text = classification_report("10:11:12", RawFrame::new(1000, 1400, 650), &result);
        let first = text.lines().next().unwrap();
        assert_eq!(first, "[10:11:12] RGB(1000, 1400,  650) -> LIMON");
        assert!(text.contains("limon     :  90.0%"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn rejected_report_flags_low_confidence() {
        let result = ConfidenceGate::new().decide(&labels(), &[0.6, 0.4]).unwrap();
        let text = classification_report("10:11:12", RawFrame::new(1, 2, 3), &result);
        assert!(text.contains("OBJETO NO RECONOCIDO"));
        assert!(text.contains("(< 70%)"));
        assert!(!text.contains("LIMON"));
    }
}

// Aggregation Logic
// Folds the four heuristic scores into one suspicion percentage

use crate::models::{HeuristicComponents, SuspicionResult};
use super::heuristics::compute_components;

/// Below this richness the vocabulary starts to look generated.
const RICHNESS_THRESHOLD: f64 = 0.35;
/// Sentence length (words) considered typical of human prose.
const TARGET_SENTENCE_LEN: f64 = 20.0;

const WEIGHT_RICHNESS: f64 = 0.35;
const WEIGHT_SENTENCE_LEN: f64 = 0.25;
const WEIGHT_REPETITION: f64 = 0.25;
const WEIGHT_TEMPLATE: f64 = 0.15;

/// Per-component suspicion signals, each in 0..=1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspicionSignals {
    pub richness: f64,
    pub sentence_length: f64,
    pub repetition: f64,
    pub template: f64,
}

pub fn suspicion_signals(c: &HeuristicComponents) -> SuspicionSignals {
    SuspicionSignals {
        richness: ((RICHNESS_THRESHOLD - c.lexical_richness) / RICHNESS_THRESHOLD).max(0.0),
        sentence_length: ((c.avg_sentence_length - TARGET_SENTENCE_LEN).abs() / TARGET_SENTENCE_LEN)
            .clamp(0.0, 1.0),
        repetition: c.repetitiveness.clamp(0.0, 1.0),
        template: c.template_similarity,
    }
}

/// Weighted combination of the signals, rounded half-to-even to a percentage.
pub fn aggregate_components(components: HeuristicComponents) -> SuspicionResult {
    let s = suspicion_signals(&components);
    let combined = WEIGHT_RICHNESS * s.richness
        + WEIGHT_SENTENCE_LEN * s.sentence_length
        + WEIGHT_REPETITION * s.repetition
        + WEIGHT_TEMPLATE * s.template;

    let percent = (combined * 100.0).round_ties_even().clamp(0.0, 100.0) as u8;

    SuspicionResult { percent, components }
}

/// Score `text` end to end.
pub fn detect_ai_suspicion(text: &str) -> SuspicionResult {
    aggregate_components(compute_components(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn components(richness: f64, avg: f64, rep: f64, templ: f64) -> HeuristicComponents {
        HeuristicComponents {
            lexical_richness: richness,
            avg_sentence_length: avg,
            repetitiveness: rep,
            template_similarity: templ,
        }
    }

    #[test]
    fn test_neutral_components_score_zero() {
        let result = aggregate_components(components(0.8, 20.0, 0.0, 0.0));
        assert_eq!(result.percent, 0);
    }

    #[test]
    fn test_worst_case_components_score_hundred() {
        let result = aggregate_components(components(0.0, 60.0, 1.0, 1.0));
        assert_eq!(result.percent, 100);
    }

    #[test]
    fn test_richness_signal_is_zero_above_threshold() {
        let s = suspicion_signals(&components(0.9, 20.0, 0.0, 0.0));
        assert_eq!(s.richness, 0.0);
        let s = suspicion_signals(&components(0.175, 20.0, 0.0, 0.0));
        assert!((s.richness - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sentence_signal_is_symmetric_and_clamped() {
        let short = suspicion_signals(&components(1.0, 10.0, 0.0, 0.0));
        let long = suspicion_signals(&components(1.0, 30.0, 0.0, 0.0));
        assert_eq!(short.sentence_length, long.sentence_length);
        let huge = suspicion_signals(&components(1.0, 500.0, 0.0, 0.0));
        assert_eq!(huge.sentence_length, 1.0);
    }

    #[test]
    fn test_repeated_disclaimer_text() {
        let text = "As an AI language model, I cannot provide opinions. As an AI language model, I cannot provide opinions.";
        let result = detect_ai_suspicion(text);

        assert_eq!(result.components.template_similarity, 1.0);
        assert_eq!(result.components.lexical_richness, 0.5);
        assert_eq!(result.components.avg_sentence_length, 18.0);
        assert_eq!(result.components.repetitiveness, 7.0 / 16.0);
        // 0.25 * 0.1 + 0.25 * 0.4375 + 0.15 * 1.0
        assert_eq!(result.percent, 28);
    }

    #[test]
    fn test_empty_text() {
        // avg sentence length 0 deviates fully from 20; richness 0 is maximal
        let result = detect_ai_suspicion("");
        assert_eq!(result.percent, 60);
    }

    proptest! {
        #[test]
        fn prop_percent_is_bounded(text in ".{0,300}") {
            let result = detect_ai_suspicion(&text);
            prop_assert!(result.percent <= 100);
        }

        #[test]
        fn prop_percent_bounded_for_any_components(
            r in 0.0f64..=1.0, avg in 0.0f64..200.0, rep in 0.0f64..=1.0, t in 0.0f64..=1.0
        ) {
            let result = aggregate_components(components(r, avg, rep, t));
            prop_assert!(result.percent <= 100);
        }
    }
}

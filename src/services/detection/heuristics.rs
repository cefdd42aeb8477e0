// Heuristic Scorers
// Pure text statistics feeding the AI-suspicion aggregate

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::models::HeuristicComponents;
use crate::services::fuzzy::partial_ratio;
use crate::services::text_processor::first_chars;

/// Boilerplate openers typical of generated text.
pub const TEMPLATE_PHRASES: [&str; 5] = [
    "As an AI language model",
    "This article discusses",
    "In conclusion, this",
    "It is important to note that",
    "The following text provides an overview",
];

/// Only the opening of a document is compared against the templates.
pub const TEMPLATE_WINDOW_CHARS: usize = 400;

const NGRAM_SIZE: usize = 3;
const MIN_WORDS_FOR_REPETITION: usize = 6;

/// Letters only (Unicode category L). Combining marks such as a Devanagari
/// virama do not count.
fn is_alphabetic_token(token: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\p{L}+$").unwrap()).is_match(token)
}

/// Distinct alphabetic tokens over all alphabetic tokens.
pub fn lexical_richness(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().filter(|w| is_alphabetic_token(w)).collect();
    if words.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = words.iter().copied().collect();
    unique.len() as f64 / words.len() as f64
}

/// Mean word count per non-empty line; each line counts as one sentence.
pub fn average_sentence_length(text: &str) -> f64 {
    let lens: Vec<usize> = text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split_whitespace().count())
        .collect();

    if lens.is_empty() {
        return 0.0;
    }
    lens.iter().sum::<usize>() as f64 / lens.len() as f64
}

/// Share of word trigrams that repeat an earlier trigram.
pub fn repetitiveness(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < MIN_WORDS_FOR_REPETITION {
        return 0.0;
    }

    let mut counts: HashMap<&[&str], usize> = HashMap::new();
    let windows = words.windows(NGRAM_SIZE);
    let total = windows.len();
    for gram in windows {
        *counts.entry(gram).or_insert(0) += 1;
    }

    let repeats: usize = counts.values().filter(|&&c| c > 1).map(|&c| c - 1).sum();
    repeats as f64 / total.max(1) as f64
}

/// Closest template phrase match in the document opening, in 0..=1.
pub fn template_similarity(text: &str) -> f64 {
    let opening = first_chars(text, TEMPLATE_WINDOW_CHARS).to_lowercase();
    TEMPLATE_PHRASES
        .iter()
        .map(|phrase| partial_ratio(&opening, &phrase.to_lowercase()))
        .fold(0.0, f64::max)
        / 100.0
}

pub fn compute_components(text: &str) -> HeuristicComponents {
    HeuristicComponents {
        lexical_richness: lexical_richness(text),
        avg_sentence_length: average_sentence_length(text),
        repetitiveness: repetitiveness(text),
        template_similarity: template_similarity(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_text_scores_zero() {
        assert_eq!(lexical_richness(""), 0.0);
        assert_eq!(average_sentence_length(""), 0.0);
        assert_eq!(repetitiveness(""), 0.0);
    }

    #[test]
    fn test_lexical_richness_counts_only_alphabetic_tokens() {
        // "model," and "42" are not purely alphabetic
        assert_eq!(lexical_richness("the model, the 42 cat"), 2.0 / 3.0);
        assert_eq!(lexical_richness("every word differs here"), 1.0);
        assert_eq!(lexical_richness("Word word"), 1.0);
    }

    #[test]
    fn test_combining_marks_are_not_letters() {
        assert!(is_alphabetic_token("caf\u{e9}"));
        assert!(is_alphabetic_token("\u{928}\u{92e}"));
        assert!(!is_alphabetic_token("\u{928}\u{92e}\u{938}\u{94d}\u{924}\u{947}"));
        assert!(!is_alphabetic_token("cafe\u{301}"));
        // The Devanagari word is skipped, leaving "cat cat"
        assert_eq!(lexical_richness("\u{928}\u{92e}\u{938}\u{94d}\u{924}\u{947} cat cat"), 0.5);
    }

    #[test]
    fn test_average_sentence_length_uses_lines() {
        let text = "one two three\n\n   \nfour five\r\nsix";
        // lines: 3, 2, 1 words
        assert_eq!(average_sentence_length(text), 2.0);
    }

    #[test]
    fn test_repetitiveness_short_text_is_zero() {
        assert_eq!(repetitiveness("a a a a a"), 0.0);
    }

    #[test]
    fn test_repetitiveness_counts_excess_repeats() {
        // 8 words, 6 trigrams, each of the 3 distinct trigrams seen twice
        let text = "a b c a b c a b";
        assert_eq!(repetitiveness(text), 0.5);
    }

    #[test]
    fn test_repetitiveness_all_distinct() {
        assert_eq!(repetitiveness("one two three four five six seven"), 0.0);
    }

    #[test]
    fn test_template_similarity_exact_phrase() {
        let text = "As an AI language model, I cannot provide opinions.";
        assert_eq!(template_similarity(text), 1.0);
    }

    #[test]
    fn test_template_similarity_is_case_insensitive() {
        assert_eq!(template_similarity("IN CONCLUSION, THIS essay shows"), 1.0);
    }

    #[test]
    fn test_template_similarity_only_reads_opening() {
        let text = format!("{}It is important to note that", "x ".repeat(300));
        assert!(template_similarity(&text) < 1.0);
    }

    proptest! {
        #[test]
        fn prop_richness_in_unit_interval(text in "[a-zA-Z0-9 ,.\n]{0,200}") {
            let r = lexical_richness(&text);
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn prop_repetitiveness_in_unit_interval(text in "[ab ]{0,200}") {
            let r = repetitiveness(&text);
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn prop_fewer_than_six_words_never_repetitive(words in proptest::collection::vec("[a-z]{1,4}", 0..6)) {
            prop_assert_eq!(repetitiveness(&words.join(" ")), 0.0);
        }

        #[test]
        fn prop_template_similarity_in_unit_interval(text in ".{0,500}") {
            let t = template_similarity(&text);
            prop_assert!((0.0..=1.0).contains(&t));
        }
    }
}

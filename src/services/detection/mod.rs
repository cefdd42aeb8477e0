// Detection Module
// Scoring pipeline organized into specialized submodules:
// - heuristics: pure text statistics (richness, sentence length, repetition, templates)
// - aggregation: weighted fold of the heuristics into a suspicion percentage
// - plagiarism: fuzzy lookup against the reference corpus

pub mod heuristics;
pub mod aggregation;
pub mod plagiarism;

pub use heuristics::{
    average_sentence_length,
    compute_components,
    lexical_richness,
    repetitiveness,
    template_similarity,
    TEMPLATE_PHRASES,
};
pub use aggregation::{aggregate_components, detect_ai_suspicion, suspicion_signals, SuspicionSignals};
pub use plagiarism::{check_plagiarism, Corpus, DEFAULT_TOP_N, MATCH_THRESHOLD};

// SageBot Data Models
// Shared result types for the scoring pipeline, grammar review and sessions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============ AI Suspicion ============

/// Raw heuristic measurements for one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct HeuristicComponents {
    pub lexical_richness: f64,
    pub avg_sentence_length: f64,
    pub repetitiveness: f64,
    pub template_similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspicionResult {
    /// Integer percentage in 0..=100.
    pub percent: u8,
    pub components: HeuristicComponents,
}

// ============ Plagiarism ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlagiarismMatch {
    pub score: u8,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlagiarismResult {
    pub percent: u8,
    #[serde(default)]
    pub matches: Vec<PlagiarismMatch>,
}

impl PlagiarismResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

// ============ Grammar ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarIssue {
    pub message: String,
    /// Offset into the reviewed text, in UTF-16 code units.
    pub offset: usize,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrammarSource {
    Service,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarResult {
    pub corrected: String,
    #[serde(default)]
    pub issues: Vec<GrammarIssue>,
    pub source: GrammarSource,
}

impl GrammarResult {
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

// ============ Session ============

/// One uploaded document and everything computed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub id: Uuid,
    pub file_name: String,
    pub raw_text_path: PathBuf,
    pub ai: SuspicionResult,
    pub plagiarism: PlagiarismResult,
    pub grammar: GrammarResult,
    /// Epoch seconds.
    pub timestamp: i64,
}

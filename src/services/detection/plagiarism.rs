// Plagiarism Matcher
// Fuzzy token-set comparison of a document against a flat CSV corpus

use std::path::Path;
use tracing::{debug, warn};

use crate::models::{PlagiarismMatch, PlagiarismResult};
use crate::services::fuzzy::token_set_ratio;
use crate::services::text_processor::first_chars;

pub const DEFAULT_TOP_N: usize = 3;
/// Records scoring at least this much are listed as candidates.
pub const MATCH_THRESHOLD: f64 = 50.0;
const COMPARE_CHARS: usize = 2000;
const SNIPPET_CHARS: usize = 400;

/// Reference texts read from the `content` column of the corpus file.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<String>,
}

impl Corpus {
    pub fn new(records: Vec<String>) -> Self {
        Self { records }
    }

    /// Load `path`; a missing, unreadable or malformed file yields an empty corpus.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "plagiarism.corpus_missing");
            return Self::default();
        }

        match Self::load(path) {
            Ok(corpus) => {
                debug!(path = %path.display(), records = corpus.len(), "plagiarism.corpus_loaded");
                corpus
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "plagiarism.corpus_unreadable");
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let content_idx = reader.headers()?.iter().position(|h| h.trim() == "content");

        let Some(idx) = content_idx else {
            warn!(path = %path.display(), "plagiarism.corpus_missing_content_column");
            return Ok(Self::default());
        };

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(row.get(idx).unwrap_or_default().to_string());
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[String] {
        &self.records
    }
}

/// Compare `text` against every corpus record.
///
/// `percent` is the best raw score across the whole corpus, while `matches`
/// keeps only records at or above [`MATCH_THRESHOLD`], best first, at most
/// `top_n` of them.
pub fn check_plagiarism(text: &str, corpus: &Corpus, top_n: usize) -> PlagiarismResult {
    if corpus.is_empty() {
        return PlagiarismResult::empty();
    }

    let needle = first_chars(text, COMPARE_CHARS);
    let mut best: f64 = 0.0;
    let mut candidates: Vec<(f64, &str)> = Vec::new();

    for content in corpus.records() {
        let score = token_set_ratio(needle, first_chars(content, COMPARE_CHARS));
        if score >= MATCH_THRESHOLD {
            candidates.push((score, content));
        }
        best = best.max(score);
    }

    // Stable sort keeps corpus order among equal scores
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let matches = candidates
        .into_iter()
        .take(top_n)
        .map(|(score, content)| PlagiarismMatch {
            score: score as u8,
            snippet: first_chars(content, SNIPPET_CHARS).to_string(),
        })
        .collect();

    PlagiarismResult {
        percent: best as u8,
        matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn corpus(records: &[&str]) -> Corpus {
        Corpus::new(records.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_empty_corpus_returns_zero() {
        let result = check_plagiarism("any text at all", &Corpus::default(), DEFAULT_TOP_N);
        assert_eq!(result, PlagiarismResult { percent: 0, matches: vec![] });
    }

    #[test]
    fn test_missing_corpus_file_is_empty() {
        let corpus = Corpus::load_or_empty(Path::new("/no/such/corpus.csv"));
        assert!(corpus.is_empty());
        let result = check_plagiarism("text", &corpus, DEFAULT_TOP_N);
        assert_eq!(result.percent, 0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_corpus_without_content_column_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        fs::write(&path, "title,body\nA,some text\n").unwrap();
        assert!(Corpus::load_or_empty(&path).is_empty());
    }

    #[test]
    fn test_load_csv_with_quoted_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.csv");
        fs::write(
            &path,
            "id,content\n1,\"first, with comma\"\n2,\"multi\nline\"\n3,plain\n",
        )
        .unwrap();
        let corpus = Corpus::load_or_empty(&path);
        assert_eq!(corpus.records(), &["first, with comma", "multi\nline", "plain"]);
    }

    #[test]
    fn test_best_score_is_unfiltered() {
        let corpus = corpus(&["completely unrelated words about gardening"]);
        let result = check_plagiarism("quantum physics lecture notes", &corpus, DEFAULT_TOP_N);
        assert!(result.matches.is_empty());
        assert!(result.percent > 0 && result.percent < 50, "percent was {}", result.percent);
    }

    #[test]
    fn test_matches_sorted_and_truncated() {
        let text = "the industrial revolution changed manufacturing in britain";
        let corpus = corpus(&[
            "the industrial revolution changed manufacturing",
            "bananas are yellow",
            "the industrial revolution changed manufacturing in britain and europe",
            "the revolution changed britain",
            "industrial manufacturing in britain changed the revolution",
            "the industrial revolution",
        ]);

        let result = check_plagiarism(text, &corpus, DEFAULT_TOP_N);
        assert_eq!(result.percent, 100);
        assert_eq!(result.matches.len(), 3);
        assert!(result.matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(result.matches.iter().all(|m| m.score >= 50));
        assert!(!result.matches.iter().any(|m| m.snippet.contains("bananas")));
    }

    #[test]
    fn test_snippet_is_truncated() {
        let long = format!("shared words {}", "filler ".repeat(200));
        let corpus = corpus(&[long.as_str()]);
        let result = check_plagiarism("shared words", &corpus, 1);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].snippet.chars().count(), SNIPPET_CHARS);
    }
}

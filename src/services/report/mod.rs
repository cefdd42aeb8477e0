// Report Composer
// Builds the named report sections and renders them to PDF and Word

pub mod docx;
pub mod pdf;

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::models::AnalysisSession;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
    #[error("DOCX rendering failed: {0}")]
    Docx(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
}

impl ReportSection {
    fn new(title: &str, body: String) -> Self {
        Self { title: title.to_string(), body }
    }
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub pdf: PathBuf,
    pub docx: PathBuf,
}

pub fn report_title(file_name: &str) -> String {
    format!("Analysis Report - {}", file_name)
}

/// Summary, AI Breakdown, Plagiarism Matches, Grammar Corrections.
pub fn compose_sections(session: &AnalysisSession) -> Vec<ReportSection> {
    let summary = format!(
        "File: {}\nAI Suspicion: {}%\nPlagiarism: {}%\nGrammar issues: {}",
        session.file_name,
        session.ai.percent,
        session.plagiarism.percent,
        session.grammar.issue_count()
    );

    let breakdown = serde_json::to_string_pretty(&session.ai.components)
        .unwrap_or_else(|_| format!("{:?}", session.ai.components));

    let matches = if session.plagiarism.matches.is_empty() {
        "No matches found.".to_string()
    } else {
        session
            .plagiarism
            .matches
            .iter()
            .map(|m| format!("{}% - {}", m.score, m.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    };

    vec![
        ReportSection::new("Summary", summary),
        ReportSection::new("AI Breakdown", breakdown),
        ReportSection::new("Plagiarism Matches", matches),
        ReportSection::new("Grammar Corrections", session.grammar.corrected.clone()),
    ]
}

/// A run of text, flagged when it is one of the highlight phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub highlighted: bool,
}

/// Case-insensitive whole-word matcher for the configured phrases. A phrase
/// inside a longer word ("plagiarized" in "unplagiarized") is not flagged.
pub struct Highlighter {
    re: Option<Regex>,
}

impl Highlighter {
    pub fn new(phrases: &[String]) -> Self {
        let alternatives: Vec<String> = phrases
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| regex::escape(p.trim()))
            .collect();
        if alternatives.is_empty() {
            return Self { re: None };
        }
        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        Self { re: Regex::new(&pattern).ok() }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        let Some(re) = &self.re else {
            return vec![Segment { text, highlighted: false }];
        };

        let mut segments = Vec::new();
        let mut cursor = 0;
        for m in re.find_iter(text) {
            if m.start() > cursor {
                segments.push(Segment { text: &text[cursor..m.start()], highlighted: false });
            }
            segments.push(Segment { text: m.as_str(), highlighted: true });
            cursor = m.end();
        }
        if cursor < text.len() || segments.is_empty() {
            segments.push(Segment { text: &text[cursor..], highlighted: false });
        }
        segments
    }

    /// Distinct phrases found in `text`, uppercased, in first-seen order.
    pub fn found(&self, text: &str) -> Vec<String> {
        let Some(re) = &self.re else {
            return Vec::new();
        };
        let mut seen: Vec<String> = Vec::new();
        for m in re.find_iter(text) {
            let phrase = m.as_str().to_uppercase();
            if !seen.contains(&phrase) {
                seen.push(phrase);
            }
        }
        seen
    }
}

fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Render both report documents for `session` into `reports_dir`.
pub fn render_reports(
    session: &AnalysisSession,
    reports_dir: &Path,
    highlights: &[String],
) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(reports_dir)?;

    let stamp = chrono::Utc::now().timestamp();
    let base = format!("{}_{}", stamp, safe_file_name(&session.file_name));
    let paths = ReportPaths {
        pdf: reports_dir.join(format!("{}.pdf", base)),
        docx: reports_dir.join(format!("{}.docx", base)),
    };

    let title = report_title(&session.file_name);
    let sections = compose_sections(session);
    let highlighter = Highlighter::new(highlights);

    pdf::render_pdf(&paths.pdf, &title, &sections, &highlighter)?;
    docx::render_docx(&paths.docx, &title, &sections, &highlighter)?;

    info!(
        session_id = %session.id,
        pdf = %paths.pdf.display(),
        docx = %paths.docx.display(),
        "report.rendered"
    );
    Ok(paths)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        GrammarResult, GrammarSource, HeuristicComponents, PlagiarismMatch, PlagiarismResult, SuspicionResult,
    };
    use uuid::Uuid;

    pub(crate) fn sample_session() -> AnalysisSession {
        AnalysisSession {
            id: Uuid::new_v4(),
            file_name: "essay final.txt".to_string(),
            raw_text_path: PathBuf::from("downloads/1_essay.txt"),
            ai: SuspicionResult {
                percent: 28,
                components: HeuristicComponents {
                    lexical_richness: 0.5,
                    avg_sentence_length: 18.0,
                    repetitiveness: 0.4375,
                    template_similarity: 1.0,
                },
            },
            plagiarism: PlagiarismResult {
                percent: 72,
                matches: vec![PlagiarismMatch {
                    score: 72,
                    snippet: "A plagiarized passage about AI ethics.".to_string(),
                }],
            },
            grammar: GrammarResult {
                corrected: "As an AI language model, I cannot provide opinions.".to_string(),
                issues: Vec::new(),
                source: GrammarSource::Fallback,
            },
            timestamp: 1_700_000_000,
        }
    }

    fn default_highlights() -> Vec<String> {
        vec!["AI".to_string(), "plagiarized".to_string()]
    }

    #[test]
    fn test_compose_sections_order_and_summary() {
        let sections = compose_sections(&sample_session());
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Summary", "AI Breakdown", "Plagiarism Matches", "Grammar Corrections"]);
        assert_eq!(
            sections[0].body,
            "File: essay final.txt\nAI Suspicion: 28%\nPlagiarism: 72%\nGrammar issues: 0"
        );
        assert!(sections[1].body.contains("\"template_similarity\": 1.0"));
        assert_eq!(sections[2].body, "72% - A plagiarized passage about AI ethics.");
    }

    #[test]
    fn test_no_matches_placeholder() {
        let mut session = sample_session();
        session.plagiarism = PlagiarismResult::empty();
        assert_eq!(compose_sections(&session)[2].body, "No matches found.");
    }

    #[test]
    fn test_highlighter_splits_whole_words_case_insensitively() {
        let h = Highlighter::new(&default_highlights());
        let segments = h.split("Said the ai: this is Plagiarized.");
        let flagged: Vec<&str> = segments.iter().filter(|s| s.highlighted).map(|s| s.text).collect();
        assert_eq!(flagged, ["ai", "Plagiarized"]);
        let rebuilt: String = segments.iter().map(|s| s.text).collect();
        assert_eq!(rebuilt, "Said the ai: this is Plagiarized.");
    }

    #[test]
    fn test_highlighter_skips_phrase_inside_longer_word() {
        let h = Highlighter::new(&default_highlights());
        let segments = h.split("unplagiarized work, plagiarized work");
        let flagged: Vec<&str> = segments.iter().filter(|s| s.highlighted).map(|s| s.text).collect();
        assert_eq!(flagged, ["plagiarized"]);
        assert!(!segments[0].highlighted);
        assert_eq!(segments[0].text, "unplagiarized work, ");
    }

    #[test]
    fn test_highlighter_without_phrases() {
        let h = Highlighter::new(&[]);
        assert_eq!(h.split("AI text"), vec![Segment { text: "AI text", highlighted: false }]);
        assert!(h.found("AI text").is_empty());
    }

    #[test]
    fn test_highlighter_found_dedups() {
        let h = Highlighter::new(&default_highlights());
        assert_eq!(h.found("AI and ai and plagiarized"), vec!["AI", "PLAGIARIZED"]);
    }

    #[test]
    fn test_render_reports_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = render_reports(&sample_session(), dir.path(), &default_highlights()).unwrap();

        assert!(paths.pdf.file_name().unwrap().to_string_lossy().ends_with("_essay_final.txt.pdf"));
        assert!(fs::metadata(&paths.pdf).unwrap().len() > 0);
        assert!(fs::metadata(&paths.docx).unwrap().len() > 0);
    }
}

// Grammar Review Service
// LanguageTool HTTP checks with a local rule-based fallback corrector

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{GrammarIssue, GrammarResult, GrammarSource};

pub const LANGUAGETOOL_DEFAULT_URL: &str = "https://api.languagetool.org";

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    matches: Vec<CheckMatch>,
}

#[derive(Debug, Deserialize)]
struct CheckMatch {
    message: String,
    offset: usize,
    length: usize,
    #[serde(default)]
    replacements: Vec<Replacement>,
}

#[derive(Debug, Deserialize)]
struct Replacement {
    value: String,
}

fn issues_from_response(response: CheckResponse) -> Vec<GrammarIssue> {
    response
        .matches
        .into_iter()
        .map(|m| GrammarIssue {
            message: m.message,
            offset: m.offset,
            length: m.length,
            replacement: m.replacements.into_iter().next().map(|r| r.value),
        })
        .collect()
}

/// Client for a LanguageTool server's `/v2/check` endpoint.
pub struct LanguageToolClient {
    client: Client,
    check_url: String,
    language: String,
}

impl LanguageToolClient {
    pub fn new(base_url: &str, language: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            check_url: format!("{}/v2/check", base_url.trim_end_matches('/')),
            language: language.to_string(),
        }
    }

    pub async fn check(&self, text: &str) -> Result<Vec<GrammarIssue>, GrammarError> {
        let start = Instant::now();

        let response = self
            .client
            .post(&self.check_url)
            .form(&[("text", text), ("language", self.language.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GrammarError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: CheckResponse = response
            .json()
            .await
            .map_err(|e| GrammarError::JsonError(e.to_string()))?;

        let issues = issues_from_response(data);
        debug!(
            issues = issues.len(),
            latency_ms = start.elapsed().as_millis() as i64,
            "grammar.service_checked"
        );
        Ok(issues)
    }
}

/// Produces corrected text and flagged issues; never fails.
pub struct GrammarReviewer {
    service: Option<LanguageToolClient>,
}

impl GrammarReviewer {
    pub fn new(service: Option<LanguageToolClient>) -> Self {
        Self { service }
    }

    pub fn offline() -> Self {
        Self { service: None }
    }

    pub async fn review(&self, text: &str) -> GrammarResult {
        if let Some(service) = &self.service {
            match service.check(text).await {
                Ok(issues) => {
                    return GrammarResult {
                        corrected: apply_corrections(text, &issues),
                        issues,
                        source: GrammarSource::Service,
                    };
                }
                Err(e) => warn!(error = %e, "grammar.service_unavailable_fallback"),
            }
        }

        info!("grammar.fallback_correction");
        GrammarResult {
            corrected: fallback_correct(text),
            issues: Vec::new(),
            source: GrammarSource::Fallback,
        }
    }
}

/// Byte index of the UTF-16 code unit `unit` in `text`, or `None` when it
/// lands inside a surrogate pair or past the end.
fn utf16_to_byte(text: &str, unit: usize) -> Option<usize> {
    let mut units = 0usize;
    for (byte, ch) in text.char_indices() {
        if units == unit {
            return Some(byte);
        }
        if units > unit {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == unit).then_some(text.len())
}

/// Apply the first replacement of each issue; overlapping issues after the
/// first are skipped. Offsets are UTF-16 code units, as LanguageTool reports them.
pub fn apply_corrections(text: &str, issues: &[GrammarIssue]) -> String {
    let mut ordered: Vec<&GrammarIssue> = issues.iter().filter(|i| i.replacement.is_some()).collect();
    ordered.sort_by_key(|i| i.offset);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for issue in ordered {
        let span = utf16_to_byte(text, issue.offset)
            .zip(utf16_to_byte(text, issue.offset + issue.length));
        let Some((start, end)) = span else {
            continue;
        };
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        if let Some(replacement) = &issue.replacement {
            out.push_str(replacement);
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

const COMMON_MISSPELLINGS: &[(&str, &str)] = &[
    ("teh", "the"),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("occured", "occurred"),
    ("definately", "definitely"),
    ("untill", "until"),
    ("wich", "which"),
    ("becuase", "because"),
    ("alot", "a lot"),
    ("thier", "their"),
    ("goverment", "government"),
    ("enviroment", "environment"),
    ("accomodate", "accommodate"),
    ("acheive", "achieve"),
    ("beleive", "believe"),
    ("tommorow", "tomorrow"),
    ("wierd", "weird"),
    ("existance", "existence"),
    ("publically", "publicly"),
    ("arguement", "argument"),
];

fn space_before_punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +([,.;:!?])").unwrap())
}

fn lone_i_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)(^|\s)i(\s|'|$)").unwrap())
}

/// Rule-based correction used when no grammar service is reachable.
pub fn fallback_correct(text: &str) -> String {
    let lines: Vec<String> = text.lines().map(correct_line_words).collect();
    let mut s = lines.join("\n");

    s = space_before_punct_re().replace_all(&s, "$1").to_string();
    // Run twice so adjacent matches like "i i" both get fixed
    for _ in 0..2 {
        s = lone_i_re().replace_all(&s, "${1}I${2}").to_string();
    }
    capitalize_sentences(&s)
}

/// Collapse repeated spaces, drop immediately doubled words and fix known misspellings.
fn correct_line_words(line: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for token in line.split(' ').filter(|t| !t.is_empty()) {
        let fixed = fix_spelling(token);
        if let Some(prev) = words.last() {
            let is_word = fixed.chars().all(char::is_alphabetic);
            if is_word && prev.eq_ignore_ascii_case(&fixed) {
                continue;
            }
        }
        words.push(fixed);
    }
    words.join(" ")
}

fn fix_spelling(token: &str) -> String {
    let core_end = token
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let (core, trailing) = token.split_at(core_end);
    if core.is_empty() || !core.chars().all(char::is_alphabetic) {
        return token.to_string();
    }

    let lower = core.to_lowercase();
    let Some((_, right)) = COMMON_MISSPELLINGS.iter().find(|(wrong, _)| *wrong == lower) else {
        return token.to_string();
    };

    let starts_upper = core.chars().next().map_or(false, char::is_uppercase);
    let mut fixed = if starts_upper { capitalize_first(right) } else { right.to_string() };
    fixed.push_str(trailing);
    fixed
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercase the first letter of the text and of each sentence that follows
/// terminal punctuation plus whitespace.
fn capitalize_sentences(text: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Armed,
        SawTerminal,
        Inside,
    }

    let mut state = State::Armed;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            if state == State::Armed {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            state = State::Inside;
            continue;
        }

        if matches!(c, '.' | '!' | '?') {
            state = State::SawTerminal;
        } else if c.is_whitespace() && state == State::SawTerminal {
            state = State::Armed;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(offset: usize, length: usize, replacement: Option<&str>) -> GrammarIssue {
        GrammarIssue {
            message: "test".to_string(),
            offset,
            length,
            replacement: replacement.map(str::to_string),
        }
    }

    #[test]
    fn test_apply_corrections_in_order() {
        let text = "Thiss is an exmaple.";
        let issues = vec![issue(12, 7, Some("example")), issue(0, 5, Some("This"))];
        assert_eq!(apply_corrections(text, &issues), "This is an example.");
    }

    #[test]
    fn test_apply_corrections_skips_overlap_and_out_of_range() {
        let text = "abc def";
        let issues = vec![
            issue(0, 3, Some("xyz")),
            issue(1, 2, Some("QQ")),
            issue(5, 10, Some("never")),
            issue(4, 3, None),
        ];
        assert_eq!(apply_corrections(text, &issues), "xyz def");
    }

    #[test]
    fn test_apply_corrections_counts_utf16_units() {
        // The emoji is two UTF-16 units, so "teh" starts at unit 3.
        let text = "😀 teh cat";
        assert_eq!(apply_corrections(text, &[issue(3, 3, Some("the"))]), "😀 the cat");

        let text = "naïve teh";
        assert_eq!(apply_corrections(text, &[issue(6, 3, Some("the"))]), "naïve the");

        // Unit 1 is the middle of the surrogate pair.
        assert_eq!(apply_corrections("😀 teh", &[issue(1, 2, Some("x"))]), "😀 teh");
    }

    #[test]
    fn test_issues_from_service_response() {
        let body = r#"{
            "software": {"name": "LanguageTool"},
            "matches": [
                {"message": "Possible spelling mistake found.", "offset": 4, "length": 3,
                 "replacements": [{"value": "the"}, {"value": "tea"}], "rule": {"id": "MORFOLOGIK"}},
                {"message": "Missing comma?", "offset": 10, "length": 1, "replacements": []}
            ]
        }"#;
        let response: CheckResponse = serde_json::from_str(body).unwrap();
        let issues = issues_from_response(response);

        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].replacement.as_deref(), Some("the"));
        assert_eq!(issues[1].replacement, None);
        assert_eq!(issues[1].message, "Missing comma?");
    }

    #[test]
    fn test_fallback_fixes_common_mistakes() {
        let text = "i think  teh answer is is clear . this is wierd, i'm sure";
        assert_eq!(
            fallback_correct(text),
            "I think the answer is clear. This is weird, I'm sure"
        );
    }

    #[test]
    fn test_fallback_keeps_line_structure() {
        let text = "first line.\nsecond Line";
        assert_eq!(fallback_correct(text), "First line.\nSecond Line");
    }

    #[test]
    fn test_fallback_preserves_case_of_corrections() {
        assert_eq!(fallback_correct("Teh end."), "The end.");
        assert_eq!(fallback_correct("we recieve, wich works"), "We receive, which works");
    }

    #[test]
    fn test_capitalize_needs_whitespace_after_terminal() {
        assert_eq!(capitalize_sentences("use i.e. this"), "Use i.e. This");
        assert_eq!(capitalize_sentences("v1.2 ok"), "V1.2 ok");
    }

    #[tokio::test]
    async fn test_offline_reviewer_uses_fallback() {
        let reviewer = GrammarReviewer::offline();
        let result = reviewer.review("teh cat").await;
        assert_eq!(result.source, GrammarSource::Fallback);
        assert_eq!(result.issue_count(), 0);
        assert_eq!(result.corrected, "The cat");
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back() {
        let reviewer = GrammarReviewer::new(Some(LanguageToolClient::new("http://127.0.0.1:9", "en-US")));
        let result = reviewer.review("hello world").await;
        assert_eq!(result.source, GrammarSource::Fallback);
        assert_eq!(result.corrected, "Hello world");
    }
}

use anyhow::Context;
use sagebot_lib::models::AnalysisSession;
use sagebot_lib::services::config_store::AppConfig;
use sagebot_lib::services::detection::{check_plagiarism, detect_ai_suspicion, Corpus, DEFAULT_TOP_N};
use sagebot_lib::services::extractor::{extract_text, DocumentKind};
use sagebot_lib::services::grammar::GrammarReviewer;
use sagebot_lib::services::report::render_reports;
use sagebot_lib::services::text_processor::preview;
use std::path::PathBuf;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1].starts_with("--") {
        eprintln!(
            "Usage:\n  cargo run --bin analyze_file -- <path.txt|.docx|.pdf> [--corpus <csv>] [--top <n>] [--online] [--out <json_path>] [--report <dir>]\n\nNotes:\n  - Grammar review runs offline unless --online is given (uses LANGUAGETOOL_URL or the public server).\n  - --report writes the PDF and Word reports into <dir>."
        );
        return Ok(());
    }

    let path = PathBuf::from(&args[1]);
    let corpus_path = parse_arg_value(&args, "--corpus").map(PathBuf::from);
    let top_n: usize = parse_arg_value(&args, "--top")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TOP_N);
    let out_path = parse_arg_value(&args, "--out");
    let report_dir = parse_arg_value(&args, "--report").map(PathBuf::from);

    let text = extract_text(&path).with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("{} contains no text", path.display());
    }

    let mut config = AppConfig::default();
    config.apply_env_overrides();

    let grammar = if has_flag(&args, "--online") {
        config.grammar.use_service = true;
        sagebot_lib::grammar_reviewer(&config)
    } else {
        GrammarReviewer::offline()
    };

    let corpus = corpus_path
        .as_deref()
        .map(Corpus::load_or_empty)
        .unwrap_or_default();

    let ai = detect_ai_suspicion(&text);
    let plagiarism = check_plagiarism(&text, &corpus, top_n);
    let grammar = grammar.review(&text).await;

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());

    println!("File: {} ({:?})", path.display(), DocumentKind::from_path(&path));
    println!("Extracted: {} chars ({} bytes)", text.chars().count(), text.len());
    println!("Preview: {}", preview(&text, 120));
    println!();
    println!("AI suspicion: {}%", ai.percent);
    println!("  lexical richness:    {:.4}", ai.components.lexical_richness);
    println!("  avg sentence length: {:.2}", ai.components.avg_sentence_length);
    println!("  repetitiveness:      {:.4}", ai.components.repetitiveness);
    println!("  template similarity: {:.2}", ai.components.template_similarity);
    println!();
    println!("Plagiarism top match: {}% (corpus: {} records)", plagiarism.percent, corpus.len());
    for m in &plagiarism.matches {
        println!("  [{:3}%] {}", m.score, preview(&m.snippet, 100));
    }
    println!();
    println!("Grammar issues: {} ({:?})", grammar.issue_count(), grammar.source);

    let session = AnalysisSession {
        id: uuid::Uuid::new_v4(),
        file_name,
        raw_text_path: path.clone(),
        ai,
        plagiarism,
        grammar,
        timestamp: chrono::Utc::now().timestamp(),
    };

    if let Some(out_path) = out_path {
        let json = serde_json::to_string_pretty(&session)?;
        std::fs::write(&out_path, json).with_context(|| format!("writing {}", out_path))?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    if let Some(dir) = report_dir {
        let paths = render_reports(&session, &dir, &config.report.highlights)?;
        println!("Wrote reports: {} and {}", paths.pdf.display(), paths.docx.display());
    }

    Ok(())
}

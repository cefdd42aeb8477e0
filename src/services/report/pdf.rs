// PDF Report Renderer
// Lays out report sections on A4 pages with the standard Helvetica fonts

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::fs;
use std::path::Path;

use super::{Highlighter, ReportError, ReportSection};
use crate::services::text_processor::sanitize_for_report;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN_X: f32 = 50.0;
const MARGIN_TOP: f32 = 60.0;
const MARGIN_BOTTOM: f32 = 60.0;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 15.0;
/// Helvetica averages roughly half an em per character.
const AVG_CHAR_EM: f32 = 0.5;

type Rgb = (f32, f32, f32);
const BLACK: Rgb = (0.0, 0.0, 0.0);
const DARK_BLUE: Rgb = (0.0, 0.0, 0.545);
const HEADING_BLUE: Rgb = (0.0, 0.298, 0.6);
const RED: Rgb = (0.85, 0.0, 0.0);

#[derive(Debug, Clone)]
struct Run {
    text: String,
    bold: bool,
    color: Rgb,
}

#[derive(Debug, Clone)]
enum Line {
    Title(String),
    Heading(String),
    Body(Vec<Run>),
    Gap(f32),
}

impl Line {
    fn height(&self) -> f32 {
        match self {
            Line::Title(_) => TITLE_SIZE + 20.0,
            Line::Heading(_) => HEADING_SIZE + 18.0,
            Line::Body(_) => BODY_LEADING,
            Line::Gap(h) => *h,
        }
    }
}

fn body_chars_per_line() -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN_X) / (BODY_SIZE * AVG_CHAR_EM)) as usize
}

/// Greedy word wrap by character count; overlong words are hard-split.
pub(crate) fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }

            let needed = if current.is_empty() { word.chars().count() } else { current.chars().count() + 1 + word.chars().count() };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        lines.push(current);
    }
    lines
}

fn layout(title: &str, sections: &[ReportSection], highlighter: &Highlighter) -> Vec<Line> {
    let mut lines = vec![Line::Title(sanitize_for_report(title))];
    let width = body_chars_per_line();

    for section in sections {
        lines.push(Line::Heading(sanitize_for_report(&section.title)));
        for text in wrap_text(&sanitize_for_report(&section.body), width) {
            let runs = highlighter
                .split(&text)
                .into_iter()
                .map(|seg| {
                    if seg.highlighted {
                        Run { text: seg.text.to_uppercase(), bold: true, color: RED }
                    } else {
                        Run { text: seg.text.to_string(), bold: false, color: BLACK }
                    }
                })
                .collect();
            lines.push(Line::Body(runs));
        }
        lines.push(Line::Gap(12.0));
    }
    lines
}

fn paginate(lines: Vec<Line>) -> Vec<Vec<(Line, f32)>> {
    let mut pages: Vec<Vec<(Line, f32)>> = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN_TOP;

    for line in lines {
        let h = line.height();
        if y - h < MARGIN_BOTTOM {
            pages.push(Vec::new());
            y = PAGE_HEIGHT - MARGIN_TOP;
            // Gaps at the top of a page are dropped
            if matches!(line, Line::Gap(_)) {
                continue;
            }
        }
        y -= h;
        if let Some(page) = pages.last_mut() {
            page.push((line, y));
        }
    }
    pages
}

fn text_ops(ops: &mut Vec<Operation>, x: f32, y: f32, runs: &[Run], size: f32) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    for run in runs {
        let font = if run.bold { "F2" } else { "F1" };
        ops.push(Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]));
        ops.push(Operation::new("rg", vec![run.color.0.into(), run.color.1.into(), run.color.2.into()]));
        ops.push(Operation::new("Tj", vec![Object::string_literal(run.text.as_bytes().to_vec())]));
    }
    ops.push(Operation::new("ET", vec![]));
}

fn page_operations(page: &[(Line, f32)]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (line, y) in page {
        match line {
            Line::Title(text) => {
                let width = text.chars().count() as f32 * TITLE_SIZE * AVG_CHAR_EM;
                let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN_X);
                let run = Run { text: text.clone(), bold: true, color: DARK_BLUE };
                text_ops(&mut ops, x, *y, &[run], TITLE_SIZE);
            }
            Line::Heading(text) => {
                let run = Run { text: text.clone(), bold: true, color: HEADING_BLUE };
                text_ops(&mut ops, MARGIN_X, *y, &[run], HEADING_SIZE);
            }
            Line::Body(runs) => text_ops(&mut ops, MARGIN_X, *y, runs, BODY_SIZE),
            Line::Gap(_) => {}
        }
    }
    ops
}

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Build the PDF in memory.
pub fn build_pdf(title: &str, sections: &[ReportSection], highlighter: &Highlighter) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in paginate(layout(title, sections, highlighter)) {
        let content = Content { operations: page_operations(&page) };
        let encoded = content.encode().map_err(|e| ReportError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| ReportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

pub fn render_pdf(
    path: &Path,
    title: &str,
    sections: &[ReportSection],
    highlighter: &Highlighter,
) -> Result<(), ReportError> {
    let bytes = build_pdf(title, sections, highlighter)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlighter() -> Highlighter {
        Highlighter::new(&["AI".to_string(), "plagiarized".to_string()])
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six", 9);
        assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
    }

    #[test]
    fn test_wrap_text_keeps_blank_lines_and_splits_long_words() {
        let lines = wrap_text("ab\n\nabcdefghij", 4);
        assert_eq!(lines, vec!["ab", "", "abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_layout_uppercases_highlights() {
        let sections = vec![ReportSection {
            title: "Summary".to_string(),
            body: "the ai wrote this".to_string(),
        }];
        let lines = layout("Report", &sections, &highlighter());
        let body = lines
            .iter()
            .find_map(|l| match l {
                Line::Body(runs) => Some(runs.clone()),
                _ => None,
            })
            .unwrap();
        let flagged: Vec<&Run> = body.iter().filter(|r| r.bold).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].text, "AI");
        assert_eq!(flagged[0].color, RED);
    }

    #[test]
    fn test_build_pdf_is_loadable() {
        let sections = vec![ReportSection {
            title: "Summary".to_string(),
            body: "AI Suspicion: 28%".to_string(),
        }];
        let bytes = build_pdf("Analysis Report - essay.txt", &sections, &highlighter()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_long_body_spans_pages() {
        let sections = vec![ReportSection {
            title: "Grammar Corrections".to_string(),
            body: "A line of corrected text.\n".repeat(120),
        }];
        let bytes = build_pdf("Long", &sections, &highlighter()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() >= 3);
    }
}

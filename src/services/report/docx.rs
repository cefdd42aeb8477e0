// Word Report Renderer

use docx_rs::{Docx, Paragraph, Run};
use std::fs::File;
use std::path::Path;

use super::{Highlighter, ReportError, ReportSection};

// Sizes are in half-points
const TITLE_SIZE: usize = 36;
const HEADING_SIZE: usize = 28;
const BODY_SIZE: usize = 22;

fn body_paragraph(line: &str, highlighter: &Highlighter) -> Paragraph {
    highlighter
        .split(line)
        .into_iter()
        .fold(Paragraph::new(), |para, seg| {
            let run = Run::new().add_text(seg.text).size(BODY_SIZE);
            let run = if seg.highlighted {
                run.bold().color("C00000").highlight("yellow")
            } else {
                run
            };
            para.add_run(run)
        })
}

pub fn build_docx(title: &str, sections: &[ReportSection], highlighter: &Highlighter) -> Docx {
    let mut docx = Docx::new().add_paragraph(
        Paragraph::new().add_run(Run::new().add_text(title).bold().size(TITLE_SIZE).color("00008B")),
    );

    for section in sections {
        docx = docx.add_paragraph(
            Paragraph::new().add_run(
                Run::new()
                    .add_text(section.title.as_str())
                    .bold()
                    .size(HEADING_SIZE)
                    .color("004C99"),
            ),
        );

        for line in section.body.split('\n') {
            docx = docx.add_paragraph(body_paragraph(line, highlighter));
        }

        let found = highlighter.found(&section.body);
        if !found.is_empty() {
            let markers = found
                .iter()
                .map(|p| format!("[{} DETECTED]", p))
                .collect::<Vec<_>>()
                .join(" ");
            docx = docx.add_paragraph(
                Paragraph::new().add_run(Run::new().add_text(markers).bold().size(BODY_SIZE)),
            );
        }
    }

    docx
}

pub fn render_docx(
    path: &Path,
    title: &str,
    sections: &[ReportSection],
    highlighter: &Highlighter,
) -> Result<(), ReportError> {
    let file = File::create(path)?;
    build_docx(title, sections, highlighter)
        .build()
        .pack(file)
        .map_err(|e| ReportError::Docx(e.to_string()))?;
    Ok(())
}

//! Markdown previews: per-line attribute tagging.
//!
//! The pane only needs a readable skim, not a rendered document: headings
//! come back bold, fenced/indented code and list items carry their own
//! attributes, everything else is plain text.

use super::{clip, content_rows};
use anyhow::{Context, Result};
use shoal_protocol::{FileKind, PreviewLine, PreviewRequest, PreviewResult, TextAttr};
use std::fs;

pub fn render(request: &PreviewRequest) -> Result<PreviewResult> {
    let bytes = fs::read(&request.path)
        .with_context(|| format!("Failed to read {}", request.path.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    let mut in_fence = false;
    let lines: Vec<PreviewLine> = content
        .lines()
        .take(content_rows(request.height))
        .map(|raw| {
            let text = clip(raw, request.width);
            let trimmed = raw.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                PreviewLine::styled(text, vec![TextAttr::Code])
            } else if in_fence || raw.starts_with("    ") || raw.starts_with('\t') {
                PreviewLine::styled(text, vec![TextAttr::Code])
            } else if trimmed.starts_with('#') {
                PreviewLine::styled(text, vec![TextAttr::Bold])
            } else if is_list_item(trimmed) {
                PreviewLine::styled(text, vec![TextAttr::List])
            } else {
                PreviewLine::plain(text)
            }
        })
        .collect();

    Ok(PreviewResult::success(request.id, FileKind::Markdown).with_lines(lines))
}

fn is_list_item(trimmed: &str) -> bool {
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ") {
        return true;
    }
    // Ordered items: digits followed by ". " or ") "
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let rest = &trimmed[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}

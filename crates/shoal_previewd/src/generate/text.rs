//! Text and code previews.
//!
//! Reads the file with invalid-byte replacement, classifies NUL-bearing
//! content as binary, and tries lexer detection for syntax highlighting.
//! Highlighted files come back as `code` results with per-character colored
//! segments; everything else as plain `text` lines.

use super::{clip, content_rows, placeholder};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use shoal_protocol::{FileKind, PreviewLine, PreviewRequest, PreviewResult, Segment};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Color, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// Render bounds never need more than this; keeps giant files cheap.
const MAX_READ_BYTES: usize = 256 * 1024;

const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

pub fn render(request: &PreviewRequest) -> Result<PreviewResult> {
    let bytes = read_capped(&request.path)?;

    // A NUL byte always classifies the file as binary, whatever its name.
    if bytes.contains(&0) {
        return Ok(placeholder(request, FileKind::Binary, "[Binary file]"));
    }

    let content = String::from_utf8_lossy(&bytes);
    if let Some(lines) = highlight(&content, &request.path, request.width, request.height) {
        return Ok(PreviewResult::success(request.id, FileKind::Code).with_lines(lines));
    }

    let lines: Vec<PreviewLine> = content
        .lines()
        .take(content_rows(request.height))
        .map(|line| PreviewLine::plain(clip(line, request.width)))
        .collect();
    Ok(PreviewResult::success(request.id, FileKind::Text).with_lines(lines))
}

fn read_capped(path: &Path) -> Result<Vec<u8>> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut bytes = Vec::new();
    file.by_ref()
        .take(MAX_READ_BYTES as u64)
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(bytes)
}

/// Try lexer detection by extension, then by first line. Returns `None` when
/// no lexer matches or highlighting fails, in which case the caller falls
/// back to plain text lines.
fn highlight(content: &str, path: &Path, width: u16, height: u16) -> Option<Vec<PreviewLine>> {
    let syntax = find_syntax(path, content)?;
    let theme = THEME_SET.themes.get(HIGHLIGHT_THEME)?;
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut lines = Vec::new();
    for line in LinesWithEndings::from(content).take(content_rows(height)) {
        let ranges = highlighter.highlight_line(line, &SYNTAX_SET).ok()?;
        let mut segments: Vec<Segment> = Vec::new();
        'ranges: for (style, chunk) in ranges {
            let color = ansi256(style.foreground);
            for ch in chunk.chars() {
                if ch == '\n' || ch == '\r' {
                    continue;
                }
                if segments.len() >= width as usize {
                    break 'ranges;
                }
                segments.push(Segment { ch, color });
            }
        }
        lines.push(PreviewLine::Code { segments });
    }
    Some(lines)
}

fn find_syntax<'s>(path: &Path, content: &str) -> Option<&'s SyntaxReference> {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| SYNTAX_SET.find_syntax_by_extension(ext));
    let syntax = by_extension.or_else(|| {
        content
            .lines()
            .next()
            .and_then(|first| SYNTAX_SET.find_syntax_by_first_line(first))
    })?;
    // Plain text "highlighting" would be all one color; not worth sending
    // per-character segments for.
    if syntax.name == "Plain Text" {
        return None;
    }
    Some(syntax)
}

/// Map an RGB foreground to the xterm-256 palette: grayscale ramp for gray
/// tones, 6x6x6 color cube for the rest.
fn ansi256(color: Color) -> u8 {
    let (r, g, b) = (color.r as u16, color.g as u16, color.b as u16);
    if r == g && g == b {
        if r < 8 {
            return 16;
        }
        if r > 248 {
            return 231;
        }
        return (232 + (r - 8) / 10) as u8;
    }
    (16 + 36 * (r * 5 / 255) + 6 * (g * 5 / 255) + (b * 5 / 255)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_protocol::RequestId;
    use std::io::Write;

    fn request_for(path: &Path, width: u16, height: u16) -> PreviewRequest {
        PreviewRequest::new(RequestId::new(1), path, Some(FileKind::Text), width, height)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    #[test]
    fn nul_byte_always_classifies_as_binary() {
        let dir = tempfile::tempdir().unwrap();
        // Valid UTF-8, plausible extension, still binary because of the NUL.
        let path = write_file(&dir, "innocent.rs", b"fn main() {}\0rest");

        let result = render(&request_for(&path, 80, 24)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.file_type, Some(FileKind::Binary));
        assert_eq!(
            result.lines,
            Some(vec![PreviewLine::centered("[Binary file]")])
        );
    }

    #[test]
    fn plain_text_is_truncated_to_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..50)
            .map(|i| format!("{i} {}\n", "x".repeat(200)))
            .collect();
        let path = write_file(&dir, "notes", body.as_bytes());

        let result = render(&request_for(&path, 40, 10)).unwrap();
        assert_eq!(result.file_type, Some(FileKind::Text));
        let lines = result.lines.unwrap();
        assert_eq!(lines.len(), 8);
        for line in &lines {
            match line {
                PreviewLine::Styled { text, .. } => assert!(text.chars().count() <= 40),
                other => panic!("unexpected line {other:?}"),
            }
        }
    }

    #[test]
    fn rust_source_comes_back_highlighted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "main.rs", b"fn main() {\n    let x = 1;\n}\n");

        let result = render(&request_for(&path, 30, 24)).unwrap();
        assert_eq!(result.file_type, Some(FileKind::Code));
        let lines = result.lines.unwrap();
        assert_eq!(lines.len(), 3);
        match &lines[0] {
            PreviewLine::Code { segments } => {
                assert!(!segments.is_empty());
                assert!(segments.len() <= 30);
                let text: String = segments.iter().map(|s| s.ch).collect();
                assert_eq!(text, "fn main() {");
            }
            other => panic!("expected code line, got {other:?}"),
        }
    }

    #[test]
    fn shebang_detection_highlights_extensionless_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "deploy", b"#!/bin/bash\necho hi\n");

        let result = render(&request_for(&path, 80, 24)).unwrap();
        assert_eq!(result.file_type, Some(FileKind::Code));
    }

    #[test]
    fn invalid_utf8_without_nul_still_previews_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "latin1", b"caf\xe9 au lait\n");

        let result = render(&request_for(&path, 80, 24)).unwrap();
        assert_eq!(result.file_type, Some(FileKind::Text));
        match &result.lines.unwrap()[0] {
            PreviewLine::Styled { text, .. } => assert!(text.contains("caf")),
            other => panic!("unexpected line {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(render(&request_for(Path::new("/no/such/file/7f3a"), 80, 24)).is_err());
    }

    #[test]
    fn ansi256_maps_grays_and_colors() {
        assert_eq!(ansi256(Color { r: 0, g: 0, b: 0, a: 255 }), 16);
        assert_eq!(ansi256(Color { r: 255, g: 255, b: 255, a: 255 }), 231);
        // Pure red lands in the color cube's red corner.
        assert_eq!(ansi256(Color { r: 255, g: 0, b: 0, a: 255 }), 196);
    }
}

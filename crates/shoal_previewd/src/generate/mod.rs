//! Preview generators, one per file category.
//!
//! Every generator degrades to a best-effort result rather than letting an
//! error escape: a missing tool, a timeout, or an unreadable file becomes a
//! placeholder line or a typed fallback. [`dispatch`] is the single entry
//! point workers call; it also converts anything that does escape into an
//! `error` result carrying the failure message.

pub mod directory;
pub mod heic;
pub mod markdown;
pub mod pdf;
pub mod text;
pub mod video;

use anyhow::{Context, Result};
use shoal_protocol::{FileKind, PreviewLine, PreviewRequest, PreviewResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Everything a generator needs beyond the request itself.
#[derive(Debug, Clone)]
pub struct GeneratorContext {
    /// Budget for each external tool invocation.
    pub tool_timeout: Duration,
    /// Server-owned directory generated thumbnails are written into.
    pub thumbnail_dir: PathBuf,
}

/// Generate a preview for `request`, dispatching on its file category.
///
/// Never fails: an escaping generator error is converted into an `error`
/// result so the worker always has something to deliver (or discard).
pub fn dispatch(request: &PreviewRequest, ctx: &GeneratorContext) -> PreviewResult {
    let kind = request
        .file_type
        .unwrap_or_else(|| infer_kind(&request.path));

    let generated = match kind {
        FileKind::Directory => directory::render(request),
        FileKind::Markdown => markdown::render(request),
        FileKind::Video => video::render(request, ctx),
        FileKind::Pdf | FileKind::PdfText => pdf::render(request, ctx),
        FileKind::Heic => heic::render(request, ctx),
        // Images are painted directly by the UI's terminal graphics layer;
        // acknowledge immediately so the pane knows the file is ready.
        FileKind::Image => Ok(PreviewResult::success(request.id, FileKind::Image)),
        // Text and code share one pipeline that classifies for itself, and
        // it doubles as the fallback for anything unrecognized.
        FileKind::Text | FileKind::Code | FileKind::Binary => text::render(request),
    };

    match generated {
        Ok(result) => result,
        Err(e) => {
            warn!("Preview {} for {} failed: {:#}", request.id, request.path.display(), e);
            PreviewResult::error(request.id, e.to_string())
        }
    }
}

/// Best-effort category for requests that arrive without a hint.
pub fn infer_kind(path: &Path) -> FileKind {
    if path.is_dir() {
        return FileKind::Directory;
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("md" | "markdown") => FileKind::Markdown,
        Some("mp4" | "mkv" | "avi" | "mov" | "webm" | "m4v" | "flv" | "wmv" | "mpg" | "mpeg") => {
            FileKind::Video
        }
        Some("pdf") => FileKind::Pdf,
        Some("heic" | "heif") => FileKind::Heic,
        Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tiff") => FileKind::Image,
        _ => FileKind::Text,
    }
}

/// Rows available for content inside the preview pane frame.
pub(crate) fn content_rows(height: u16) -> usize {
    height.saturating_sub(2) as usize
}

/// Clip a line to the requested render width.
pub(crate) fn clip(text: &str, width: u16) -> String {
    text.chars().take(width as usize).collect()
}

/// Single centered placeholder, e.g. `[Video file]`.
pub(crate) fn placeholder(request: &PreviewRequest, kind: FileKind, label: &str) -> PreviewResult {
    PreviewResult::success(request.id, kind).with_lines(vec![PreviewLine::centered(label)])
}

/// Reserve a uniquely named file in the thumbnail dir for a tool to write
/// into. The file survives until the consumer deletes it.
pub(crate) fn thumbnail_target(dir: &Path, prefix: &str, ext: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create thumbnail dir {}", dir.display()))?;
    let path = tempfile::Builder::new()
        .prefix(&format!("{prefix}-"))
        .suffix(&format!(".{ext}"))
        .tempfile_in(dir)
        .context("Failed to reserve thumbnail file")?
        .into_temp_path()
        .keep()
        .context("Failed to persist thumbnail file")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_protocol::RequestId;

    #[test]
    fn infers_kind_from_extension() {
        assert_eq!(infer_kind(Path::new("/x/notes.md")), FileKind::Markdown);
        assert_eq!(infer_kind(Path::new("/x/clip.MKV")), FileKind::Video);
        assert_eq!(infer_kind(Path::new("/x/paper.pdf")), FileKind::Pdf);
        assert_eq!(infer_kind(Path::new("/x/photo.heic")), FileKind::Heic);
        assert_eq!(infer_kind(Path::new("/x/photo.jpeg")), FileKind::Image);
        assert_eq!(infer_kind(Path::new("/x/main.rs")), FileKind::Text);
        assert_eq!(infer_kind(Path::new("/x/LICENSE")), FileKind::Text);
    }

    #[test]
    fn infers_directories_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(infer_kind(dir.path()), FileKind::Directory);
    }

    #[test]
    fn clip_respects_character_boundaries() {
        assert_eq!(clip("héllo wörld", 5), "héllo");
        assert_eq!(clip("short", 80), "short");
    }

    #[test]
    fn dispatch_converts_escaping_errors_into_error_results() {
        let ctx = GeneratorContext {
            tool_timeout: Duration::from_secs(1),
            thumbnail_dir: std::env::temp_dir(),
        };
        let request = PreviewRequest::new(
            RequestId::new(1),
            "/definitely/not/a/path/7f3a",
            Some(FileKind::Directory),
            80,
            24,
        );
        let result = dispatch(&request, &ctx);
        assert!(result.is_error());
        assert_eq!(result.id, request.id);
        assert!(result.error.is_some());
    }

    #[test]
    fn image_requests_are_acknowledged_immediately() {
        let ctx = GeneratorContext {
            tool_timeout: Duration::from_secs(1),
            thumbnail_dir: std::env::temp_dir(),
        };
        let request =
            PreviewRequest::new(RequestId::new(2), "/x/photo.png", Some(FileKind::Image), 80, 24);
        let result = dispatch(&request, &ctx);
        assert!(result.is_success());
        assert_eq!(result.file_type, Some(FileKind::Image));
        assert_eq!(result.lines, None);
    }

    #[test]
    fn thumbnail_target_creates_unique_persistent_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = thumbnail_target(dir.path(), "video", "jpg").unwrap();
        let b = thumbnail_target(dir.path(), "video", "jpg").unwrap();
        assert_ne!(a, b);
        assert!(a.exists());
        assert!(a.extension().is_some_and(|e| e == "jpg"));
    }
}

//! PDF previews: rasterize page one, fall back to text extraction.
//!
//! Ordered tool chain: `pdftoppm`, then `mutool`, each under the timeout
//! budget. When neither can rasterize, `pdftotext` provides a plain-text
//! rendition (`pdf_text`); when even that yields nothing, a placeholder.

use super::{clip, content_rows, placeholder, thumbnail_target, GeneratorContext};
use crate::exec::run_tool;
use anyhow::{bail, Context, Result};
use shoal_protocol::{FileKind, PreviewLine, PreviewRequest, PreviewResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

type Rasterizer = fn(&Path, &GeneratorContext) -> Result<PathBuf>;

const RASTERIZERS: &[(&str, Rasterizer)] = &[
    ("pdftoppm", rasterize_pdftoppm),
    ("mutool", rasterize_mutool),
];

pub fn render(request: &PreviewRequest, ctx: &GeneratorContext) -> Result<PreviewResult> {
    for (name, rasterize) in RASTERIZERS {
        match rasterize(&request.path, ctx) {
            Ok(thumb) => {
                return Ok(PreviewResult::success(request.id, FileKind::Pdf).with_thumbnail(thumb))
            }
            Err(e) => debug!("{} failed for {}: {:#}", name, request.path.display(), e),
        }
    }
    render_text_fallback(request, ctx)
}

fn rasterize_pdftoppm(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "pdf", "jpg")?;
    // pdftoppm takes an output prefix and appends the extension itself.
    let prefix = target.with_extension("");
    let args: &[&OsStr] = &[
        "-jpeg".as_ref(),
        "-f".as_ref(),
        "1".as_ref(),
        "-l".as_ref(),
        "1".as_ref(),
        "-singlefile".as_ref(),
        "-scale-to".as_ref(),
        "960".as_ref(),
        path.as_os_str(),
        prefix.as_os_str(),
    ];
    if let Err(e) = run_tool("pdftoppm", args, ctx.tool_timeout) {
        let _ = std::fs::remove_file(&target);
        return Err(e.into());
    }
    ensure_nonempty(&target)?;
    Ok(target)
}

fn rasterize_mutool(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "pdf", "png")?;
    let args: &[&OsStr] = &[
        "draw".as_ref(),
        "-o".as_ref(),
        target.as_os_str(),
        "-r".as_ref(),
        "96".as_ref(),
        path.as_os_str(),
        "1".as_ref(),
    ];
    if let Err(e) = run_tool("mutool", args, ctx.tool_timeout) {
        let _ = std::fs::remove_file(&target);
        return Err(e.into());
    }
    ensure_nonempty(&target)?;
    Ok(target)
}

fn ensure_nonempty(path: &Path) -> Result<()> {
    let len = std::fs::metadata(path)
        .with_context(|| format!("Missing rasterizer output {}", path.display()))?
        .len();
    if len == 0 {
        let _ = std::fs::remove_file(path);
        bail!("rasterizer produced an empty file");
    }
    Ok(())
}

fn render_text_fallback(request: &PreviewRequest, ctx: &GeneratorContext) -> Result<PreviewResult> {
    let args: &[&OsStr] = &[
        "-l".as_ref(),
        "1".as_ref(),
        request.path.as_os_str(),
        "-".as_ref(),
    ];
    let extracted = match run_tool("pdftotext", args, ctx.tool_timeout) {
        Ok(output) => output,
        Err(e) => {
            debug!("pdftotext failed for {}: {}", request.path.display(), e);
            return Ok(placeholder(request, FileKind::Pdf, "[PDF document]"));
        }
    };

    let content = String::from_utf8_lossy(&extracted);
    if content.trim().is_empty() {
        return Ok(placeholder(request, FileKind::Pdf, "[PDF document]"));
    }

    let lines: Vec<PreviewLine> = content
        .lines()
        .take(content_rows(request.height))
        .map(|line| PreviewLine::plain(clip(line, request.width)))
        .collect();
    Ok(PreviewResult::success(request.id, FileKind::PdfText).with_lines(lines))
}

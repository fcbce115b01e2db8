//! HEIC previews: ordered chain of conversion tools.
//!
//! `sips` first (the platform-native converter on macOS), then
//! `heif-convert`, then ImageMagick's `magick`. First success wins; when the
//! whole chain fails the preview degrades to a placeholder.

use super::{placeholder, thumbnail_target, GeneratorContext};
use crate::exec::run_tool;
use anyhow::Result;
use shoal_protocol::{FileKind, PreviewRequest, PreviewResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

type Converter = fn(&Path, &GeneratorContext) -> Result<PathBuf>;

const CONVERTERS: &[(&str, Converter)] = &[
    ("sips", convert_sips),
    ("heif-convert", convert_heif_convert),
    ("magick", convert_magick),
];

pub fn render(request: &PreviewRequest, ctx: &GeneratorContext) -> Result<PreviewResult> {
    for (name, convert) in CONVERTERS {
        match convert(&request.path, ctx) {
            Ok(thumb) => {
                return Ok(PreviewResult::success(request.id, FileKind::Heic).with_thumbnail(thumb))
            }
            Err(e) => debug!("{} failed for {}: {:#}", name, request.path.display(), e),
        }
    }
    Ok(placeholder(request, FileKind::Heic, "[HEIC image]"))
}

fn convert_sips(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "heic", "jpg")?;
    let args: &[&OsStr] = &[
        "-s".as_ref(),
        "format".as_ref(),
        "jpeg".as_ref(),
        path.as_os_str(),
        "--out".as_ref(),
        target.as_os_str(),
    ];
    run_converter("sips", args, &target, ctx)
}

fn convert_heif_convert(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "heic", "jpg")?;
    let args: &[&OsStr] = &[path.as_os_str(), target.as_os_str()];
    run_converter("heif-convert", args, &target, ctx)
}

fn convert_magick(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "heic", "jpg")?;
    let args: &[&OsStr] = &[path.as_os_str(), target.as_os_str()];
    run_converter("magick", args, &target, ctx)
}

fn run_converter(
    tool: &str,
    args: &[&OsStr],
    target: &Path,
    ctx: &GeneratorContext,
) -> Result<PathBuf> {
    if let Err(e) = run_tool(tool, args, ctx.tool_timeout) {
        let _ = std::fs::remove_file(target);
        return Err(e.into());
    }
    if std::fs::metadata(target).map(|m| m.len()).unwrap_or(0) == 0 {
        let _ = std::fs::remove_file(target);
        anyhow::bail!("{tool} produced no output");
    }
    Ok(target.to_path_buf())
}

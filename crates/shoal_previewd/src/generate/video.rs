//! Video previews: ffprobe metadata plus a single-frame ffmpeg thumbnail.
//!
//! Both tool invocations run under the configured budget. A failed probe
//! yields an empty metadata map, not an error; a failed thumbnail degrades
//! to a centered placeholder with whatever metadata the probe produced.

use super::{placeholder, thumbnail_target, GeneratorContext};
use crate::exec::run_tool;
use anyhow::{bail, Result};
use shoal_protocol::{FileKind, PreviewRequest, PreviewResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn render(request: &PreviewRequest, ctx: &GeneratorContext) -> Result<PreviewResult> {
    let metadata = probe_metadata(&request.path, ctx);

    match extract_thumbnail(&request.path, ctx) {
        Ok(thumb) => Ok(PreviewResult::success(request.id, FileKind::Video)
            .with_thumbnail(thumb)
            .with_metadata(metadata)),
        Err(e) => {
            debug!("Thumbnail for {} failed: {:#}", request.path.display(), e);
            Ok(placeholder(request, FileKind::Video, "[Video file]").with_metadata(metadata))
        }
    }
}

/// Probe duration/resolution/codec/fps/audio via ffprobe. Any failure along
/// the way produces an empty map.
fn probe_metadata(path: &Path, ctx: &GeneratorContext) -> BTreeMap<String, String> {
    let args: &[&std::ffi::OsStr] = &[
        "-v".as_ref(),
        "quiet".as_ref(),
        "-print_format".as_ref(),
        "json".as_ref(),
        "-show_format".as_ref(),
        "-show_streams".as_ref(),
        path.as_os_str(),
    ];
    let output = match run_tool("ffprobe", args, ctx.tool_timeout) {
        Ok(output) => output,
        Err(e) => {
            debug!("ffprobe failed for {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&output) {
        Ok(probe) => metadata_from_probe(&probe),
        Err(e) => {
            debug!("Unparseable ffprobe output for {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

fn extract_thumbnail(path: &Path, ctx: &GeneratorContext) -> Result<PathBuf> {
    let target = thumbnail_target(&ctx.thumbnail_dir, "video", "jpg")?;
    let args: &[&std::ffi::OsStr] = &[
        "-y".as_ref(),
        "-loglevel".as_ref(),
        "error".as_ref(),
        "-ss".as_ref(),
        "00:00:01".as_ref(),
        "-i".as_ref(),
        path.as_os_str(),
        "-frames:v".as_ref(),
        "1".as_ref(),
        "-vf".as_ref(),
        "scale='min(960,iw)':-2".as_ref(),
        target.as_os_str(),
    ];
    if let Err(e) = run_tool("ffmpeg", args, ctx.tool_timeout) {
        let _ = std::fs::remove_file(&target);
        return Err(e.into());
    }
    // ffmpeg can exit zero without producing a frame (e.g. empty stream).
    if std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0) == 0 {
        let _ = std::fs::remove_file(&target);
        bail!("ffmpeg produced no frame for {}", path.display());
    }
    Ok(target)
}

/// Flatten the interesting parts of an ffprobe report into key/value pairs.
fn metadata_from_probe(probe: &serde_json::Value) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Some(duration) = probe
        .pointer("/format/duration")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
    {
        metadata.insert("duration".to_string(), format_duration(duration));
    }

    let streams = probe
        .get("streams")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    if let Some(video) = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("video"))
    {
        if let (Some(w), Some(h)) = (
            video.get("width").and_then(|v| v.as_u64()),
            video.get("height").and_then(|v| v.as_u64()),
        ) {
            metadata.insert("resolution".to_string(), format!("{w}x{h}"));
        }
        if let Some(codec) = video.get("codec_name").and_then(|v| v.as_str()) {
            metadata.insert("codec".to_string(), codec.to_string());
        }
        if let Some(fps) = video
            .get("r_frame_rate")
            .and_then(|v| v.as_str())
            .and_then(parse_frame_rate)
        {
            metadata.insert("fps".to_string(), format!("{fps:.2}"));
        }
    }

    if let Some(audio) = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|v| v.as_str()) == Some("audio"))
    {
        if let Some(codec) = audio.get("codec_name").and_then(|v| v.as_str()) {
            metadata.insert("audio_codec".to_string(), codec.to_string());
        }
        if let Some(channels) = audio.get("channels").and_then(|v| v.as_u64()) {
            metadata.insert("audio_channels".to_string(), channels.to_string());
        }
    }

    metadata
}

/// ffprobe reports rates as a ratio, e.g. `30000/1001`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

//! Directory previews: sorted listing of immediate children.

use super::{clip, content_rows};
use anyhow::{Context, Result};
use shoal_protocol::{FileKind, PreviewLine, PreviewRequest, PreviewResult};
use std::fs;

pub fn render(request: &PreviewRequest) -> Result<PreviewResult> {
    let mut names: Vec<String> = fs::read_dir(&request.path)
        .with_context(|| format!("Failed to list {}", request.path.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let lines: Vec<PreviewLine> = names
        .into_iter()
        .take(content_rows(request.height))
        .map(|name| PreviewLine::plain(clip(&name, request.width)))
        .collect();

    Ok(PreviewResult::success(request.id, FileKind::Directory).with_lines(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_protocol::RequestId;
    use std::fs::File;

    fn request_for(path: &std::path::Path, width: u16, height: u16) -> PreviewRequest {
        PreviewRequest::new(RequestId::new(1), path, Some(FileKind::Directory), width, height)
    }

    #[test]
    fn listing_is_sorted_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "c"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let result = render(&request_for(dir.path(), 80, 5)).unwrap();
        assert!(result.is_success());
        assert_eq!(result.file_type, Some(FileKind::Directory));

        let lines = result.lines.unwrap();
        assert_eq!(lines.len(), 3);
        let texts: Vec<&str> = lines
            .iter()
            .map(|line| match line {
                PreviewLine::Styled { text, .. } => text.as_str(),
                other => panic!("unexpected line {other:?}"),
            })
            .collect();
        assert_eq!(texts, ["a.txt", "b.txt", "c"]);
        assert!(texts.iter().all(|t| t.chars().count() <= 80));
    }

    #[test]
    fn entries_beyond_the_pane_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            File::create(dir.path().join(format!("file-{i:02}"))).unwrap();
        }

        // height 5 leaves 3 content rows
        let result = render(&request_for(dir.path(), 80, 5)).unwrap();
        assert_eq!(result.lines.unwrap().len(), 3);
    }

    #[test]
    fn names_are_clipped_to_width() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a-rather-long-file-name.txt")).unwrap();

        let result = render(&request_for(dir.path(), 10, 5)).unwrap();
        match &result.lines.unwrap()[0] {
            PreviewLine::Styled { text, .. } => assert_eq!(text, "a-rather-l"),
            other => panic!("unexpected line {other:?}"),
        }
    }

    #[test]
    fn unreadable_directory_is_an_error() {
        let request = request_for(std::path::Path::new("/definitely/not/a/dir/7f3a"), 80, 5);
        assert!(render(&request).is_err());
    }
}

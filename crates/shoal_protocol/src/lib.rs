//! Wire protocol for the Shoal preview subsystem.
//!
//! The UI-side client and the preview server talk over a local Unix domain
//! socket. Framing is line-delimited JSON: every message is exactly one JSON
//! object followed by `\n`, and no encoded message contains a raw newline
//! (compact JSON escapes all control characters, so encoding is total).
//!
//! Message shapes, dispatched by the `type` tag:
//!
//! | type       | fields                                                      |
//! |------------|-------------------------------------------------------------|
//! | `request`  | `id`, `path`, `file_type?`, `width`, `height`, `timestamp` |
//! | `cancel`   | `id`                                                        |
//! | `shutdown` | (none)                                                      |
//! | `result`   | `id`, `status`, `file_type?`, `lines?`, `thumbnail_path?`, `metadata?`, `error?` |
//!
//! Optional result fields are omitted when absent, never emitted as `null`.

pub mod error;
pub mod types;

pub use error::{ProtocolError, Result};
pub use types::{
    FileKind, Message, PreviewLine, PreviewRequest, PreviewResult, RequestId, Segment, Status,
    TextAttr,
};

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line (with or without its trailing newline) into a message.
pub fn decode_line(line: &str) -> Result<Message> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn request_roundtrip_preserves_all_fields() {
        let request = PreviewRequest::new(
            RequestId::new(42),
            "/tmp/movie.mkv",
            Some(FileKind::Video),
            120,
            40,
        );
        let line = encode_line(&Message::Request(request.clone())).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        match decode_line(&line).unwrap() {
            Message::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn result_roundtrip_preserves_id_status_kind() {
        let result = PreviewResult::success(RequestId::new(7), FileKind::Directory)
            .with_lines(vec![PreviewLine::plain("a.txt"), PreviewLine::plain("b")]);
        let line = encode_line(&Message::Result(result.clone())).unwrap();

        match decode_line(&line).unwrap() {
            Message::Result(decoded) => {
                assert_eq!(decoded.id, RequestId::new(7));
                assert_eq!(decoded.status, Status::Success);
                assert_eq!(decoded.file_type, Some(FileKind::Directory));
                assert_eq!(decoded, result);
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn absent_fields_are_omitted_not_null() {
        let line = encode_line(&Message::Result(PreviewResult::cancelled(RequestId::new(3))))
            .unwrap();
        assert!(!line.contains("null"), "unexpected null in {line}");
        assert!(!line.contains("lines"));
        assert!(!line.contains("thumbnail_path"));
        assert!(!line.contains("metadata"));
        assert!(!line.contains("error"));
    }

    #[test]
    fn type_tags_match_the_wire_contract() {
        let cancel = encode_line(&Message::Cancel {
            id: RequestId::new(9),
        })
        .unwrap();
        assert!(cancel.contains(r#""type":"cancel""#));
        assert!(cancel.contains(r#""id":9"#));

        let shutdown = encode_line(&Message::Shutdown).unwrap();
        assert_eq!(shutdown.trim_end(), r#"{"type":"shutdown"}"#);
    }

    #[test]
    fn file_kinds_use_snake_case() {
        let request = PreviewRequest::new(
            RequestId::new(1),
            PathBuf::from("/doc.pdf"),
            Some(FileKind::PdfText),
            10,
            10,
        );
        let line = encode_line(&Message::Request(request)).unwrap();
        assert!(line.contains(r#""file_type":"pdf_text""#));
    }

    #[test]
    fn styled_and_code_lines_decode_distinctly() {
        let lines = vec![
            PreviewLine::centered("[Binary file]"),
            PreviewLine::styled("# Title", vec![TextAttr::Bold]),
            PreviewLine::Code {
                segments: vec![
                    Segment { ch: 'f', color: 114 },
                    Segment { ch: 'n', color: 114 },
                ],
            },
        ];
        let result =
            PreviewResult::success(RequestId::new(5), FileKind::Code).with_lines(lines.clone());
        let line = encode_line(&Message::Result(result)).unwrap();

        match decode_line(&line).unwrap() {
            Message::Result(decoded) => assert_eq!(decoded.lines, Some(lines)),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn result_with_metadata_and_thumbnail_roundtrips() {
        let mut metadata = BTreeMap::new();
        metadata.insert("duration".to_string(), "0:01:30".to_string());
        metadata.insert("resolution".to_string(), "1920x1080".to_string());
        let result = PreviewResult::success(RequestId::new(11), FileKind::Video)
            .with_thumbnail("/tmp/shoal/thumbs/clip.jpg")
            .with_metadata(metadata.clone());

        let line = encode_line(&Message::Result(result.clone())).unwrap();
        match decode_line(&line).unwrap() {
            Message::Result(decoded) => {
                assert_eq!(decoded.metadata, Some(metadata));
                assert_eq!(
                    decoded.thumbnail_path,
                    Some(PathBuf::from("/tmp/shoal/thumbs/clip.jpg"))
                );
                assert_eq!(decoded, result);
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn malformed_lines_are_reported_as_protocol_errors() {
        assert!(matches!(
            decode_line("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_line(r#"{"type":"nonsense"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn status_predicates() {
        let id = RequestId::new(1);
        assert!(PreviewResult::success(id, FileKind::Text).is_success());
        assert!(PreviewResult::error(id, "boom").is_error());
        assert!(PreviewResult::cancelled(id).is_cancelled());
    }
}

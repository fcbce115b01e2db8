//! Value objects carried on the preview wire.
//!
//! Everything here is plain data: construction never fails, nothing is
//! mutated after construction, and every optional field is omitted from the
//! encoded form when absent (never emitted as `null`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque request token. Allocated by the client, unique per client process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File category a preview is generated for.
///
/// `PdfText` and `Binary` only ever appear in results: they are downgrade
/// classifications made by the server, not hints a client would send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Directory,
    Text,
    Code,
    Markdown,
    Video,
    Pdf,
    PdfText,
    Heic,
    Image,
    Binary,
}

/// Outcome of a preview request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
    Cancelled,
}

/// Renderer-agnostic line attribute. The UI decides how each maps onto its
/// own styling (curses attributes, colors, whatever).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAttr {
    Bold,
    Code,
    List,
}

/// One colored character of a syntax-highlighted line. `color` is an
/// xterm-256 palette index derived from the highlighter's RGB foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "char")]
    pub ch: char,
    pub color: u8,
}

/// One render line of a preview. Either attributed text or, for highlighted
/// code, a run of per-character colored segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewLine {
    Code {
        segments: Vec<Segment>,
    },
    Styled {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attrs: Vec<TextAttr>,
        #[serde(default, skip_serializing_if = "is_false")]
        center: bool,
    },
}

impl PreviewLine {
    /// Plain text line, no attributes.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::styled(text, Vec::new())
    }

    pub fn styled(text: impl Into<String>, attrs: Vec<TextAttr>) -> Self {
        Self::Styled {
            text: text.into(),
            attrs,
            center: false,
        }
    }

    /// Horizontally centered placeholder line, e.g. `[Video file]`.
    pub fn centered(text: impl Into<String>) -> Self {
        Self::Styled {
            text: text.into(),
            attrs: Vec::new(),
            center: true,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Client-issued description of what preview to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub id: RequestId,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    pub width: u16,
    pub height: u16,
    /// Advisory creation time (unix seconds). Never used for ordering.
    #[serde(default)]
    pub timestamp: i64,
}

impl PreviewRequest {
    pub fn new(
        id: RequestId,
        path: impl Into<PathBuf>,
        file_type: Option<FileKind>,
        width: u16,
        height: u16,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            id,
            path: path.into(),
            file_type,
            width,
            height,
            timestamp,
        }
    }
}

/// Server-produced preview content or failure, correlated to a request by id.
///
/// `thumbnail_path` points at a file owned by the server until consumed; the
/// consumer must delete it after use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub id: RequestId,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<PreviewLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewResult {
    pub fn success(id: RequestId, file_type: FileKind) -> Self {
        Self {
            id,
            status: Status::Success,
            file_type: Some(file_type),
            lines: None,
            thumbnail_path: None,
            metadata: None,
            error: None,
        }
    }

    pub fn error(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::Error,
            file_type: None,
            lines: None,
            thumbnail_path: None,
            metadata: None,
            error: Some(message.into()),
        }
    }

    pub fn cancelled(id: RequestId) -> Self {
        Self {
            id,
            status: Status::Cancelled,
            file_type: None,
            lines: None,
            thumbnail_path: None,
            metadata: None,
            error: None,
        }
    }

    pub fn with_lines(mut self, lines: Vec<PreviewLine>) -> Self {
        self.lines = Some(lines);
        self
    }

    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Status::Cancelled
    }
}

/// Message envelope. One JSON object per line on the wire, dispatched by the
/// `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Request(PreviewRequest),
    Cancel { id: RequestId },
    Shutdown,
    Result(PreviewResult),
}

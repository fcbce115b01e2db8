use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
///
/// Both endpoints treat a malformed line as droppable: it is logged and
/// discarded, never fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not a valid JSON message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

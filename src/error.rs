use thiserror::Error;

/// Error kinds for the wire/policy/store core. See spec §7 for the
/// disposition of each kind — most never escape the module that raises them.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("handshake prefix did not match the expected header/padding")]
    MalformedHandshake,

    #[error("frame length {0} exceeds MAX_FRAME")]
    OversizeFrame(u32),

    #[error("frame length {0} is not allowed (must be 1..=MAX_FRAME)")]
    BadLength(u32),

    #[error("payload for message type {0:?} had the wrong size: expected {1}, got {2}")]
    ShortPayload(crate::wire::MessageType, usize, usize),

    #[error("piece index {0} is out of range")]
    OutOfRangeIndex(u32),

    #[error("piece {index} has unexpected size: expected {expected}, got {got}")]
    SizeMismatch {
        index: u32,
        expected: usize,
        got: usize,
    },

    #[error("connection attempt to {0} failed after retries")]
    ConnectFailure(String),

    #[error("handshake did not complete within the timeout")]
    HandshakeTimeout,

    #[error("read error: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("write error: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("cannot reconstruct: not all pieces are present yet")]
    IncompleteData,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

use serde::Serialize;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Byte source exhausted while decoding a required field. Always indicates
    /// either a truncated record or a schema/data mismatch.
    #[error("not enough bytes: wanted {wanted}, {available} available")]
    Underflow { wanted: usize, available: usize },

    /// A record declared more payload bytes than remain in the stream.
    #[error("truncated record: declared {declared} bytes, {available} available")]
    Truncated { declared: usize, available: usize },

    /// The dictionary is internally inconsistent. Raised once when the
    /// registry is built, never per-record.
    #[error("schema error: {0}")]
    Schema(String),
}

/// A recoverable per-record decode fault.
///
/// Faults ride on the decoded record rather than aborting the run so a caller
/// can choose to keep, log, or drop the record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum Fault {
    #[error("unknown packet kind {tag}")]
    UnknownPacketKind { tag: u32 },
    #[error("id {id} not present in dictionary")]
    UnknownId { id: u32 },
    #[error("decoded {decoded} bytes of a {declared} byte record")]
    SizeMismatch { decoded: usize, declared: usize },
    #[error("payload exhausted: wanted {wanted}, {available} available")]
    Underflow { wanted: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

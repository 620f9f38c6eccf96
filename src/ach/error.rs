use thiserror::Error;

#[derive(Debug, Error)]
pub enum AchError {
    #[error("Malformed ACH record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("ACH file has no file header")]
    MissingFileHeader,

    #[error("ACH file has no file control")]
    MissingFileControl,

    #[error("Record outside of a batch at line {0}")]
    OrphanRecord(usize),

    #[error("Invalid routing number: {0}")]
    InvalidRoutingNumber(String),

    #[error("Batch {batch} destination mismatch: {got}, file header has {want}")]
    DestinationMismatch {
        batch: u32,
        got: String,
        want: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AchError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        AchError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

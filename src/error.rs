/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced while decoding inbound payloads.
///
/// Reconciliation itself never fails: references to ids the local view does
/// not hold are benign no-ops, reported as `false` by the reducers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("Request was not successful: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

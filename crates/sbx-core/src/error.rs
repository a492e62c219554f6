use thiserror::Error;

pub type SbxResult<T> = Result<T, SbxError>;

#[derive(Debug, Error)]
pub enum SbxError {
    /// A catalog or transfer endpoint answered outside the 2xx class.
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    /// Connect/read failure before any status line was seen.
    #[error("network error: {0}")]
    Network(String),

    #[error("too many redirects (gave up after {0} hops)")]
    TooManyRedirects(u32),

    #[error("download of {url} failed after {attempts} attempts")]
    DownloadExhausted { url: String, attempts: u32 },

    /// Response body did not match the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Peripheral link failure (scan timeout, GATT error, missing channels).
    #[error("link error: {0}")]
    Link(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SbxError {
    /// True when retrying later could plausibly succeed (network-class
    /// failures); false for contract violations like a malformed body.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SbxError::Status { .. }
                | SbxError::Network(_)
                | SbxError::Link(_)
                | SbxError::Io(_)
        )
    }
}

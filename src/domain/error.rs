use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("No usable link found in the input text")]
    ExtractionEmpty,

    #[error("Failed to identify content from share link: {0}")]
    IdentifyFailed(String),

    #[error("Unexpected manifest response: {0}")]
    ManifestParseFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("I/O error: {0}")]
    StreamIo(String),

    #[error("A download is already in progress")]
    Busy,

    #[error("HTTP client unavailable: {0}")]
    ClientInit(String),

    #[error("Invalid credential profile: {0}")]
    InvalidProfile(String),

    #[error("Resolved link does not look like a video: {0}")]
    NotMedia(String),
}

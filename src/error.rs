use thiserror::Error;

use crate::build::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket transport failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XOA_URL and XOA_TOKEN must be provided either as command-line options or environment variables")]
    MissingCredentials,

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("{kind} '{name}' not found")]
    ResourceNotFound { kind: &'static str, name: String },

    #[error("Image unavailable at {url}: {reason}")]
    ImageUnavailable { url: String, reason: String },

    #[error("Image conversion failed ({status}): {stderr}")]
    ConversionFailed { status: String, stderr: String },

    #[error("Disk upload failed ({status}): {body}")]
    UploadFailed { status: u16, body: String },

    #[error("Boot order can only contain 'c', 'd', or 'n' characters, got '{0}'")]
    InvalidBootOrder(String),

    #[error("Unexpected response from {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    #[error("Connection to Xen Orchestra closed")]
    ConnectionClosed,

    #[error("Remote call timed out")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Build task failed: {0}")]
    TaskFailed(String),

    #[error("[{target}] {stage} failed: {source}")]
    Pipeline {
        target: String,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Stage that terminated a pipeline, if this error came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, unwrapping a pipeline failure.
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }
}

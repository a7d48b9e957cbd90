use std::path::PathBuf;

use thiserror::Error;

/// The single error type every client operation surfaces.
///
/// Remote command failures arrive as [`ClientError::Server`] with the
/// worker's verbatim diagnostic text as the message.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request to worker failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("worker responded with {status}: {message}")]
    Server { status: u16, message: String },

    #[error("failed to read upload {path}: {source}")]
    UploadRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot derive an artifact name from {0}")]
    InvalidUploadPath(PathBuf),

    #[error("failed to write download to {path}: {source}")]
    DownloadWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ClientError {
    /// The server-supplied message when there is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}

use cubeflow_client::ClientError;
use thiserror::Error;

/// Pipeline failures. None of these are retried: a configuration error is
/// raised before any work is dispatched, and a stage failure propagates once
/// its siblings have finished.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unsupported binning factor {binning} for {context} (expected 2 or 4)")]
    Configuration { binning: u32, context: String },

    #[error("invalid cube label: {0}")]
    InvalidLabel(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

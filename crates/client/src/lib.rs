//! Controller-side client for a cubeflow worker.
//!
//! [`WorkerApi`] is the seam the pipeline orchestrator is generic over; the
//! [`WorkerClient`] implements it over HTTP. Command invocations are built
//! with [`CommandRequest`], which batch-uploads any file arguments before
//! submitting the invocation.

mod error;
mod http;
mod request;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cubeflow_proto::InvocationRequest;

pub use error::ClientError;
pub use http::WorkerClient;
pub use request::CommandRequest;

/// A named local file to place in the worker's workspace.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub path: PathBuf,
}

/// Operations a worker exposes to the controller.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Submits one command invocation and waits for it to finish.
    async fn invoke(&self, request: InvocationRequest) -> Result<(), ClientError>;

    /// Uploads a batch of local files into the workspace. The whole batch
    /// fails if any single file fails.
    async fn upload(&self, files: &[FileUpload]) -> Result<(), ClientError>;

    /// Streams a remote URL's content into a workspace artifact without
    /// touching the controller's local disk.
    async fn put_from_url(&self, url: &str, name: &str) -> Result<(), ClientError>;

    /// Downloads an artifact to a local path.
    async fn download(&self, name: &str, dest: &Path) -> Result<(), ClientError>;

    /// Deletes an artifact.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;

    /// Reads an artifact's parsed label without downloading its content.
    async fn label(&self, name: &str) -> Result<serde_json::Value, ClientError>;
}

/// Entry point for building command invocations on any [`WorkerApi`].
pub trait WorkerApiExt: WorkerApi {
    fn program(&self, name: impl Into<String>) -> CommandRequest<'_, Self> {
        CommandRequest::new(self, name)
    }
}

impl<A: WorkerApi + ?Sized> WorkerApiExt for A {}

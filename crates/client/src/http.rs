//! HTTP implementation of [`WorkerApi`] over reqwest.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use cubeflow_proto::{InvocationRequest, Message};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ClientError;
use crate::{FileUpload, WorkerApi};

/// External command runtimes are minutes, not milliseconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorkerClient {
    /// Connects to a worker at `base_url` (e.g. `http://host:8080/api/v1`)
    /// with the default generous per-call timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/files/{}", self.base_url, name)
    }

    /// Turns any non-2xx response into [`ClientError::Server`], preferring
    /// the JSON `{message}` body over the bare status code.
    async fn catch_err(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<Message>().await {
            Ok(body) => body.message,
            Err(_) => format!("server responded with {status}"),
        };
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl WorkerApi for WorkerClient {
    async fn invoke(&self, request: InvocationRequest) -> Result<(), ClientError> {
        debug!(program = %request.program, "submitting command");
        let response = self
            .http
            .post(format!("{}/commands", self.base_url))
            .json(&request)
            .send()
            .await?;
        Self::catch_err(response).await?;
        Ok(())
    }

    async fn upload(&self, files: &[FileUpload]) -> Result<(), ClientError> {
        let mut form = Form::new();
        for file in files {
            let bytes = tokio::fs::read(&file.path)
                .await
                .map_err(|source| ClientError::UploadRead {
                    path: file.path.clone(),
                    source,
                })?;
            debug!(artifact = %file.name, size = bytes.len(), "uploading file");
            form = form.part(
                file.name.clone(),
                Part::bytes(bytes).file_name(file.name.clone()),
            );
        }

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Self::catch_err(response).await?;
        Ok(())
    }

    async fn put_from_url(&self, url: &str, name: &str) -> Result<(), ClientError> {
        debug!(url, artifact = name, "piping remote content into workspace");
        let source = Self::catch_err(self.http.get(url).send().await?).await?;

        let part = Part::stream(reqwest::Body::wrap_stream(source.bytes_stream()))
            .file_name(name.to_string());
        let form = Form::new().part(name.to_string(), part);

        let response = self
            .http
            .post(format!("{}/files", self.base_url))
            .multipart(form)
            .send()
            .await?;
        Self::catch_err(response).await?;
        Ok(())
    }

    async fn download(&self, name: &str, dest: &Path) -> Result<(), ClientError> {
        let response = Self::catch_err(self.http.get(self.file_url(name)).send().await?).await?;

        let mut file =
            tokio::fs::File::create(dest)
                .await
                .map_err(|source| ClientError::DownloadWrite {
                    path: dest.to_path_buf(),
                    source,
                })?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|source| ClientError::DownloadWrite {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }
        debug!(artifact = name, dest = %dest.display(), "download complete");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let response = self.http.delete(self.file_url(name)).send().await?;
        Self::catch_err(response).await?;
        Ok(())
    }

    async fn label(&self, name: &str) -> Result<serde_json::Value, ClientError> {
        let response = self
            .http
            .get(format!("{}/label", self.file_url(name)))
            .send()
            .await?;
        let response = Self::catch_err(response).await?;
        Ok(response.json().await?)
    }
}

//! Builder for command invocations.

use std::path::PathBuf;

use cubeflow_proto::{ArgValue, InvocationRequest};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::ClientError;
use crate::{FileUpload, WorkerApi};

/// Accumulates a program name, named arguments and file uploads, then
/// submits the invocation.
///
/// File arguments are uploaded to the workspace first (the whole invocation
/// fails if any single upload fails) and their argument value becomes the
/// uploaded artifact's name. Argument order is preserved as added.
pub struct CommandRequest<'a, A: WorkerApi + ?Sized> {
    api: &'a A,
    program: String,
    args: IndexMap<String, ArgValue>,
    files: Vec<(String, PathBuf)>,
}

impl<'a, A: WorkerApi + ?Sized> CommandRequest<'a, A> {
    pub fn new(api: &'a A, program: impl Into<String>) -> Self {
        Self {
            api,
            program: program.into(),
            args: IndexMap::new(),
            files: Vec::new(),
        }
    }

    /// Adds a scalar or sequence argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Adds an argument whose value is a remote URL the worker fetches
    /// before dispatch.
    pub fn remote_arg(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.args.insert(name.into(), ArgValue::RemoteRef(url.into()));
        self
    }

    /// Adds an argument backed by a local file; the file is uploaded at send
    /// time and the argument's value becomes the uploaded name.
    pub fn file_arg(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        // placeholder keeps the argument's position in the ordered map
        self.args.insert(name.clone(), ArgValue::Scalar(String::new()));
        self.files.push((name, path.into()));
        self
    }

    pub async fn send(self) -> Result<(), ClientError> {
        let mut args = self.args;
        let mut uploads = Vec::with_capacity(self.files.len());

        for (arg_name, path) in self.files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ClientError::InvalidUploadPath(path.clone()))?;
            args.insert(arg_name, ArgValue::Scalar(file_name.clone()));
            uploads.push(FileUpload {
                name: file_name,
                path,
            });
        }

        if !uploads.is_empty() {
            self.api.upload(&uploads).await?;
        }

        debug!(program = %self.program, "sending command request");
        self.api
            .invoke(InvocationRequest::new(self.program, args))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerApiExt;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        uploads: Mutex<Vec<Vec<String>>>,
        invocations: Mutex<Vec<InvocationRequest>>,
        fail_uploads: bool,
    }

    #[async_trait]
    impl WorkerApi for RecordingApi {
        async fn invoke(&self, request: InvocationRequest) -> Result<(), ClientError> {
            self.invocations.lock().unwrap().push(request);
            Ok(())
        }

        async fn upload(&self, files: &[FileUpload]) -> Result<(), ClientError> {
            if self.fail_uploads {
                return Err(ClientError::Server {
                    status: 500,
                    message: "disk full".to_string(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push(files.iter().map(|f| f.name.clone()).collect());
            Ok(())
        }

        async fn put_from_url(&self, _url: &str, _name: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn download(&self, _name: &str, _dest: &Path) -> Result<(), ClientError> {
            Ok(())
        }

        async fn delete(&self, _name: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn label(&self, _name: &str) -> Result<serde_json::Value, ClientError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn file_args_upload_first_and_substitute_the_artifact_name() {
        let api = RecordingApi::default();

        api.program("hi2isis")
            .file_arg("from", "/data/ESP_011630_1985_RED4_0.IMG")
            .arg("to", "red4_0.cub")
            .send()
            .await
            .unwrap();

        let uploads = api.uploads.lock().unwrap();
        assert_eq!(uploads.as_slice(), &[vec!["ESP_011630_1985_RED4_0.IMG".to_string()]]);

        let invocations = api.invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        let request = &invocations[0];
        assert_eq!(request.program, "hi2isis");
        let names: Vec<&str> = request.args.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["from", "to"]);
        assert_eq!(
            request.args.get("from"),
            Some(&cubeflow_proto::WireValue::Scalar(
                "ESP_011630_1985_RED4_0.IMG".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn sequences_and_remotes_pass_through() {
        let api = RecordingApi::default();

        api.program("equalizer")
            .arg("fromlist", vec!["a.cub", "b.cub"])
            .arg("holdlist", vec!["a.cub"])
            .remote_arg("extra", "https://example.org/x.IMG")
            .send()
            .await
            .unwrap();

        let invocations = api.invocations.lock().unwrap();
        let request = &invocations[0];
        assert_eq!(request.remotes, vec!["extra".to_string()]);
        assert_eq!(
            request.args.get("fromlist"),
            Some(&cubeflow_proto::WireValue::Sequence(vec![
                "a.cub".to_string(),
                "b.cub".to_string()
            ]))
        );
    }

    #[tokio::test]
    async fn a_failed_upload_fails_the_whole_invocation() {
        let api = RecordingApi {
            fail_uploads: true,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.IMG");
        std::fs::write(&file, b"img").unwrap();

        let result = api
            .program("hi2isis")
            .file_arg("from", &file)
            .arg("to", "x.cub")
            .send()
            .await;

        assert!(matches!(result, Err(ClientError::Server { status: 500, .. })));
        assert!(api.invocations.lock().unwrap().is_empty());
    }
}

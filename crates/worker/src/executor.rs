//! Command executor: resolves a requested program against the allow-list,
//! materializes sequence and remote-URL arguments, and runs the program as a
//! subprocess rooted at the workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use cubeflow_proto::{ArgValue, InvocationRequest};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::store::{ArtifactStore, StoreError};

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unknown program: {0}")]
    UnknownProgram(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{program} failed: {diagnostic}")]
    CommandFailed { program: String, diagnostic: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Allow-list of permitted programs, mapped to absolute paths.
///
/// Built once by scanning the trusted executable directory. Resolution is the
/// only defense against arbitrary host command execution, so names carrying
/// path separators or `..` never reach the table.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, PathBuf>,
}

impl ProgramRegistry {
    pub async fn scan(dir: &Path) -> std::io::Result<Self> {
        let mut programs = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                programs.insert(name, entry.path());
            }
        }
        info!(dir = %dir.display(), programs = programs.len(), "scanned program directory");
        Ok(Self { programs })
    }

    pub fn resolve(&self, name: &str) -> Option<&Path> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        self.programs.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

pub struct CommandExecutor {
    store: Arc<ArtifactStore>,
    registry: ProgramRegistry,
    http: reqwest::Client,
}

impl CommandExecutor {
    pub fn new(store: Arc<ArtifactStore>, registry: ProgramRegistry) -> Self {
        Self {
            store,
            registry,
            http: reqwest::Client::new(),
        }
    }

    /// Runs one invocation to completion. Expected failures come back as
    /// structured errors; auxiliary artifacts (list-files, fetched remotes)
    /// are removed on every exit path. No retries happen at this layer.
    pub async fn run(&self, request: &InvocationRequest) -> Result<(), ExecError> {
        let program_path = self
            .registry
            .resolve(&request.program)
            .ok_or_else(|| ExecError::UnknownProgram(request.program.clone()))?
            .to_path_buf();

        let mut scratch: Vec<String> = Vec::new();
        let result = self
            .dispatch(&request.program, &program_path, request.arg_values(), &mut scratch)
            .await;

        for name in scratch {
            if let Err(e) = self.store.delete(&name).await {
                debug!(artifact = %name, error = %e, "scratch artifact already gone");
            }
        }

        result
    }

    async fn dispatch(
        &self,
        program: &str,
        program_path: &Path,
        args: indexmap::IndexMap<String, ArgValue>,
        scratch: &mut Vec<String>,
    ) -> Result<(), ExecError> {
        let mut cli: Vec<String> = Vec::with_capacity(args.len());

        for (name, value) in args {
            let scalar = match value {
                ArgValue::Scalar(v) => v,
                ArgValue::Sequence(values) => self.write_list_file(&values, scratch).await?,
                ArgValue::RemoteRef(url) => self.fetch_remote(&url, scratch).await?,
            };
            cli.push(format!("{name}={scalar}"));
        }

        let command_line = format!("{} {}", program, cli.join(" "));
        debug!(command = %command_line, "running command");

        let output = tokio::process::Command::new(program_path)
            .args(&cli)
            .current_dir(self.store.root())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(
                command = %command_line,
                status = %output.status,
                diagnostic = %diagnostic,
                "command failed"
            );
            return Err(ExecError::CommandFailed {
                program: program.to_string(),
                diagnostic,
            });
        }

        info!(program, "command succeeded");
        Ok(())
    }

    /// Serializes a sequence value to a list-file artifact, one element per
    /// line and in input order.
    async fn write_list_file(
        &self,
        values: &[String],
        scratch: &mut Vec<String>,
    ) -> Result<String, ExecError> {
        let name = format!("{}.lis", Uuid::new_v4());
        let mut content = String::new();
        for value in values {
            content.push_str(value);
            content.push('\n');
        }
        self.store.put(&name, content.as_bytes()).await?;
        scratch.push(name.clone());
        Ok(name)
    }

    /// Fetches a remote-flagged URL into a uniquely named temporary artifact.
    async fn fetch_remote(
        &self,
        url: &str,
        scratch: &mut Vec<String>,
    ) -> Result<String, ExecError> {
        let extension = url
            .rsplit('/')
            .next()
            .and_then(|base| base.split('?').next())
            .and_then(|base| base.rsplit_once('.').map(|(_, ext)| ext))
            .filter(|ext| !ext.is_empty() && ext.len() <= 16)
            .unwrap_or("fetched");
        let name = format!("{}.{}", Uuid::new_v4(), extension);

        debug!(url, artifact = %name, "fetching remote argument");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ExecError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ExecError::Fetch {
                url: url.to_string(),
                reason: format!("server responded with {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ExecError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        self.store.put(&name, &bytes).await?;
        scratch.push(name.clone());
        Ok(name)
    }
}

//! Worker configuration.
//!
//! All process-wide settings (workspace directory, trusted program directory,
//! bind address, artifact retention) live in one explicit config object that
//! is threaded through store and executor construction.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory holding artifacts; also the working directory of every
    /// command invocation.
    pub workspace_dir: PathBuf,

    /// Trusted directory scanned for allow-listed executables.
    pub program_dir: PathBuf,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Artifacts untouched for longer than this are removed by the sweeper.
    pub retention: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from(".work"),
            program_dir: PathBuf::from("/usr/local/isis/bin"),
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            retention: Duration::from_secs(3600 * 24),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from `CUBEFLOW_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = WorkerConfig::default();

        if let Ok(dir) = env::var("CUBEFLOW_WORKSPACE") {
            config.workspace_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("CUBEFLOW_PROGRAM_DIR") {
            config.program_dir = PathBuf::from(dir);
        }
        if let Ok(port) = env::var("CUBEFLOW_PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid("CUBEFLOW_PORT", port.clone()))?;
            config.bind_addr.set_port(port);
        }
        if let Ok(secs) = env::var("CUBEFLOW_RETENTION_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| ConfigError::Invalid("CUBEFLOW_RETENTION_SECS", secs.clone()))?;
            config.retention = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

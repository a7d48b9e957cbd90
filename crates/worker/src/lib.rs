//! Cubeflow worker: an HTTP daemon that holds a shared workspace of artifacts
//! and runs allow-listed processing programs against them on behalf of a
//! remote controller.

pub mod config;
pub mod executor;
pub mod label;
pub mod routes;
pub mod server;
pub mod store;

pub use config::WorkerConfig;
pub use executor::{CommandExecutor, ExecError, ProgramRegistry};
pub use store::{ArtifactStore, StoreError};

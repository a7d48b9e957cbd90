//! Pipeline orchestrator: composes worker command invocations into
//! multi-stage, partially-parallel workflows.
//!
//! Independent branches run under a bounded task group per fan-out point; a
//! join waits for every branch and raises the first failure only after all
//! siblings have finished. Every intermediate artifact is deleted once its
//! single consumer has produced output, so a successful run leaves exactly
//! the final product in the workspace.

pub mod channel;
pub mod fanout;
pub mod meta;
pub mod multi;
pub mod ops;
pub mod pair;
pub mod params;

mod error;

pub use channel::DetectorChannelProcessor;
pub use error::PipelineError;
pub use meta::CubeMeta;
pub use multi::MultiDetectorProcessor;
pub use pair::PairAlignment;

/// Upper bound on in-flight work per fan-out point. Branch counts in the
/// shipped workflows never exceed this, so it bounds total outstanding
/// network and process load without head-of-line blocking unrelated stages.
pub const FANOUT_LIMIT: usize = 4;

//! Two-image alignment workflow: convert a pair of already-uploaded raw
//! images to cubes, warp the second onto the first, and stack the pair.

use cubeflow_client::{WorkerApi, WorkerApiExt};
use tracing::info;

use crate::error::PipelineError;
use crate::fanout;
use crate::meta::CubeMeta;
use crate::ops::{self, unique_name, ChipPreset};

/// Aligns `secondary` onto `primary` and returns a two-band stack of them.
/// `convert_program` is the ingest command that turns one raw image into a
/// cube (for example `hi2isis`); it must take `from` and `to` arguments.
pub struct PairAlignment<'a, A: WorkerApi + ?Sized> {
    api: &'a A,
    convert_program: String,
    primary: String,
    secondary: String,
}

impl<'a, A: WorkerApi + ?Sized> PairAlignment<'a, A> {
    pub fn new(api: &'a A, convert_program: &str, primary: &str, secondary: &str) -> Self {
        Self {
            api,
            convert_program: convert_program.to_string(),
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }

    /// Runs the workflow and returns the stacked product, the only artifact
    /// left in the store.
    pub async fn process(&self) -> Result<String, PipelineError> {
        info!(primary = %self.primary, secondary = %self.secondary, "aligning image pair");

        let (primary_cube, secondary_cube) =
            fanout::join_pair(self.convert(&self.primary), self.convert(&self.secondary)).await?;

        let label = self.api.label(&primary_cube).await?;
        let primary_meta = CubeMeta::from_label(&label)?;

        let warped = ops::register_then_warp(
            self.api,
            ChipPreset::Fine,
            &secondary_cube,
            &primary_cube,
            primary_meta.dimensions(),
        )
        .await?;
        self.api.delete(&secondary_cube).await?;

        let product = ops::stack(self.api, vec![primary_cube.clone(), warped.clone()]).await?;
        self.api.delete(&primary_cube).await?;
        self.api.delete(&warped).await?;

        info!(product = %product, "pair aligned");
        Ok(product)
    }

    /// Ingest one raw image; the raw upload is consumed and removed.
    async fn convert(&self, raw: &str) -> Result<String, PipelineError> {
        let cube = unique_name("cub");
        self.api
            .program(&self.convert_program)
            .arg("from", raw)
            .arg("to", cube.as_str())
            .send()
            .await?;
        self.api.delete(raw).await?;
        Ok(cube)
    }
}

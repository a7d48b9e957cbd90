//! Single-detector channel workflow: fetch, calibrate, normalize and stitch
//! the two channel halves of one detector readout.

use cubeflow_client::{WorkerApi, WorkerApiExt};
use tracing::info;

use crate::error::PipelineError;
use crate::ops::unique_name;
use crate::{fanout, FANOUT_LIMIT};

const PDS_IMAGE_PREFIX: &str =
    "https://pdsimage2.wr.usgs.gov/Missions/Mars_Reconnaissance_Orbiter/HiRISE";

/// URL of one raw channel half in the PDS image archive.
pub fn channel_url(image_path: &str, image_id: &str, detector: &str, channel: u8) -> String {
    format!("{PDS_IMAGE_PREFIX}/{image_path}/{image_id}_{detector}_{channel}.IMG")
}

/// Turns the two raw channel halves of one detector into a single stitched,
/// calibrated cube. The halves are processed concurrently; every intermediate
/// is deleted once its successor exists, so only the stitched cube survives.
pub struct DetectorChannelProcessor<'a, A: WorkerApi + ?Sized> {
    api: &'a A,
    detector: String,
    channel_urls: [String; 2],
}

impl<'a, A: WorkerApi + ?Sized> DetectorChannelProcessor<'a, A> {
    pub fn new(api: &'a A, image_path: &str, image_id: &str, detector: &str) -> Self {
        Self {
            api,
            detector: detector.to_string(),
            channel_urls: [
                channel_url(image_path, image_id, detector, 0),
                channel_url(image_path, image_id, detector, 1),
            ],
        }
    }

    pub async fn process(&self) -> Result<String, PipelineError> {
        info!(detector = %self.detector, "processing detector channels");

        let tasks: Vec<_> = self
            .channel_urls
            .iter()
            .map(|url| self.prepare_channel(url))
            .collect();
        let halves = fanout::join_all(FANOUT_LIMIT, tasks).await?;

        let stitched = unique_name("cub");
        self.api
            .program("histitch")
            .arg("from1", halves[0].as_str())
            .arg("from2", halves[1].as_str())
            .arg("to", stitched.as_str())
            .send()
            .await?;

        for half in &halves {
            self.api.delete(half).await?;
        }

        info!(detector = %self.detector, cube = %stitched, "detector stitched");
        Ok(stitched)
    }

    /// Convert one raw half to a calibrated, normalized cube. The raw image
    /// is fetched by the worker straight from the archive.
    async fn prepare_channel(&self, url: &str) -> Result<String, PipelineError> {
        let raw_cube = unique_name("cub");
        self.api
            .program("hi2isis")
            .remote_arg("from", url)
            .arg("to", raw_cube.as_str())
            .send()
            .await?;

        self.api
            .program("spiceinit")
            .arg("from", raw_cube.as_str())
            .arg("web", "true")
            .send()
            .await?;

        let calibrated = unique_name("cub");
        self.api
            .program("hical")
            .arg("from", raw_cube.as_str())
            .arg("to", calibrated.as_str())
            .send()
            .await?;
        self.api.delete(&raw_cube).await?;

        let normalized = unique_name("cub");
        self.api
            .program("cubenorm")
            .arg("from", calibrated.as_str())
            .arg("to", normalized.as_str())
            .send()
            .await?;
        self.api.delete(&calibrated).await?;

        Ok(normalized)
    }
}

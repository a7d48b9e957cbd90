//! Multi-detector workflow: turn the four central detector readouts of one
//! observation into a single geometrically corrected, radiometrically
//! matched, color-synthesized mosaic.

use cubeflow_client::{WorkerApi, WorkerApiExt};
use tracing::info;

use crate::channel::DetectorChannelProcessor;
use crate::error::PipelineError;
use crate::meta::CubeMeta;
use crate::ops::{self, unique_name, ChipPreset};
use crate::{fanout, params, FANOUT_LIMIT};

const DETECTORS: [&str; 4] = ["RED4", "RED5", "BG12", "BG13"];

const PROJECTION: &str = "mercator";

/// Synthetic blue coefficients: `2.0 * green - 0.3 * red`.
const SYNTH_BLUE_GREEN_COEFF: f64 = 2.0;
const SYNTH_BLUE_RED_COEFF: f64 = -0.3;

/// One detector's stitched cube together with the label metadata every later
/// stage derives its parameters from.
#[derive(Debug, Clone)]
struct Channel {
    cube: String,
    meta: CubeMeta,
}

pub struct MultiDetectorProcessor<'a, A: WorkerApi + ?Sized> {
    api: &'a A,
    image_path: String,
    product_id: String,
}

impl<'a, A: WorkerApi + ?Sized> MultiDetectorProcessor<'a, A> {
    /// `pdsimage_path` is the archive path of the observation, its last
    /// segment being the product id.
    pub fn new(api: &'a A, pdsimage_path: &str) -> Self {
        let (image_path, product_id) = match pdsimage_path.rsplit_once('/') {
            Some((path, id)) => (path.to_string(), id.to_string()),
            None => (String::new(), pdsimage_path.to_string()),
        };
        Self {
            api,
            image_path,
            product_id,
        }
    }

    /// Runs the full workflow and returns the name of the final three-band
    /// mosaic, the only artifact that survives.
    pub async fn process(&self) -> Result<String, PipelineError> {
        info!(product = %self.product_id, "building multi-detector mosaic");

        let channels = self.populate_channels().await?;
        let (red4, red5) = (channels[0].clone(), channels[1].clone());
        let (bg12, bg13) = (channels[2].clone(), channels[3].clone());

        let (red4, red5, bg12, bg13) = self.align(red4, red5, bg12, bg13).await?;

        let (bg12, bg13) = self.propagate_highfreqs(&red4, &red5, bg12, bg13).await?;

        let mosaic = self.reproject_and_mosaic(red4, red5, bg12, bg13).await?;

        let product = self.synthesize_color(&mosaic.cube).await?;
        info!(product = %product, "mosaic complete");
        Ok(product)
    }

    /// Stage 1: run all four detector channel processors concurrently, then
    /// read each stitched cube's label.
    async fn populate_channels(&self) -> Result<Vec<Channel>, PipelineError> {
        let tasks: Vec<_> = DETECTORS
            .iter()
            .map(|detector| {
                let processor = DetectorChannelProcessor::new(
                    self.api,
                    &self.image_path,
                    &self.product_id,
                    detector,
                );
                async move { processor.process().await }
            })
            .collect();
        let cubes = fanout::join_all(FANOUT_LIMIT, tasks).await?;

        let label_tasks: Vec<_> = cubes.iter().map(|cube| self.read_meta(cube)).collect();
        let metas = fanout::join_all(FANOUT_LIMIT, label_tasks).await?;

        Ok(cubes
            .into_iter()
            .zip(metas)
            .map(|(cube, meta)| Channel { cube, meta })
            .collect())
    }

    async fn read_meta(&self, cube: &str) -> Result<CubeMeta, PipelineError> {
        let label = self.api.label(cube).await?;
        CubeMeta::from_label(&label)
    }

    /// Stage 2+3: rescale each BG onto its RED's geometry, then register and
    /// warp RED5 onto RED4 and each BG onto its RED.
    async fn align(
        &self,
        red4: Channel,
        red5: Channel,
        bg12: Channel,
        bg13: Channel,
    ) -> Result<(Channel, Channel, Channel, Channel), PipelineError> {
        // Rescale the lower-resolution BG cubes first, both concurrently.
        let (scaled12, scaled13) = fanout::join_pair(
            self.scale_secondary(&bg12, &red4),
            self.scale_secondary(&bg13, &red5),
        )
        .await?;
        self.api.delete(&bg12.cube).await?;
        self.api.delete(&bg13.cube).await?;
        let bg12 = Channel { cube: scaled12, meta: bg12.meta };
        let bg13 = Channel { cube: scaled13, meta: bg13.meta };

        // RED5 aligns onto RED4 before the BGs align onto their REDs, since
        // BG13's reference is the *warped* RED5.
        let warped_red5 = ops::register_then_warp(
            self.api,
            ChipPreset::Coarse,
            &red5.cube,
            &red4.cube,
            red4.meta.dimensions(),
        )
        .await?;
        self.api.delete(&red5.cube).await?;
        let red5 = Channel { cube: warped_red5, meta: red5.meta };

        let (warped12, warped13) = fanout::join_pair(
            ops::register_then_warp(
                self.api,
                ChipPreset::Fine,
                &bg12.cube,
                &red4.cube,
                red4.meta.dimensions(),
            ),
            ops::register_then_warp(
                self.api,
                ChipPreset::Fine,
                &bg13.cube,
                &red5.cube,
                red5.meta.dimensions(),
            ),
        )
        .await?;
        self.api.delete(&bg12.cube).await?;
        self.api.delete(&bg13.cube).await?;
        let bg12 = Channel { cube: warped12, meta: bg12.meta };
        let bg13 = Channel { cube: warped13, meta: bg13.meta };

        Ok((red4, red5, bg12, bg13))
    }

    /// Rescale one BG cube onto its RED's geometry and rewrite its binning
    /// label to match.
    async fn scale_secondary(
        &self,
        secondary: &Channel,
        primary: &Channel,
    ) -> Result<String, PipelineError> {
        let factor = params::scale_factor(secondary.meta.summing, primary.meta.summing);
        let (program, crop_to_fit) = if factor > 1.0 {
            ("enlarge", true)
        } else {
            ("reduce", false)
        };

        let resized = unique_name("cub");
        self.api
            .program(program)
            .arg("from", secondary.cube.as_str())
            .arg("interp", "bilinear")
            .arg("sscale", factor)
            .arg("lscale", factor)
            .arg("to", resized.as_str())
            .send()
            .await?;

        // enlarging overshoots by the distortion correction; crop back to
        // the primary's exact footprint
        let fitted = if crop_to_fit {
            let cropped = unique_name("cub");
            let crop = self
                .api
                .program("crop")
                .arg("from", resized.as_str())
                .arg("nsamples", primary.meta.samples)
                .arg("nlines", primary.meta.lines)
                .arg("to", cropped.as_str())
                .send()
                .await;
            self.api.delete(&resized).await?;
            crop?;
            cropped
        } else {
            resized
        };

        self.api
            .program("editlab")
            .arg("from", fitted.as_str())
            .arg("grpname", "Instrument")
            .arg("keyword", "Summing")
            .arg("value", primary.meta.summing)
            .send()
            .await?;

        Ok(fitted)
    }

    /// Stage 4: propagate RED high frequencies into both BG cubes. The
    /// boxcar is keyed by each BG's *original* binning.
    async fn propagate_highfreqs(
        &self,
        red4: &Channel,
        red5: &Channel,
        bg12: Channel,
        bg13: Channel,
    ) -> Result<(Channel, Channel), PipelineError> {
        let (enhanced12, enhanced13) = fanout::join_pair(
            ops::propagate_highfreq(self.api, &red4.cube, &bg12.cube, bg12.meta.summing),
            ops::propagate_highfreq(self.api, &red5.cube, &bg13.cube, bg13.meta.summing),
        )
        .await?;
        self.api.delete(&bg12.cube).await?;
        self.api.delete(&bg13.cube).await?;

        Ok((
            Channel { cube: enhanced12, meta: bg12.meta },
            Channel { cube: enhanced13, meta: bg13.meta },
        ))
    }

    /// Stage 5: stack each RED/BG pair into a tile, reproject both tiles at
    /// the binning-derived resolution, and mosaic them west-to-east.
    async fn reproject_and_mosaic(
        &self,
        red4: Channel,
        red5: Channel,
        bg12: Channel,
        bg13: Channel,
    ) -> Result<Channel, PipelineError> {
        let (tile4, tile5) = fanout::join_pair(
            ops::stack(self.api, vec![red4.cube.clone(), bg12.cube.clone()]),
            ops::stack(self.api, vec![red5.cube.clone(), bg13.cube.clone()]),
        )
        .await?;
        for consumed in [&red4.cube, &red5.cube, &bg12.cube, &bg13.cube] {
            self.api.delete(consumed).await?;
        }

        let map_file = unique_name("map");
        self.api
            .program("maptemplate")
            .arg("projection", PROJECTION)
            .arg("clat", 0.0)
            .arg("clon", 0.0)
            .arg("map", map_file.as_str())
            .send()
            .await?;

        let (mapped4, mapped5) = fanout::join_pair(
            self.reproject(&map_file, &tile4, red4.meta.summing),
            self.reproject(&map_file, &tile5, red5.meta.summing),
        )
        .await?;
        self.api.delete(&tile4).await?;
        self.api.delete(&tile5).await?;
        self.api.delete(&map_file).await?;

        // tile order implies geographic adjacency; it must reach the
        // mosaicking command unchanged
        let mapped = vec![mapped4, mapped5];
        let mosaic = ops::mosaic(self.api, &mapped, ops::SEAM_FILTER_SIZE).await?;
        for tile in &mapped {
            self.api.delete(tile).await?;
        }

        Ok(Channel { cube: mosaic, meta: red4.meta })
    }

    async fn reproject(
        &self,
        map_file: &str,
        tile: &str,
        binning: u32,
    ) -> Result<String, PipelineError> {
        let resolution = params::map_resolution(binning);
        let mapped = unique_name("cub");
        self.api
            .program("cam2map")
            .arg("from", tile)
            .arg("map", map_file)
            .arg("pixres", "mpp")
            .arg("resolution", resolution)
            .arg("to", mapped.as_str())
            .send()
            .await?;
        Ok(mapped)
    }

    /// Stage 6: synthesize a blue band from the measured red and green bands
    /// and stack the final three-band product.
    async fn synthesize_color(&self, mosaic: &str) -> Result<String, PipelineError> {
        let red_band = format!("{mosaic}+1");
        let green_band = format!("{mosaic}+2");

        let blue = ops::linear_combination(
            self.api,
            SYNTH_BLUE_GREEN_COEFF,
            &green_band,
            SYNTH_BLUE_RED_COEFF,
            &red_band,
        )
        .await?;

        let product = ops::stack(self.api, vec![red_band, green_band, blue.clone()]).await?;

        self.api.delete(mosaic).await?;
        self.api.delete(&blue).await?;

        Ok(product)
    }
}

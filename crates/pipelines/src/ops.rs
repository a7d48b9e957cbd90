//! Reusable stage operations shared by the workflows.
//!
//! Every operation returns the name of the artifact it produced and removes
//! its own scratch artifacts (registration templates, control networks,
//! intermediate ratios). Consumed *inputs* are the caller's to delete, since
//! only the caller knows when the last consumer is done.

use cubeflow_client::{WorkerApi, WorkerApiExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::params;

/// Minimum correlation for a registration match to count.
pub const REGISTRATION_TOLERANCE: f64 = 0.9;

/// Seam-blend filter size used when mosaicking.
pub const SEAM_FILTER_SIZE: u32 = 5;

/// Random unique artifact name; unrelated pipeline runs share one workspace,
/// so intermediates never use deterministic names.
pub fn unique_name(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension)
}

/// Registration chip sizing, as fixed fractions of the primary image's pixel
/// dimensions. The search chip is always twice the pattern chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipPreset {
    /// 1/64 x 1/128 pattern chip, 1/32 x 1/64 search chip.
    Coarse,
    /// 1/32 x 1/16 pattern chip, 1/16 x 1/8 search chip.
    Fine,
}

impl ChipPreset {
    fn pattern_divisors(self) -> (u32, u32) {
        match self {
            ChipPreset::Coarse => (64, 128),
            ChipPreset::Fine => (32, 16),
        }
    }

    fn search_divisors(self) -> (u32, u32) {
        let (samples, lines) = self.pattern_divisors();
        (samples / 2, lines / 2)
    }
}

/// Two-step geometric alignment: register `secondary` against `primary`,
/// producing a control network of pixel offsets, then warp `secondary` by
/// that network. Returns the warped cube; the template and control network
/// are removed before returning.
pub async fn register_then_warp<A: WorkerApi + ?Sized>(
    api: &A,
    preset: ChipPreset,
    secondary: &str,
    primary: &str,
    primary_dims: (u32, u32),
) -> Result<String, PipelineError> {
    let (psamp_div, pline_div) = preset.pattern_divisors();
    let (ssamp_div, sline_div) = preset.search_divisors();
    let (samples, lines) = primary_dims;

    debug!(secondary, primary, ?preset, "registering and warping");

    let template = unique_name("autoreg");
    api.program("autoregtemplate")
        .arg("algorithm", "MaximumCorrelation")
        .arg("tolerance", REGISTRATION_TOLERANCE)
        .arg("psamp", samples / psamp_div)
        .arg("pline", lines / pline_div)
        .arg("ssamp", samples / ssamp_div)
        .arg("sline", lines / sline_div)
        .arg("topvl", template.as_str())
        .send()
        .await?;

    let control_net = unique_name("cnet");
    let registration = api
        .program("hijitreg")
        .arg("from", secondary)
        .arg("match", primary)
        .arg("regdef", template.as_str())
        .arg("cnetfile", control_net.as_str())
        .send()
        .await;
    api.delete(&template).await?;
    registration?;

    let warped = unique_name("cub");
    let warp = api
        .program("slither")
        .arg("from", secondary)
        .arg("control", control_net.as_str())
        .arg("to", warped.as_str())
        .send()
        .await;
    api.delete(&control_net).await?;
    warp?;

    Ok(warped)
}

/// Generic per-pixel band arithmetic (`fx`): each binding maps an equation
/// variable (`f1`, `f2`, ...) to an input band.
pub async fn band_expression<A: WorkerApi + ?Sized>(
    api: &A,
    bindings: &[(&str, &str)],
    equation: &str,
) -> Result<String, PipelineError> {
    let out = unique_name("cub");
    let mut request = api.program("fx");
    for (variable, band) in bindings {
        request = request.arg(*variable, *band);
    }
    request
        .arg("equation", equation)
        .arg("to", out.as_str())
        .send()
        .await?;
    Ok(out)
}

/// Fixed per-pixel linear combination of two bands:
/// `c1 * band1 + c2 * band2`.
pub async fn linear_combination<A: WorkerApi + ?Sized>(
    api: &A,
    c1: f64,
    band1: &str,
    c2: f64,
    band2: &str,
) -> Result<String, PipelineError> {
    let sign = if c2 < 0.0 { '-' } else { '+' };
    let equation = format!("[{} * f1] {} [{} * f2]", c1, sign, c2.abs());
    band_expression(api, &[("f1", band1), ("f2", band2)], &equation).await
}

/// Per-pixel product of two bands.
pub async fn multiply<A: WorkerApi + ?Sized>(
    api: &A,
    band1: &str,
    band2: &str,
) -> Result<String, PipelineError> {
    band_expression(api, &[("f1", band1), ("f2", band2)], "f1 * f2").await
}

/// Propagates the primary band's high frequencies into the secondary: divide
/// secondary by primary, smooth the ratio with the binning-keyed boxcar,
/// multiply the smoothed ratio back onto the primary.
///
/// The boxcar lookup happens before any command is dispatched, so an
/// unsupported binning aborts the stage without side effects.
pub async fn propagate_highfreq<A: WorkerApi + ?Sized>(
    api: &A,
    primary: &str,
    secondary: &str,
    secondary_binning: u32,
) -> Result<String, PipelineError> {
    let boxcar = params::boxcar_size(secondary_binning, secondary)?;

    let ratio = unique_name("cub");
    api.program("ratio")
        .arg("numerator", secondary)
        .arg("denominator", primary)
        .arg("to", ratio.as_str())
        .send()
        .await?;

    let smoothed = unique_name("cub");
    let lowpass = api
        .program("lowpass")
        .arg("from", ratio.as_str())
        .arg("samples", boxcar)
        .arg("lines", boxcar)
        .arg("to", smoothed.as_str())
        .send()
        .await;
    api.delete(&ratio).await?;
    lowpass?;

    let enhanced = multiply(api, smoothed.as_str(), primary).await;
    api.delete(&smoothed).await?;
    enhanced
}

/// Mosaics an **ordered** set of equal-footprint cubes: photometrically
/// equalize all inputs holding the first fixed, then seam-blend. Order is
/// preserved end-to-end because seam blending assumes the geographic
/// adjacency implied by it. Inputs are left for the caller to delete.
pub async fn mosaic<A: WorkerApi + ?Sized>(
    api: &A,
    cubes: &[String],
    filter_size: u32,
) -> Result<String, PipelineError> {
    let equalized: Vec<String> = cubes.iter().map(|_| unique_name("cub")).collect();

    api.program("equalizer")
        .arg("fromlist", cubes.to_vec())
        .arg("holdlist", vec![cubes[0].clone()])
        .arg("tolist", equalized.clone())
        .send()
        .await?;

    let blended = unique_name("cub");
    let noseam = api
        .program("noseam")
        .arg("fromlist", equalized.clone())
        .arg("samples", filter_size)
        .arg("lines", filter_size)
        .arg("to", blended.as_str())
        .send()
        .await;
    for cube in &equalized {
        api.delete(cube).await?;
    }
    noseam?;

    Ok(blended)
}

/// Stacks ordered bands into one multi-band cube.
pub async fn stack<A: WorkerApi + ?Sized>(
    api: &A,
    bands: Vec<String>,
) -> Result<String, PipelineError> {
    let combined = unique_name("cub");
    api.program("cubeit")
        .arg("fromlist", bands)
        .arg("to", combined.as_str())
        .send()
        .await?;
    Ok(combined)
}

//! Stage parameters derived from upstream cube metadata.

use crate::error::PipelineError;

/// Fixed correction for optical distortion between the detector arrays,
/// applied on top of the binning ratio when rescaling a secondary channel
/// onto its primary.
pub const OPTICAL_DISTORTION_CORRECTION: f64 = 1.0006;

/// Resize ratio that maps a secondary channel onto its primary's geometry.
pub fn scale_factor(secondary_binning: u32, primary_binning: u32) -> f64 {
    f64::from(secondary_binning) / f64::from(primary_binning) * OPTICAL_DISTORTION_CORRECTION
}

/// Boxcar window for smoothing a band ratio, keyed by the secondary's
/// binning. Unsupported binning is fatal and must be raised before any
/// command is dispatched.
pub fn boxcar_size(binning: u32, context: &str) -> Result<u32, PipelineError> {
    match binning {
        2 => Ok(3),
        4 => Ok(5),
        other => Err(PipelineError::Configuration {
            binning: other,
            context: context.to_string(),
        }),
    }
}

/// Reprojection resolution in meters per pixel, keyed by binning.
///
/// Unlike [`boxcar_size`], unlisted binning values fall back to 1.0 rather
/// than failing; reprojection at a coarser resolution is still usable output.
pub fn map_resolution(binning: u32) -> f64 {
    match binning {
        1 => 0.25,
        2 => 0.5,
        4 => 1.0,
        _ => 1.0,
    }
}

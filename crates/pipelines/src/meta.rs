//! Cube metadata extracted from parsed labels.

use serde_json::Value;

use crate::error::PipelineError;

/// The label fields pipeline stages derive parameters from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeMeta {
    pub samples: u32,
    pub lines: u32,
    pub summing: u32,
}

impl CubeMeta {
    pub fn from_label(label: &Value) -> Result<Self, PipelineError> {
        Ok(Self {
            samples: u32_field(label, &["IsisCube", "Core", "Dimensions", "Samples"])?,
            lines: u32_field(label, &["IsisCube", "Core", "Dimensions", "Lines"])?,
            summing: u32_field(label, &["IsisCube", "Instrument", "Summing"])?,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.samples, self.lines)
    }
}

fn u32_field(label: &Value, path: &[&str]) -> Result<u32, PipelineError> {
    let mut value = label;
    for key in path {
        value = value
            .get(key)
            .ok_or_else(|| PipelineError::InvalidLabel(format!("missing {}", path.join("/"))))?;
    }

    match value {
        Value::String(s) => s.trim().parse().map_err(|_| {
            PipelineError::InvalidLabel(format!("{} is not an integer: {s:?}", path.join("/")))
        }),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                PipelineError::InvalidLabel(format!("{} is out of range", path.join("/")))
            }),
        other => Err(PipelineError::InvalidLabel(format!(
            "{} has unexpected type: {other}",
            path.join("/")
        ))),
    }
}

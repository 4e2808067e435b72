#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReductionError {
    #[error("data volume {0} is outside 1..=6")]
    DataVolumeOutOfRange(u8),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Row budget for one reduction kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionCount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl ReductionCount {
    #[must_use]
    pub const fn of(count: u32) -> Self {
        Self { count: Some(count) }
    }
}

/// What a visual asks for. Callers normally set a single kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionAlgorithm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<ReductionCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<ReductionCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<ReductionCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<ReductionCount>,
}

impl ReductionAlgorithm {
    #[must_use]
    pub const fn top(count: Option<u32>) -> Self {
        Self {
            top: Some(ReductionCount { count }),
            bottom: None,
            sample: None,
            window: None,
        }
    }

    #[must_use]
    pub const fn bottom(count: Option<u32>) -> Self {
        Self {
            top: None,
            bottom: Some(ReductionCount { count }),
            sample: None,
            window: None,
        }
    }

    #[must_use]
    pub const fn sample(count: Option<u32>) -> Self {
        Self {
            top: None,
            bottom: None,
            sample: Some(ReductionCount { count }),
            window: None,
        }
    }

    #[must_use]
    pub const fn window(count: Option<u32>) -> Self {
        Self {
            top: None,
            bottom: None,
            sample: None,
            window: Some(ReductionCount { count }),
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, ReductionError> {
        Ok(serde_json::from_str(input)?)
    }
}

/// Body of a wire reduction; `Count` is omitted when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCount {
    #[serde(rename = "Count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Reduction record consumed by the query service: exactly one of
/// `Top`, `Bottom`, `Sample` or `Window` at the top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataReduction {
    Top(WireCount),
    Bottom(WireCount),
    Sample(WireCount),
    Window(WireCount),
}

impl DataReduction {
    #[must_use]
    pub fn count(&self) -> Option<u32> {
        match self {
            Self::Top(body) | Self::Bottom(body) | Self::Sample(body) | Self::Window(body) => {
                body.count
            }
        }
    }
}

/// Convert an intent to its wire record.
///
/// Kinds are applied in the order top, bottom, sample, window and each one
/// present replaces the previous result, so with several kinds set the last
/// one wins.
#[must_use]
pub fn create_from(algorithm: Option<&ReductionAlgorithm>) -> Option<DataReduction> {
    let algorithm = algorithm?;
    let mut reduction = None;
    if let Some(top) = algorithm.top {
        reduction = Some(DataReduction::Top(WireCount { count: top.count }));
    }
    if let Some(bottom) = algorithm.bottom {
        reduction = Some(DataReduction::Bottom(WireCount {
            count: bottom.count,
        }));
    }
    if let Some(sample) = algorithm.sample {
        reduction = Some(DataReduction::Sample(WireCount {
            count: sample.count,
        }));
    }
    if let Some(window) = algorithm.window {
        reduction = Some(DataReduction::Window(WireCount {
            count: window.count,
        }));
    }
    reduction
}

pub fn to_wire_json(reduction: &DataReduction) -> Result<String, ReductionError> {
    Ok(serde_json::to_string(reduction)?)
}

const DATA_VOLUME_RANGE: std::ops::RangeInclusive<u8> = 1..=6;

/// Reduction intent for a whole shape: the primary (category) axis, the
/// secondary (series) axis and an overall data-volume level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionIntent {
    #[serde(default)]
    pub primary: Option<ReductionAlgorithm>,
    #[serde(default)]
    pub secondary: Option<ReductionAlgorithm>,
    #[serde(default)]
    pub data_volume: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataShapeReduction {
    #[serde(rename = "Primary", default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<DataReduction>,
    #[serde(rename = "Secondary", default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<DataReduction>,
    #[serde(rename = "DataVolume", default, skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<u8>,
}

/// Build the shape-level wire record; `Ok(None)` when nothing is requested.
pub fn create_shape_reduction(
    intent: &ReductionIntent,
) -> Result<Option<DataShapeReduction>, ReductionError> {
    if let Some(level) = intent
        .data_volume
        .filter(|level| !DATA_VOLUME_RANGE.contains(level))
    {
        return Err(ReductionError::DataVolumeOutOfRange(level));
    }

    let reduction = DataShapeReduction {
        primary: create_from(intent.primary.as_ref()),
        secondary: create_from(intent.secondary.as_ref()),
        data_volume: intent.data_volume,
    };
    if reduction == DataShapeReduction::default() {
        return Ok(None);
    }
    Ok(Some(reduction))
}

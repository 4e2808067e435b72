use serde::{Deserialize, Serialize};

use crate::SemanticExpr;

/// One end (or the midpoint) of a gradient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleColorStop {
    pub color: String,
    /// Input value pinned to this stop; when absent the stop follows the
    /// data domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<SemanticExpr>>,
}

impl RuleColorStop {
    #[must_use]
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn at(color: impl Into<String>, value: SemanticExpr) -> Self {
        Self {
            color: color.into(),
            value: Some(Box::new(value)),
        }
    }
}

/// Declarative mapping from a scalar input to a color.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillRule {
    Solid {
        color: String,
    },
    LinearGradient2 {
        min: RuleColorStop,
        max: RuleColorStop,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        null_color: Option<String>,
    },
    LinearGradient3 {
        min: RuleColorStop,
        mid: RuleColorStop,
        max: RuleColorStop,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        null_color: Option<String>,
    },
}

impl FillRule {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Solid { .. } => "solid",
            Self::LinearGradient2 { .. } => "linear_gradient2",
            Self::LinearGradient3 { .. } => "linear_gradient3",
        }
    }

    #[must_use]
    pub fn null_color(&self) -> Option<&str> {
        match self {
            Self::Solid { .. } => None,
            Self::LinearGradient2 { null_color, .. } | Self::LinearGradient3 { null_color, .. } => {
                null_color.as_deref()
            }
        }
    }
}

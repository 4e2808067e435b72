#![forbid(unsafe_code)]

use std::fmt;

use dv_expr::{FillRule, RuleColorStop, SemanticExpr};
use dv_types::Scalar;
use peniko::Color;
use thiserror::Error;

mod cache;

pub use cache::ColorAllocatorCache;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("invalid hex color '{0}'")]
    InvalidHex(String),
    #[error("{rule} stop '{stop}' has no pinned value and no data domain was supplied")]
    UnresolvedStop {
        rule: &'static str,
        stop: &'static str,
    },
}

/// Maps an input scalar to a color.
pub trait ColorAllocator: fmt::Debug {
    /// `None` when the value cannot be mapped, e.g. a missing input with no
    /// null color configured.
    fn color(&self, value: &Scalar) -> Option<Color>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidAllocator {
    color: Color,
}

impl SolidAllocator {
    #[must_use]
    pub const fn new(color: Color) -> Self {
        Self { color }
    }
}

impl ColorAllocator for SolidAllocator {
    fn color(&self, _value: &Scalar) -> Option<Color> {
        Some(self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub value: f64,
    pub color: Color,
}

impl GradientStop {
    #[must_use]
    pub const fn new(value: f64, color: Color) -> Self {
        Self { value, color }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearGradient2Allocator {
    min: GradientStop,
    max: GradientStop,
    null_color: Option<Color>,
}

impl LinearGradient2Allocator {
    #[must_use]
    pub const fn new(min: GradientStop, max: GradientStop, null_color: Option<Color>) -> Self {
        Self {
            min,
            max,
            null_color,
        }
    }
}

impl ColorAllocator for LinearGradient2Allocator {
    fn color(&self, value: &Scalar) -> Option<Color> {
        if value.is_missing() {
            return self.null_color;
        }
        let v = value.to_f64().ok()?;
        Some(interpolate(&self.min, &self.max, v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearGradient3Allocator {
    min: GradientStop,
    mid: GradientStop,
    max: GradientStop,
    null_color: Option<Color>,
}

impl LinearGradient3Allocator {
    #[must_use]
    pub const fn new(
        min: GradientStop,
        mid: GradientStop,
        max: GradientStop,
        null_color: Option<Color>,
    ) -> Self {
        Self {
            min,
            mid,
            max,
            null_color,
        }
    }
}

impl ColorAllocator for LinearGradient3Allocator {
    fn color(&self, value: &Scalar) -> Option<Color> {
        if value.is_missing() {
            return self.null_color;
        }
        let v = value.to_f64().ok()?;
        if v <= self.mid.value {
            Some(interpolate(&self.min, &self.mid, v))
        } else {
            Some(interpolate(&self.mid, &self.max, v))
        }
    }
}

/// Per-channel sRGB interpolation, clamped to the stop range.
fn interpolate(low: &GradientStop, high: &GradientStop, value: f64) -> Color {
    let span = high.value - low.value;
    let t = if span == 0.0 || !span.is_finite() {
        0.0
    } else {
        ((value - low.value) / span).clamp(0.0, 1.0)
    };
    let a = low.color.to_rgba8();
    let b = high.color.to_rgba8();
    Color::from_rgba8(
        lerp_channel(a.r, b.r, t),
        lerp_channel(a.g, b.g, t),
        lerp_channel(a.b, b.b, t),
        lerp_channel(a.a, b.a, t),
    )
}

fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    let value = f64::from(from) + (f64::from(to) - f64::from(from)) * t;
    value.round().clamp(0.0, 255.0) as u8
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(input: &str) -> Result<Color, ColorError> {
    let invalid = || ColorError::InvalidHex(input.to_owned());
    let digits = input.strip_prefix('#').ok_or_else(invalid)?;
    if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |at: usize| u8::from_str_radix(&digits[at..at + 2], 16).map_err(|_| invalid());
    let alpha = if digits.len() == 8 { channel(6)? } else { u8::MAX };
    Ok(Color::from_rgba8(channel(0)?, channel(2)?, channel(4)?, alpha))
}

/// Format as lowercase `#rrggbb`, appending alpha only when not opaque.
#[must_use]
pub fn format_hex_color(color: Color) -> String {
    let rgba = color.to_rgba8();
    if rgba.a == u8::MAX {
        format!("#{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

/// Builds allocators for fill rules. The render layer owns construction; the
/// cache only stores what this produces.
pub trait ColorAllocatorFactory {
    /// `domain` is the observed `(min, max)` of the rule's input and fills
    /// gradient stops that carry no pinned value.
    fn allocator_for(
        &self,
        rule: &FillRule,
        domain: Option<(f64, f64)>,
    ) -> Result<Box<dyn ColorAllocator>, ColorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultColorAllocatorFactory;

impl ColorAllocatorFactory for DefaultColorAllocatorFactory {
    fn allocator_for(
        &self,
        rule: &FillRule,
        domain: Option<(f64, f64)>,
    ) -> Result<Box<dyn ColorAllocator>, ColorError> {
        let kind = rule.kind_name();
        let null_color = rule.null_color().map(parse_hex_color).transpose()?;
        match rule {
            FillRule::Solid { color } => Ok(Box::new(SolidAllocator::new(parse_hex_color(color)?))),
            FillRule::LinearGradient2 { min, max, .. } => {
                let min = resolve_stop(min, domain.map(|(lo, _)| lo), kind, "min")?;
                let max = resolve_stop(max, domain.map(|(_, hi)| hi), kind, "max")?;
                Ok(Box::new(LinearGradient2Allocator::new(min, max, null_color)))
            }
            FillRule::LinearGradient3 { min, mid, max, .. } => {
                let min = resolve_stop(min, domain.map(|(lo, _)| lo), kind, "min")?;
                let max = resolve_stop(max, domain.map(|(_, hi)| hi), kind, "max")?;
                let midpoint = (min.value + max.value) / 2.0;
                let mid = resolve_stop(mid, Some(midpoint), kind, "mid")?;
                Ok(Box::new(LinearGradient3Allocator::new(
                    min, mid, max, null_color,
                )))
            }
        }
    }
}

fn resolve_stop(
    stop: &RuleColorStop,
    fallback: Option<f64>,
    rule: &'static str,
    name: &'static str,
) -> Result<GradientStop, ColorError> {
    let color = parse_hex_color(&stop.color)?;
    let pinned = stop.value.as_deref().and_then(|expr| match expr {
        SemanticExpr::Constant { value } => value.to_f64().ok(),
        _ => None,
    });
    pinned
        .or(fallback)
        .map(|value| GradientStop::new(value, color))
        .ok_or(ColorError::UnresolvedStop { rule, stop: name })
}

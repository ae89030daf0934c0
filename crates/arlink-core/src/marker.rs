//! Marker names, printed dimensions and content centering

use serde::{Deserialize, Serialize};

/// Centimetres per inch
pub const CM_PER_INCH: f32 = 2.54;

/// Scene units per centimetre
pub const SCENE_UNITS_PER_CM: f32 = 10.0;

/// Name of a physical marker as known to the tracker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerName(String);

impl MarkerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarkerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarkerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MarkerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Printed size of a marker: pixel width and height at a given resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerDimensions {
    pub width: f32,
    pub height: f32,
    pub dpi: f32,
}

/// Which marker extent drives the horizontal offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetRule {
    /// x from width, y from height
    #[default]
    WidthHeight,
    /// x and y both from height, as image planes have always been placed
    HeightHeight,
}

/// Local translation that centres content on the printed marker
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentOffset {
    pub x: f32,
    pub y: f32,
}

impl MarkerDimensions {
    pub fn new(width: f32, height: f32, dpi: f32) -> Self {
        Self { width, height, dpi }
    }

    /// Whether the dimensions can produce a finite offset
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.dpi.is_finite() && self.dpi > 0.0
    }

    /// Half of a printed extent, in scene units
    pub fn half_extent(pixels: f32, dpi: f32) -> f32 {
        (pixels / dpi * CM_PER_INCH * SCENE_UNITS_PER_CM) / 2.0
    }

    pub fn offset(&self, rule: OffsetRule) -> ContentOffset {
        let horizontal = match rule {
            OffsetRule::WidthHeight => self.width,
            OffsetRule::HeightHeight => self.height,
        };
        ContentOffset {
            x: Self::half_extent(horizontal, self.dpi),
            y: Self::half_extent(self.height, self.dpi),
        }
    }
}

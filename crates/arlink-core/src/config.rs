//! Configuration loading

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::pose::MatrixLayout;
use crate::wire::TopicConfig;

/// Top-level configuration, one TOML table per concern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub model: ModelConventions,
    #[serde(default)]
    pub topics: TopicConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// CSS selector of the canvas to draw into (web)
    #[serde(default = "default_canvas")]
    pub canvas: String,
    /// Linear RGBA; transparent so the camera feed behind the canvas shows
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Max tracing level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            canvas: default_canvas(),
            clear_color: default_clear_color(),
            fov_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            log_level: default_log_level(),
        }
    }
}

fn default_canvas() -> String {
    "#arlink-canvas".to_string()
}

fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 0.0]
}

fn default_fov() -> f32 {
    44.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    10_000.0
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseConfig {
    #[serde(default)]
    pub layout: MatrixLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_model_scale")]
    pub model_scale: f32,
    #[serde(default = "default_unit_scale")]
    pub video_scale: f32,
    #[serde(default = "default_unit_scale")]
    pub image_scale: f32,
    /// Width of video and image surfaces before scaling, in scene units
    #[serde(default = "default_surface_width")]
    pub surface_width: f32,
    /// Surface aspect ratio as [width, height]
    #[serde(default = "default_surface_aspect")]
    pub surface_aspect: [f32; 2],
    /// Turn surfaces half a turn about their vertical axis, for trackers
    /// whose marker normal points away from the camera
    #[serde(default)]
    pub flip_surface: bool,
    /// Image planes take their horizontal offset from the marker height
    #[serde(default = "default_true")]
    pub image_offset_uses_height: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            model_scale: default_model_scale(),
            video_scale: default_unit_scale(),
            image_scale: default_unit_scale(),
            surface_width: default_surface_width(),
            surface_aspect: default_surface_aspect(),
            flip_surface: false,
            image_offset_uses_height: true,
        }
    }
}

impl ContentConfig {
    /// Unscaled surface size as (width, height)
    pub fn surface_size(&self) -> (f32, f32) {
        let [aspect_w, aspect_h] = self.surface_aspect;
        let height = if aspect_w > 0.0 {
            self.surface_width * aspect_h / aspect_w
        } else {
            self.surface_width
        };
        (self.surface_width, height)
    }
}

fn default_model_scale() -> f32 {
    15.0
}

fn default_unit_scale() -> f32 {
    1.0
}

fn default_surface_width() -> f32 {
    160.0
}

fn default_surface_aspect() -> [f32; 2] {
    [16.0, 9.0]
}

fn default_true() -> bool {
    true
}

/// Node and clip names the default model processing relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConventions {
    #[serde(default = "default_root_node")]
    pub root_node: String,
    #[serde(default = "default_light")]
    pub default_light: String,
    #[serde(default = "default_primary_animation")]
    pub primary_animation: String,
}

impl Default for ModelConventions {
    fn default() -> Self {
        Self {
            root_node: default_root_node(),
            default_light: default_light(),
            primary_animation: default_primary_animation(),
        }
    }
}

fn default_root_node() -> String {
    "__root__".to_string()
}

fn default_light() -> String {
    "default light".to_string()
}

fn default_primary_animation() -> String {
    "Take 001".to_string()
}

impl ArConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Load configuration from file, falling back to defaults when it is absent
pub fn load_config(path: &Path) -> Result<ArConfig, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config = ArConfig::from_toml(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(ArConfig::default())
    }
}

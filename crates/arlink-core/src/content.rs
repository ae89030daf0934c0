//! Attachment requests as integrators describe them

use serde::{Deserialize, Serialize};

use crate::config::ContentConfig;
use crate::marker::{MarkerName, OffsetRule};

/// Kind of content parented under an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Model,
    Video,
    Image,
}

impl ContentKind {
    /// How marker dimensions turn into this content's centering offset
    pub fn offset_rule(self, config: &ContentConfig) -> OffsetRule {
        match self {
            ContentKind::Image if config.image_offset_uses_height => OffsetRule::HeightHeight,
            _ => OffsetRule::WidthHeight,
        }
    }

    pub fn default_scale(self, config: &ContentConfig) -> f32 {
        match self {
            ContentKind::Model => config.model_scale,
            ContentKind::Video => config.video_scale,
            ContentKind::Image => config.image_scale,
        }
    }
}

/// `{url, name, scale?, visibility?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub url: String,
    pub name: MarkerName,
    #[serde(default)]
    pub scale: Option<f32>,
    /// Keep the anchor visible while the marker is lost
    #[serde(default)]
    pub visibility: bool,
}

/// `{src?, name, scale?, visibility?}`; without `src` the host supplies an
/// existing video element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSpec {
    #[serde(default)]
    pub src: Option<String>,
    pub name: MarkerName,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub visibility: bool,
}

/// `{src, name, scale?, visibility?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSpec {
    pub src: String,
    pub name: MarkerName,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub visibility: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"url":"models/duck.glb","name":"pinball"}"#).unwrap();
        assert_eq!(spec.scale, None);
        assert!(!spec.visibility);

        let config = ContentConfig::default();
        assert_eq!(spec.scale.unwrap_or(ContentKind::Model.default_scale(&config)), 15.0);
        assert_eq!(ContentKind::Video.default_scale(&config), 1.0);
        assert_eq!(ContentKind::Image.default_scale(&config), 1.0);
    }

    #[test]
    fn test_video_spec_without_src() {
        let spec: VideoSpec =
            serde_json::from_str(r#"{"name":"pinball","scale":2,"visibility":true}"#).unwrap();
        assert!(spec.src.is_none());
        assert_eq!(spec.scale, Some(2.0));
        assert!(spec.visibility);
    }

    #[test]
    fn test_offset_rules() {
        let mut config = ContentConfig::default();
        assert_eq!(ContentKind::Image.offset_rule(&config), OffsetRule::HeightHeight);
        assert_eq!(ContentKind::Video.offset_rule(&config), OffsetRule::WidthHeight);
        assert_eq!(ContentKind::Model.offset_rule(&config), OffsetRule::WidthHeight);

        config.image_offset_uses_height = false;
        assert_eq!(ContentKind::Image.offset_rule(&config), OffsetRule::WidthHeight);
    }
}

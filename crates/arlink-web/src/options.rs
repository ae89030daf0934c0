//! JavaScript option objects in, result objects out

use arlink_scene::{ImageContent, ModelAnimations, ModelContent};
use bevy::prelude::Entity;
use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Entities cross into JavaScript as plain numbers
pub(crate) fn entity_id(entity: Entity) -> f64 {
    entity.to_bits() as f64
}

pub(crate) fn decode_spec<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json)
}

/// Read an options object through its JSON form
pub(crate) fn spec_from_js<T: DeserializeOwned>(options: &JsValue, what: &str) -> Result<T, JsValue> {
    let json = js_sys::JSON::stringify(options)
        .ok()
        .and_then(|json| json.as_string())
        .ok_or_else(|| error_value(format!("{} options are not an object", what)))?;

    decode_spec(&json).map_err(|e| error_value(format!("Invalid {} options: {}", what, e)))
}

pub(crate) fn error_value(message: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&message.to_string()).into()
}

/// `{mesh, root, animation}` or `{mesh, root, animations}`
#[derive(Debug, Serialize)]
pub(crate) struct ModelResult {
    pub mesh: f64,
    pub root: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animations: Option<Vec<String>>,
}

impl From<&ModelContent> for ModelResult {
    fn from(content: &ModelContent) -> Self {
        let (animation, animations) = match &content.animations {
            ModelAnimations::Primary(name) => (Some(name.clone()), None),
            ModelAnimations::All(names) => (None, Some(names.clone())),
        };
        Self {
            mesh: entity_id(content.mesh),
            root: entity_id(content.root),
            animation,
            animations,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageResult {
    pub entity: f64,
}

impl From<&ImageContent> for ImageResult {
    fn from(content: &ImageContent) -> Self {
        Self {
            entity: entity_id(content.entity),
        }
    }
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(error_value)?;
    js_sys::JSON::parse(&json)
}

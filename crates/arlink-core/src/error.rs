//! Error taxonomy shared by every arlink crate

use thiserror::Error;

/// A pose payload that cannot be turned into a transform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("pose payload has {0} elements, expected 16")]
    WrongLength(usize),
    #[error("pose element {index} is not a finite number")]
    NonFinite { index: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Failure decoding a tracker event payload
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Event {0} requires a payload")]
    MissingPayload(&'static str),
    #[error("Indexed matrix key {0:?} is not an element index")]
    BadIndex(String),
}

/// Errors surfaced to callers of the attach operations
#[derive(Error, Debug)]
pub enum ArError {
    #[error("Failed to load asset {url}: {reason}")]
    AssetLoad { url: String, reason: String },
    #[error("Model {url} has no node named {expected:?}")]
    ConventionViolation { url: String, expected: String },
    #[error("Malformed pose: {0}")]
    MalformedPose(#[from] PoseError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Renderer was dropped before the attachment completed")]
    ChannelClosed,
}

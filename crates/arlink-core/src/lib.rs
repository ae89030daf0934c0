//! arlink Core - engine-free types for binding a marker tracker to a scene
//!
//! This crate provides the pieces of arlink that do not depend on a renderer:
//! - Pose conversion from flat tracker matrices to rotation and position
//! - Marker naming, physical dimensions and content centering offsets
//! - The per-session tracker event channel
//! - Wire payloads and topic naming for the tracker's DOM events
//! - Attachment options, configuration and the error taxonomy

pub mod channel;
pub mod config;
pub mod content;
pub mod error;
pub mod marker;
pub mod pose;
pub mod wire;

pub use channel::{SessionChannel, SessionId, Subscription, TrackerEvent};
pub use config::{load_config, ArConfig, ContentConfig, ModelConventions, PoseConfig, RenderConfig};
pub use content::{ContentKind, ImageSpec, ModelSpec, VideoSpec};
pub use error::{ArError, ConfigError, PoseError, WireError};
pub use marker::{ContentOffset, MarkerDimensions, MarkerName, OffsetRule};
pub use pose::{MatrixLayout, Pose, PoseMatrix};
pub use wire::{ListenTarget, TopicConfig, TopicKind};

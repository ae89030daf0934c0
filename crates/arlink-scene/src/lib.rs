//! arlink Scene - Bevy side of the marker-to-content binding
//!
//! This crate owns everything that touches the scene graph:
//! - one anchor entity per marker, moved by tracker poses
//! - model, video and image content parented under anchors
//! - the render driver that hands the app to Bevy's runner
//! - a debug inspector overlay

pub mod anchor;
pub mod bridge;
pub mod content;
pub mod driver;
pub mod processing;
pub mod scene;
pub mod surface;
pub mod ui;

use arlink_core::{ArConfig, SessionChannel};
use bevy::prelude::*;

use crate::anchor::AnchorRegistry;
use crate::bridge::{MarkerSignal, TrackerChannel};
use crate::content::AttachQueue;

/// Configuration shared by every arlink system
#[derive(Resource, Debug, Clone)]
pub struct ArSettings(pub ArConfig);

/// Plugin wiring the tracker channel, anchors and content systems into an app.
///
/// Rendering plugins are left to the host so the same systems run in a
/// browser canvas, a desktop window or a headless test app.
pub struct ArScenePlugin {
    pub config: ArConfig,
    pub channel: SessionChannel,
    pub attach: AttachQueue,
}

impl Plugin for ArScenePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ArSettings(self.config.clone()))
            .insert_resource(TrackerChannel(self.channel.clone()))
            .insert_resource(self.attach.clone())
            .init_resource::<AnchorRegistry>()
            .add_message::<MarkerSignal>()
            .add_plugins(bridge::BridgePlugin)
            .add_plugins(content::ContentPlugin);
    }
}

// Re-export commonly used types
pub use anchor::{Anchor, TrackingState};
pub use content::{
    Attachment, Content, ImageContent, ImageOptions, ModelContent, ModelOptions, VideoContent,
    VideoOptions,
};
pub use driver::{ArScene, RenderDriver};
pub use processing::{ConventionalProcessor, ModelAnimations, ModelProcessor, PassthroughProcessor};

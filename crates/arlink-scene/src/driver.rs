//! Render driver and the host-facing scene handle

use arlink_core::{ArConfig, SessionChannel, SessionId};
use bevy::prelude::*;

use crate::content::{
    AttachQueue, Attachment, ImageContent, ImageOptions, ModelContent, ModelOptions, VideoContent,
    VideoOptions,
};
use crate::scene::SceneSetupPlugin;
use crate::ui::InspectorToggle;
use crate::ArScenePlugin;

/// Owns the app until it is handed to Bevy's runner
pub struct RenderDriver {
    app: Option<App>,
}

impl RenderDriver {
    pub fn new(app: App) -> Self {
        Self { app: Some(app) }
    }

    /// The app, while it has not been started
    pub fn app_mut(&mut self) -> Option<&mut App> {
        self.app.as_mut()
    }

    pub fn is_running(&self) -> bool {
        self.app.is_none()
    }

    /// Run the per-frame loop. Returns false when already started.
    pub fn start(&mut self) -> bool {
        let Some(mut app) = self.app.take() else {
            tracing::warn!("Render loop already started");
            return false;
        };

        tracing::info!("Starting render loop");
        let exit = app.run();
        tracing::debug!(?exit, "Runner returned");
        true
    }
}

/// A renderer bound to one tracker session.
///
/// Attach operations may be called before or after [`ArScene::start`]. They
/// subscribe to their marker at once and are taken up on the next frame, so
/// their [`Attachment`]s only resolve while the render loop runs.
pub struct ArScene {
    driver: RenderDriver,
    channel: SessionChannel,
    attach: AttachQueue,
    inspector: InspectorToggle,
    config: ArConfig,
}

impl ArScene {
    /// Full renderer drawing into `window`
    pub fn new(config: ArConfig, session: SessionId, window: Window) -> Self {
        let mut app = App::new();
        app.add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(window),
                    ..default()
                })
                .set(AssetPlugin {
                    // Content URLs are used as given
                    file_path: "".to_string(),
                    meta_check: bevy::asset::AssetMetaCheck::Never,
                    ..default()
                }),
        );

        #[cfg(debug_assertions)]
        {
            // Picking must be added before EguiPlugin so it can detect PickingPlugin
            app.add_plugins(bevy_picking::DefaultPickingPlugins)
                .add_plugins(bevy_egui::EguiPlugin::default())
                .add_plugins(crate::ui::InspectorPlugin);
        }

        Self::with_app(app, config, session)
    }

    /// Wire arlink into an app the caller has already set up
    pub fn with_app(mut app: App, config: ArConfig, session: SessionId) -> Self {
        let channel = SessionChannel::new(session);
        let attach = AttachQueue::new(channel.clone());
        let inspector = InspectorToggle::default();

        app.insert_resource(inspector.clone())
            .add_plugins(ArScenePlugin {
                config: config.clone(),
                channel: channel.clone(),
                attach: attach.clone(),
            })
            .add_plugins(SceneSetupPlugin);

        tracing::info!(session = %channel.session(), "Scene created");

        Self {
            driver: RenderDriver::new(app),
            channel,
            attach,
            inspector,
            config,
        }
    }

    pub fn session(&self) -> &SessionId {
        self.channel.session()
    }

    /// Tracker events are published here
    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    pub fn config(&self) -> &ArConfig {
        &self.config
    }

    pub fn app_mut(&mut self) -> Option<&mut App> {
        self.driver.app_mut()
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    pub fn start(&mut self) -> bool {
        self.driver.start()
    }

    /// Start the render loop unless it already runs. Returns true when this
    /// call started it.
    pub fn ensure_started(&mut self) -> bool {
        !self.driver.is_running() && self.driver.start()
    }

    /// The queue behind the `add_*` calls, for hosts that attach from async code
    pub fn attach_queue(&self) -> &AttachQueue {
        &self.attach
    }

    pub fn add_model(&self, options: ModelOptions) -> Attachment<ModelContent> {
        self.attach.model(options, &self.config)
    }

    pub fn add_video(&self, options: VideoOptions) -> Attachment<VideoContent> {
        self.attach.video(options, &self.config)
    }

    pub fn add_image(&self, options: ImageOptions) -> Attachment<ImageContent> {
        self.attach.image(options, &self.config)
    }

    /// Open the debug inspector. Release builds carry no inspector.
    pub fn inspect(&self) {
        if cfg!(debug_assertions) {
            self.inspector.open();
        } else {
            tracing::warn!("Inspector is only available in debug builds");
        }
    }

    pub fn inspector(&self) -> &InspectorToggle {
        &self.inspector
    }
}

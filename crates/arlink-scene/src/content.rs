//! Content attachers - models, video planes and image planes under anchors
//!
//! Attach requests may be queued from any callback. The request subscribes to
//! its marker immediately, so tracker events published before the next frame
//! are kept. [`process_attach_requests`] then spawns the content entity under
//! the marker's anchor. Each request resolves through an [`Attachment`] future
//! once its assets are in, which needs the render loop to be running.

use arlink_core::{
    ArConfig, ArError, ContentConfig, ContentKind, ContentOffset, ImageSpec, MarkerName, ModelSpec,
    SessionChannel, Subscription, VideoSpec,
};
use bevy::asset::LoadState;
use bevy::gltf::Gltf;
use bevy::prelude::*;
use futures::channel::oneshot;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::anchor::AnchorRegistry;
use crate::bridge::{drain_tracker_channel, MarkerSignal, MarkerSubscription, Signal};
use crate::processing::{ConventionalProcessor, ImportedModel, ImportedNode, ModelAnimations, ModelProcessor, NodeKind};
use crate::surface::{blank_video_image, emissive_material, surface_mesh, surface_transform, VideoSurface};
use crate::ArSettings;

type Reply<T> = oneshot::Sender<Result<T, ArError>>;

/// Pending result of an attach request
#[must_use = "an attachment does nothing unless polled"]
pub struct Attachment<T> {
    rx: oneshot::Receiver<Result<T, ArError>>,
}

impl<T> Attachment<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, ArError>>) -> Self {
        Self { rx }
    }

    /// Take the result if it has arrived
    pub fn try_take(&mut self) -> Option<Result<T, ArError>> {
        match self.rx.try_recv() {
            Ok(result) => result,
            Err(_) => Some(Err(ArError::ChannelClosed)),
        }
    }
}

impl<T> Future for Attachment<T> {
    type Output = Result<T, ArError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ArError::ChannelClosed)))
    }
}

/// Component on every content entity
#[derive(Component, Debug, Clone)]
pub struct Content {
    pub kind: ContentKind,
    pub marker: MarkerName,
    /// Asset URL, if the content was loaded from one
    pub source: Option<String>,
    /// Centering offset from the last marker-dimensions delivery
    pub offset: Option<ContentOffset>,
}

#[derive(Debug, Clone)]
pub struct ModelContent {
    /// Content entity holding the scene instance
    pub root: Entity,
    pub mesh: Entity,
    pub animations: ModelAnimations,
}

#[derive(Debug, Clone)]
pub struct VideoContent {
    pub entity: Entity,
    /// Texture that receives video frames
    pub image: Handle<Image>,
}

#[derive(Debug, Clone)]
pub struct ImageContent {
    pub entity: Entity,
}

#[derive(Clone)]
pub struct ModelOptions {
    pub url: String,
    pub name: MarkerName,
    pub scale: Option<f32>,
    /// Keep the anchor visible while the marker is lost
    pub visibility: bool,
    /// Replaces the conventional processing when set
    pub process: Option<Arc<dyn ModelProcessor>>,
}

impl ModelOptions {
    pub fn new(url: impl Into<String>, name: impl Into<MarkerName>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            scale: None,
            visibility: false,
            process: None,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn visible_when_lost(mut self, visible: bool) -> Self {
        self.visibility = visible;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn ModelProcessor>) -> Self {
        self.process = Some(processor);
        self
    }
}

impl From<ModelSpec> for ModelOptions {
    fn from(spec: ModelSpec) -> Self {
        Self {
            url: spec.url,
            name: spec.name,
            scale: spec.scale,
            visibility: spec.visibility,
            process: None,
        }
    }
}

/// Video plane options. Where frames come from is up to the host.
#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub name: MarkerName,
    pub scale: Option<f32>,
    pub visibility: bool,
}

impl VideoOptions {
    pub fn new(name: impl Into<MarkerName>) -> Self {
        Self {
            name: name.into(),
            scale: None,
            visibility: false,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn visible_when_lost(mut self, visible: bool) -> Self {
        self.visibility = visible;
        self
    }
}

impl From<&VideoSpec> for VideoOptions {
    fn from(spec: &VideoSpec) -> Self {
        Self {
            name: spec.name.clone(),
            scale: spec.scale,
            visibility: spec.visibility,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub src: String,
    pub name: MarkerName,
    pub scale: Option<f32>,
    pub visibility: bool,
}

impl ImageOptions {
    pub fn new(src: impl Into<String>, name: impl Into<MarkerName>) -> Self {
        Self {
            src: src.into(),
            name: name.into(),
            scale: None,
            visibility: false,
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn visible_when_lost(mut self, visible: bool) -> Self {
        self.visibility = visible;
        self
    }
}

impl From<ImageSpec> for ImageOptions {
    fn from(spec: ImageSpec) -> Self {
        Self {
            src: spec.src,
            name: spec.name,
            scale: spec.scale,
            visibility: spec.visibility,
        }
    }
}

pub(crate) enum AttachPayload {
    Model {
        url: String,
        processor: Arc<dyn ModelProcessor>,
        reply: Reply<ModelContent>,
    },
    Video {
        reply: Reply<VideoContent>,
    },
    Image {
        src: String,
        reply: Reply<ImageContent>,
    },
}

pub(crate) struct AttachRequest {
    marker: MarkerName,
    scale: f32,
    visible_when_lost: bool,
    subscription: Subscription,
    payload: AttachPayload,
}

/// Attach requests waiting for the next frame
#[derive(Resource, Clone)]
pub struct AttachQueue {
    channel: SessionChannel,
    requests: Arc<Mutex<VecDeque<AttachRequest>>>,
}

impl AttachQueue {
    pub fn new(channel: SessionChannel) -> Self {
        Self {
            channel,
            requests: Arc::default(),
        }
    }

    pub fn model(&self, options: ModelOptions, config: &ArConfig) -> Attachment<ModelContent> {
        let (reply, rx) = oneshot::channel();
        let processor = options
            .process
            .unwrap_or_else(|| Arc::new(ConventionalProcessor::new(config.model.clone())));

        self.push(AttachRequest {
            subscription: self.channel.subscribe(&options.name),
            marker: options.name,
            scale: options.scale.unwrap_or(ContentKind::Model.default_scale(&config.content)),
            visible_when_lost: options.visibility,
            payload: AttachPayload::Model {
                url: options.url,
                processor,
                reply,
            },
        });
        Attachment::new(rx)
    }

    pub fn video(&self, options: VideoOptions, config: &ArConfig) -> Attachment<VideoContent> {
        let subscription = self.channel.subscribe(&options.name);
        self.video_with_subscription(options, config, subscription)
    }

    /// Attach a video plane under a subscription taken out earlier, for hosts
    /// that must wait on their frame source before the plane may exist
    pub fn video_with_subscription(
        &self,
        options: VideoOptions,
        config: &ArConfig,
        subscription: Subscription,
    ) -> Attachment<VideoContent> {
        let subscription = if subscription.marker() == &options.name {
            subscription
        } else {
            tracing::warn!(marker = %options.name, held = %subscription.marker(), "Subscription is for another marker");
            self.channel.subscribe(&options.name)
        };

        let (reply, rx) = oneshot::channel();
        self.push(AttachRequest {
            subscription,
            marker: options.name,
            scale: options.scale.unwrap_or(ContentKind::Video.default_scale(&config.content)),
            visible_when_lost: options.visibility,
            payload: AttachPayload::Video { reply },
        });
        Attachment::new(rx)
    }

    pub fn image(&self, options: ImageOptions, config: &ArConfig) -> Attachment<ImageContent> {
        let (reply, rx) = oneshot::channel();
        self.push(AttachRequest {
            subscription: self.channel.subscribe(&options.name),
            marker: options.name,
            scale: options.scale.unwrap_or(ContentKind::Image.default_scale(&config.content)),
            visible_when_lost: options.visibility,
            payload: AttachPayload::Image { src: options.src, reply },
        });
        Attachment::new(rx)
    }

    pub fn len(&self) -> usize {
        self.requests.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, request: AttachRequest) {
        if let Ok(mut queue) = self.requests.lock() {
            queue.push_back(request);
        }
    }

    fn drain(&self) -> Vec<AttachRequest> {
        match self.requests.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Model whose glTF is still loading
#[derive(Component)]
pub struct PendingModel {
    url: String,
    handle: Handle<Gltf>,
    processor: Arc<dyn ModelProcessor>,
    reply: Option<Reply<ModelContent>>,
}

/// Model whose scene instance has been requested but not yet processed
#[derive(Component)]
pub struct SpawningModel {
    url: String,
    processor: Arc<dyn ModelProcessor>,
    animations: Vec<String>,
    reply: Option<Reply<ModelContent>>,
}

#[derive(Component)]
pub struct PendingImage {
    url: String,
    handle: Handle<Image>,
    reply: Option<Reply<ImageContent>>,
}

pub struct ContentPlugin;

impl Plugin for ContentPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (
                // New content must exist before this frame's tracker events apply
                process_attach_requests.before(drain_tracker_channel),
                poll_model_loads,
                finish_model_spawn,
                poll_image_loads,
                apply_marker_dimensions.after(drain_tracker_channel),
            ),
        );
    }
}

fn reply<T>(sender: Option<Reply<T>>, result: Result<T, ArError>) {
    if let Some(sender) = sender {
        // The caller may have dropped its attachment
        let _ = sender.send(result);
    }
}

/// Centering offset for new content from dimensions already seen for its marker
fn known_offset(
    registry: &AnchorRegistry,
    marker: &MarkerName,
    kind: ContentKind,
    config: &ContentConfig,
) -> Option<ContentOffset> {
    registry
        .dimensions(marker)
        .map(|dimensions| dimensions.offset(kind.offset_rule(config)))
}

fn placed(mut transform: Transform, offset: Option<ContentOffset>) -> Transform {
    if let Some(offset) = offset {
        transform.translation.x = offset.x;
        transform.translation.y = offset.y;
    }
    transform
}

#[allow(clippy::too_many_arguments)]
pub fn process_attach_requests(
    mut commands: Commands,
    queue: Res<AttachQueue>,
    settings: Res<ArSettings>,
    mut registry: ResMut<AnchorRegistry>,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut images: ResMut<Assets<Image>>,
) {
    let content_config = &settings.0.content;

    for request in queue.drain() {
        let anchor = registry.ensure(&mut commands, &request.marker, request.visible_when_lost);
        let subscription = MarkerSubscription::new(request.subscription, anchor);
        let marker = request.marker;

        match request.payload {
            AttachPayload::Model { url, processor, reply } => {
                tracing::info!(%marker, %url, scale = request.scale, "Loading model");
                let handle: Handle<Gltf> = asset_server.load(url.clone());
                let offset = known_offset(&registry, &marker, ContentKind::Model, content_config);
                commands.spawn((
                    Content {
                        kind: ContentKind::Model,
                        marker: marker.clone(),
                        source: Some(url.clone()),
                        offset,
                    },
                    subscription,
                    placed(Transform::from_scale(Vec3::splat(request.scale)), offset),
                    Visibility::Inherited,
                    Name::new(format!("model:{}", marker)),
                    ChildOf(anchor),
                    PendingModel {
                        url,
                        handle,
                        processor,
                        reply: Some(reply),
                    },
                ));
            }
            AttachPayload::Video { reply: sender } => {
                let image = images.add(blank_video_image());
                let offset = known_offset(&registry, &marker, ContentKind::Video, content_config);
                let entity = commands
                    .spawn((
                        Content {
                            kind: ContentKind::Video,
                            marker: marker.clone(),
                            source: None,
                            offset,
                        },
                        subscription,
                        Mesh3d(meshes.add(surface_mesh(content_config))),
                        MeshMaterial3d(materials.add(emissive_material(image.clone()))),
                        placed(surface_transform(content_config, request.scale), offset),
                        Visibility::Inherited,
                        Name::new(format!("video:{}", marker)),
                        ChildOf(anchor),
                        VideoSurface { image: image.clone() },
                    ))
                    .id();

                tracing::info!(%marker, ?entity, "Attached video surface");
                reply(Some(sender), Ok(VideoContent { entity, image }));
            }
            AttachPayload::Image { src, reply } => {
                tracing::info!(%marker, %src, "Loading image");
                let handle: Handle<Image> = asset_server.load(src.clone());
                let offset = known_offset(&registry, &marker, ContentKind::Image, content_config);
                commands.spawn((
                    Content {
                        kind: ContentKind::Image,
                        marker: marker.clone(),
                        source: Some(src.clone()),
                        offset,
                    },
                    subscription,
                    Mesh3d(meshes.add(surface_mesh(content_config))),
                    MeshMaterial3d(materials.add(emissive_material(handle.clone()))),
                    placed(surface_transform(content_config, request.scale), offset),
                    // Shown once the texture is in
                    Visibility::Hidden,
                    Name::new(format!("image:{}", marker)),
                    ChildOf(anchor),
                    PendingImage {
                        url: src,
                        handle,
                        reply: Some(reply),
                    },
                ));
            }
        }
    }
}

pub fn poll_model_loads(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    gltf_assets: Res<Assets<Gltf>>,
    mut pending: Query<(Entity, &mut PendingModel)>,
) {
    for (entity, mut model) in pending.iter_mut() {
        match asset_server.get_load_state(model.handle.id()) {
            Some(LoadState::Loaded) => {
                let Some(gltf) = gltf_assets.get(&model.handle) else {
                    continue;
                };

                let scene = gltf.default_scene.clone().or_else(|| gltf.scenes.first().cloned());
                let Some(scene) = scene else {
                    tracing::error!(url = %model.url, "Model has no scene");
                    reply(
                        model.reply.take(),
                        Err(ArError::AssetLoad {
                            url: model.url.clone(),
                            reason: "asset contains no scene".to_string(),
                        }),
                    );
                    commands.entity(entity).despawn();
                    continue;
                };

                let mut animations: Vec<String> =
                    gltf.named_animations.keys().map(|name| name.to_string()).collect();
                animations.sort();

                tracing::info!(url = %model.url, animations = animations.len(), "Model loaded");
                commands.entity(entity).remove::<PendingModel>().insert((
                    SceneRoot(scene),
                    SpawningModel {
                        url: model.url.clone(),
                        processor: model.processor.clone(),
                        animations,
                        reply: model.reply.take(),
                    },
                ));
            }
            Some(LoadState::Failed(err)) => {
                tracing::error!(url = %model.url, error = %err, "Failed to load model");
                reply(
                    model.reply.take(),
                    Err(ArError::AssetLoad {
                        url: model.url.clone(),
                        reason: err.to_string(),
                    }),
                );
                commands.entity(entity).despawn();
            }
            _ => {
                // Still loading
            }
        }
    }
}

/// Run the model processor once the scene instance's children exist
pub fn finish_model_spawn(
    mut commands: Commands,
    mut spawning: Query<(Entity, &mut SpawningModel), With<Children>>,
    children_query: Query<&Children>,
    node_query: Query<(Option<&Name>, Has<Mesh3d>, Has<PointLight>, Has<SpotLight>, Has<DirectionalLight>)>,
    mesh_query: Query<(), With<Mesh3d>>,
    mut players: Query<&mut AnimationPlayer>,
) {
    for (entity, mut model) in spawning.iter_mut() {
        let nodes = children_query
            .iter_descendants(entity)
            .filter_map(|node| {
                let (name, has_mesh, point, spot, directional) = node_query.get(node).ok()?;
                let kind = if point || spot || directional {
                    NodeKind::Light
                } else if has_mesh || has_mesh_child(node, &children_query, &mesh_query) {
                    NodeKind::Mesh
                } else {
                    NodeKind::Node
                };
                Some(ImportedNode {
                    entity: node,
                    name: name.map(|name| name.to_string()),
                    kind,
                    animation_player: players.contains(node),
                })
            })
            .collect();

        let imported = ImportedModel {
            url: model.url.clone(),
            root: entity,
            nodes,
            animations: std::mem::take(&mut model.animations),
        };

        commands.entity(entity).remove::<SpawningModel>();

        match model.processor.process(&imported) {
            Ok(processed) => {
                for player in &processed.stop_players {
                    if let Ok(mut player) = players.get_mut(*player) {
                        player.stop_all();
                    }
                }
                for discarded in &processed.discard {
                    commands.entity(*discarded).despawn();
                }

                tracing::info!(
                    url = %imported.url,
                    nodes = imported.nodes.len(),
                    discarded = processed.discard.len(),
                    "Model attached"
                );
                reply(
                    model.reply.take(),
                    Ok(ModelContent {
                        root: entity,
                        mesh: processed.mesh,
                        animations: processed.animations,
                    }),
                );
            }
            Err(err) => {
                tracing::error!(url = %imported.url, error = %err, "Model processing failed");
                reply(model.reply.take(), Err(err));
                commands.entity(entity).despawn();
            }
        }
    }
}

fn has_mesh_child(entity: Entity, children_query: &Query<&Children>, mesh_query: &Query<(), With<Mesh3d>>) -> bool {
    children_query
        .get(entity)
        .map(|children| children.iter().any(|child| mesh_query.contains(child)))
        .unwrap_or(false)
}

pub fn poll_image_loads(
    mut commands: Commands,
    asset_server: Res<AssetServer>,
    mut pending: Query<(Entity, &mut PendingImage, &mut Visibility)>,
) {
    for (entity, mut image, mut visibility) in pending.iter_mut() {
        match asset_server.get_load_state(image.handle.id()) {
            Some(LoadState::Loaded) => {
                tracing::info!(url = %image.url, "Image loaded");
                *visibility = Visibility::Inherited;
                reply(image.reply.take(), Ok(ImageContent { entity }));
                commands.entity(entity).remove::<PendingImage>();
            }
            Some(LoadState::Failed(err)) => {
                tracing::error!(url = %image.url, error = %err, "Failed to load image");
                reply(
                    image.reply.take(),
                    Err(ArError::AssetLoad {
                        url: image.url.clone(),
                        reason: err.to_string(),
                    }),
                );
                commands.entity(entity).despawn();
            }
            _ => {}
        }
    }
}

/// Recentre content on its marker. Every delivery overwrites the offset and
/// is remembered for content attached later.
pub fn apply_marker_dimensions(
    mut signals: MessageReader<MarkerSignal>,
    settings: Res<ArSettings>,
    mut registry: ResMut<AnchorRegistry>,
    mut contents: Query<(&mut Content, &mut Transform)>,
) {
    for signal in signals.read() {
        let Signal::Dimensions(dimensions) = &signal.signal else {
            continue;
        };
        registry.remember_dimensions(&signal.marker, *dimensions);

        for (mut content, mut transform) in contents.iter_mut() {
            if content.marker != signal.marker {
                continue;
            }
            let offset = dimensions.offset(content.kind.offset_rule(&settings.0.content));
            transform.translation.x = offset.x;
            transform.translation.y = offset.y;
            content.offset = Some(offset);

            tracing::debug!(marker = %signal.marker, kind = ?content.kind, x = offset.x, y = offset.y, "Applied centering offset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::headless_scene;
    use approx::assert_relative_eq;
    use arlink_core::{MarkerDimensions, TrackerEvent};
    use std::time::Duration;

    fn dimensions_event(marker: &str) -> TrackerEvent {
        TrackerEvent::MarkerDimensions {
            marker: marker.into(),
            dimensions: MarkerDimensions::new(800.0, 600.0, 300.0),
        }
    }

    /// Run frames until the attachment settles, giving asset IO time to finish
    fn settle<T>(scene: &mut crate::ArScene, attachment: &mut Attachment<T>) -> Option<Result<T, ArError>> {
        for _ in 0..200 {
            scene.app_mut().unwrap().update();
            if let Some(outcome) = attachment.try_take() {
                return Some(outcome);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_video_attaches_under_anchor() {
        let mut scene = headless_scene(ArConfig::default());
        let mut video = scene.add_video(VideoOptions::new("pinball").with_scale(2.0));
        assert!(video.try_take().is_none());

        scene.app_mut().unwrap().update();
        let content = video.try_take().unwrap().unwrap();

        let world = scene.app_mut().unwrap().world();
        let anchor = world.resource::<AnchorRegistry>().get(&"pinball".into()).unwrap();
        assert_eq!(world.get::<ChildOf>(content.entity).unwrap().parent(), anchor);
        assert_eq!(world.get::<Transform>(content.entity).unwrap().scale, Vec3::splat(2.0));
        assert_eq!(world.get::<Content>(content.entity).unwrap().kind, ContentKind::Video);
        assert_eq!(world.get::<VideoSurface>(content.entity).unwrap().image, content.image);
    }

    #[test]
    fn test_default_scales_come_from_config() {
        let mut config = ArConfig::default();
        config.content.video_scale = 3.0;
        let mut scene = headless_scene(config);
        let mut video = scene.add_video(VideoOptions::new("pinball"));
        scene.app_mut().unwrap().update();

        let content = video.try_take().unwrap().unwrap();
        let world = scene.app_mut().unwrap().world();
        assert_eq!(world.get::<Transform>(content.entity).unwrap().scale, Vec3::splat(3.0));
    }

    #[test]
    fn test_video_offset_overwritten_each_delivery() {
        let mut scene = headless_scene(ArConfig::default());
        let mut video = scene.add_video(VideoOptions::new("pinball"));
        scene.app_mut().unwrap().update();
        let content = video.try_take().unwrap().unwrap();

        scene.channel().publish(dimensions_event("pinball"));
        scene.app_mut().unwrap().update();

        let transform = *scene.app_mut().unwrap().world().get::<Transform>(content.entity).unwrap();
        assert_relative_eq!(transform.translation.x, 33.866_665, epsilon = 1e-3);
        assert_relative_eq!(transform.translation.y, 25.4, epsilon = 1e-4);

        scene.channel().publish(TrackerEvent::MarkerDimensions {
            marker: "pinball".into(),
            dimensions: MarkerDimensions::new(300.0, 300.0, 300.0),
        });
        scene.app_mut().unwrap().update();

        let world = scene.app_mut().unwrap().world();
        let transform = world.get::<Transform>(content.entity).unwrap();
        assert_relative_eq!(transform.translation.x, 12.7, epsilon = 1e-4);
        assert_relative_eq!(transform.translation.y, 12.7, epsilon = 1e-4);
        assert!(world.get::<Content>(content.entity).unwrap().offset.is_some());
    }

    #[test]
    fn test_attach_subscribes_immediately() {
        let channel = SessionChannel::new(arlink_core::SessionId::new("s1"));
        let queue = AttachQueue::new(channel.clone());
        let config = ArConfig::default();

        let _image = queue.image(ImageOptions::new("a.png", "pinball"), &config);
        assert_eq!(channel.subscriber_count(&"pinball".into()), 1);
        assert_eq!(queue.len(), 1);

        // A subscription held for the wrong marker is replaced
        let held = channel.subscribe(&"kanji".into());
        let _video = queue.video_with_subscription(VideoOptions::new("pinball"), &config, held);
        assert_eq!(channel.subscriber_count(&"pinball".into()), 2);
        assert_eq!(channel.subscriber_count(&"kanji".into()), 0);

        // Dropping queued requests releases their subscriptions
        drop(queue.drain());
        assert_eq!(channel.subscriber_count(&"pinball".into()), 0);
    }

    #[test]
    fn test_dimensions_before_first_frame_are_kept() {
        let mut scene = headless_scene(ArConfig::default());
        let mut video = scene.add_video(VideoOptions::new("pinball"));

        // Published between the attach call and the frame that spawns the plane
        assert!(scene.channel().publish(dimensions_event("pinball")));
        scene.app_mut().unwrap().update();

        let content = video.try_take().unwrap().unwrap();
        let world = scene.app_mut().unwrap().world();
        let transform = world.get::<Transform>(content.entity).unwrap();
        assert_relative_eq!(transform.translation.x, 33.866_665, epsilon = 1e-3);
        assert_relative_eq!(transform.translation.y, 25.4, epsilon = 1e-4);
        assert_eq!(scene.channel().dropped(), 0);
    }

    #[test]
    fn test_later_content_starts_centred() {
        let mut scene = headless_scene(ArConfig::default());
        let _first = scene.add_video(VideoOptions::new("pinball"));
        scene.app_mut().unwrap().update();
        scene.channel().publish(dimensions_event("pinball"));
        scene.app_mut().unwrap().update();

        // No further dimensions event for the second plane
        let mut second = scene.add_video(VideoOptions::new("pinball"));
        scene.app_mut().unwrap().update();

        let content = second.try_take().unwrap().unwrap();
        let world = scene.app_mut().unwrap().world();
        assert!(world.get::<Content>(content.entity).unwrap().offset.is_some());
        assert_relative_eq!(world.get::<Transform>(content.entity).unwrap().translation.x, 33.866_665, epsilon = 1e-3);
    }

    #[test]
    fn test_image_offset_rule() {
        let mut scene = headless_scene(ArConfig::default());
        let mut image = scene.add_image(ImageOptions::new("textures/marker.png", "pinball").with_scale(2.0));

        let content = match settle(&mut scene, &mut image) {
            Some(Ok(content)) => content,
            other => panic!("image did not load: {:?}", other.map(|r| r.map(|c| c.entity))),
        };

        scene.channel().publish(dimensions_event("pinball"));
        scene.app_mut().unwrap().update();

        let world = scene.app_mut().unwrap().world();
        assert_eq!(world.get::<Visibility>(content.entity), Some(&Visibility::Inherited));
        let transform = world.get::<Transform>(content.entity).unwrap();
        // Both axes from the marker height
        assert_relative_eq!(transform.translation.x, 25.4, epsilon = 1e-4);
        assert_relative_eq!(transform.translation.y, 25.4, epsilon = 1e-4);
        assert_eq!(transform.scale, Vec3::splat(2.0));
    }

    #[test]
    fn test_image_offset_from_width_when_configured() {
        let mut config = ArConfig::default();
        config.content.image_offset_uses_height = false;
        let mut scene = headless_scene(config);
        let mut image = scene.add_image(ImageOptions::new("textures/marker.png", "pinball"));

        let content = settle(&mut scene, &mut image).unwrap().unwrap();
        scene.channel().publish(dimensions_event("pinball"));
        scene.app_mut().unwrap().update();

        let transform = scene.app_mut().unwrap().world().get::<Transform>(content.entity).unwrap().translation;
        assert_relative_eq!(transform.x, 33.866_665, epsilon = 1e-3);
        assert_relative_eq!(transform.y, 25.4, epsilon = 1e-4);
    }

    #[test]
    fn test_dimensions_for_other_marker_ignored() {
        let mut scene = headless_scene(ArConfig::default());
        let mut video = scene.add_video(VideoOptions::new("pinball"));
        let _other = scene.add_video(VideoOptions::new("kanji"));
        scene.app_mut().unwrap().update();
        let content = video.try_take().unwrap().unwrap();

        scene.channel().publish(dimensions_event("kanji"));
        scene.app_mut().unwrap().update();

        let world = scene.app_mut().unwrap().world();
        assert_eq!(world.get::<Transform>(content.entity).unwrap().translation, Vec3::ZERO);
        assert_eq!(world.resource::<AnchorRegistry>().len(), 2);
    }

    #[test]
    fn test_failed_image_load_resolves_error() {
        let mut scene = headless_scene(ArConfig::default());
        let mut image = scene.add_image(ImageOptions::new("missing/marker.png", "pinball"));

        match settle(&mut scene, &mut image) {
            Some(Err(ArError::AssetLoad { url, reason })) => {
                assert_eq!(url, "missing/marker.png");
                // A png loader exists, so the failure is the missing file
                assert!(reason.contains("missing/marker.png"), "{reason}");
            }
            other => panic!("expected asset load error, got {:?}", other.map(|r| r.map(|c| c.entity))),
        }

        // The anchor outlives the failed content
        scene.app_mut().unwrap().update();
        let app = scene.app_mut().unwrap();
        let anchor = app.world().resource::<AnchorRegistry>().get(&"pinball".into()).unwrap();
        assert!(app.world().get_entity(anchor).is_ok());
        assert!(app.world().get::<Children>(anchor).is_none());
    }

    #[test]
    fn test_failed_model_load_leaves_anchor_empty() {
        let mut scene = headless_scene(ArConfig::default());
        let mut model = scene.add_model(ModelOptions::new("missing/duck.glb", "pinball"));

        match settle(&mut scene, &mut model) {
            Some(Err(ArError::AssetLoad { url, reason })) => {
                assert_eq!(url, "missing/duck.glb");
                assert!(reason.contains("missing/duck.glb"), "{reason}");
            }
            other => panic!("expected asset load error, got {:?}", other.map(|r| r.map(|c| c.root))),
        }

        scene.app_mut().unwrap().update();
        let app = scene.app_mut().unwrap();
        let anchor = app.world().resource::<AnchorRegistry>().get(&"pinball".into()).unwrap();
        assert!(app.world().get::<Children>(anchor).is_none());

        // The failed content's subscription went with it
        assert_eq!(scene.channel().subscriber_count(&"pinball".into()), 0);
    }

    #[test]
    fn test_model_processing_after_spawn() {
        let mut scene = headless_scene(ArConfig::default());
        let _video = scene.add_video(VideoOptions::new("pinball"));
        let app = scene.app_mut().unwrap();
        app.update();

        let (reply, rx) = oneshot::channel();
        let mut attachment = Attachment::new(rx);
        let world = app.world_mut();
        let root = world
            .spawn((
                Content {
                    kind: ContentKind::Model,
                    marker: "pinball".into(),
                    source: Some("models/duck.glb".to_string()),
                    offset: None,
                },
                Transform::default(),
                SpawningModel {
                    url: "models/duck.glb".to_string(),
                    processor: Arc::new(ConventionalProcessor::default()),
                    animations: vec!["Take 001".to_string(), "Walk".to_string()],
                    reply: Some(reply),
                },
            ))
            .id();
        let scene_node = world.spawn((Name::new("Scene"), ChildOf(root))).id();
        let mesh_node = world.spawn((Name::new("__root__"), ChildOf(scene_node))).id();
        world.spawn((Mesh3d(Handle::default()), ChildOf(mesh_node)));
        let light = world.spawn((Name::new("default light"), PointLight::default(), ChildOf(scene_node))).id();

        app.update();

        let content = attachment.try_take().unwrap().unwrap();
        assert_eq!(content.root, root);
        assert_eq!(content.mesh, mesh_node);
        assert_eq!(content.animations, ModelAnimations::Primary("Take 001".to_string()));

        let world = app.world();
        assert!(world.get_entity(light).is_err());
        assert!(world.get::<SpawningModel>(root).is_none());
    }

    #[test]
    fn test_model_without_root_is_rejected() {
        let mut scene = headless_scene(ArConfig::default());
        let app = scene.app_mut().unwrap();

        let (reply, rx) = oneshot::channel();
        let mut attachment = Attachment::new(rx);
        let world = app.world_mut();
        let root = world
            .spawn((
                Transform::default(),
                SpawningModel {
                    url: "models/plain.glb".to_string(),
                    processor: Arc::new(ConventionalProcessor::default()),
                    animations: Vec::new(),
                    reply: Some(reply),
                },
            ))
            .id();
        world.spawn((Name::new("Cube"), ChildOf(root)));

        app.update();

        assert!(matches!(
            attachment.try_take(),
            Some(Err(ArError::ConventionViolation { .. }))
        ));
        assert!(app.world().get_entity(root).is_err());
    }

    #[test]
    fn test_dropped_sender_closes_attachment() {
        let (reply, rx) = oneshot::channel::<Result<ImageContent, ArError>>();
        let mut attachment = Attachment::new(rx);
        drop(reply);
        assert!(matches!(attachment.try_take(), Some(Err(ArError::ChannelClosed))));
    }
}

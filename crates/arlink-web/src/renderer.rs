//! `ArRenderer` - the JavaScript-facing renderer handle

use arlink_core::{ArConfig, ImageSpec, MarkerName, ModelSpec, SessionId, VideoSpec};
use arlink_scene::processing::processor_by_name;
use arlink_scene::{ArScene, ImageOptions, ModelOptions, VideoOptions};
use bevy::prelude::*;
use bevy::window::CompositeAlphaMode;
use js_sys::Promise;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::HtmlVideoElement;

use crate::listeners::MarkerListeners;
use crate::options::{error_value, spec_from_js, to_js, ImageResult, ModelResult};
use crate::video::{install, video_element, wait_until_playable, VideoFeeds};

/// Renders marker-anchored content over a camera feed.
///
/// ```js
/// const renderer = new ArRenderer("#ar-canvas", trackerSessionId);
/// renderer.start();
/// const model = await renderer.addModel({ url: "models/duck.glb", name: "pinball" });
/// ```
///
/// Attach promises settle from the render loop, so every `add*` call starts
/// the loop if `start()` has not been called yet.
#[wasm_bindgen]
pub struct ArRenderer {
    scene: ArScene,
    listeners: MarkerListeners,
    feeds: VideoFeeds,
}

#[wasm_bindgen]
impl ArRenderer {
    /// `configToml` optionally overrides defaults with the same TOML the
    /// native tools read
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: String, session_id: String, config_toml: Option<String>) -> Result<ArRenderer, JsValue> {
        let mut config = match config_toml {
            Some(toml) => ArConfig::from_toml(&toml).map_err(error_value)?,
            None => ArConfig::default(),
        };
        crate::init_logging(&config.render.log_level);
        config.render.canvas = canvas.clone();

        let window = Window {
            title: "arlink".to_string(),
            canvas: Some(canvas),
            fit_canvas_to_parent: true,
            prevent_default_event_handling: false,
            // The camera feed shows through the cleared canvas
            transparent: true,
            composite_alpha_mode: CompositeAlphaMode::PreMultiplied,
            ..default()
        };

        let session = SessionId::new(session_id);
        let mut scene = ArScene::new(config.clone(), session, window);
        let listeners = MarkerListeners::new(config.topics.clone(), scene.channel().clone())?;

        let feeds = VideoFeeds::default();
        if let Some(app) = scene.app_mut() {
            install(app, feeds.clone());
        }

        tracing::info!(session = %scene.session(), canvas = %config.render.canvas, "Renderer created");
        Ok(ArRenderer {
            scene,
            listeners,
            feeds,
        })
    }

    /// Begin the per-frame render loop. Calling it again does nothing.
    pub fn start(&mut self) {
        self.scene.ensure_started();
    }

    /// `{url, name, scale?, visibility?}` → `Promise<{mesh, root, animation | animations}>`
    #[wasm_bindgen(js_name = addModel)]
    pub fn add_model(&mut self, options: JsValue) -> Promise {
        self.attach_model(options, None)
    }

    /// Like `addModel` with a named processing strategy:
    /// `"conventional"` or `"passthrough"`
    #[wasm_bindgen(js_name = addModelWith)]
    pub fn add_model_with(&mut self, options: JsValue, processor: String) -> Promise {
        self.attach_model(options, Some(processor))
    }

    /// `{src | element, name, scale?, visibility?}` → `Promise<HTMLVideoElement>`
    #[wasm_bindgen(js_name = addVideo)]
    pub fn add_video(&mut self, options: JsValue) -> Promise {
        let spec: VideoSpec = match spec_from_js(&options, "video") {
            Ok(spec) => spec,
            Err(e) => return Promise::reject(&e),
        };
        let element = js_sys::Reflect::get(&options, &JsValue::from_str("element"))
            .ok()
            .and_then(|value| value.dyn_into::<HtmlVideoElement>().ok());

        if spec.src.is_none() && element.is_none() {
            return Promise::reject(&error_value("video options need a src or an element"));
        }
        if let Err(e) = self.listen(&spec.name) {
            return Promise::reject(&e);
        }

        let video = match video_element(spec.src.as_deref(), element) {
            Ok(video) => video,
            Err(e) => return Promise::reject(&e),
        };

        // Subscribe now so dimensions sent while the video buffers are kept;
        // the plane itself only exists once the element can play
        let subscription = self.scene.channel().subscribe(&spec.name);
        let queue = self.scene.attach_queue().clone();
        let config = self.scene.config().clone();
        let options = VideoOptions::from(&spec);
        let feeds = self.feeds.clone();
        self.scene.ensure_started();

        future_to_promise(async move {
            wait_until_playable(&video).await?;
            let content = queue
                .video_with_subscription(options, &config, subscription)
                .await
                .map_err(error_value)?;
            feeds.register(content.entity, video.clone())?;
            if let Ok(playing) = video.play() {
                // Autoplay may still be refused; the surface shows the first frame
                let _ = wasm_bindgen_futures::JsFuture::from(playing).await;
            }
            tracing::info!(marker = %spec.name, "Video attached");
            Ok(video.into())
        })
    }

    /// `{src, name, scale?, visibility?}` → `Promise<{entity}>`
    #[wasm_bindgen(js_name = addImage)]
    pub fn add_image(&mut self, options: JsValue) -> Promise {
        let spec: ImageSpec = match spec_from_js(&options, "image") {
            Ok(spec) => spec,
            Err(e) => return Promise::reject(&e),
        };
        if let Err(e) = self.listen(&spec.name) {
            return Promise::reject(&e);
        }

        let attachment = self.scene.add_image(ImageOptions::from(spec));
        self.scene.ensure_started();
        future_to_promise(async move {
            let content = attachment.await.map_err(error_value)?;
            to_js(&ImageResult::from(&content))
        })
    }

    /// Open the debug inspector (debug builds only)
    pub fn inspect(&self) {
        self.scene.inspect();
    }
}

impl ArRenderer {
    fn listen(&mut self, marker: &MarkerName) -> Result<(), JsValue> {
        self.listeners.ensure(marker)
    }

    fn attach_model(&mut self, options: JsValue, processor: Option<String>) -> Promise {
        let spec: ModelSpec = match spec_from_js(&options, "model") {
            Ok(spec) => spec,
            Err(e) => return Promise::reject(&e),
        };

        let mut model_options = ModelOptions::from(spec);
        if let Some(name) = processor {
            match processor_by_name(&name, &self.scene.config().model) {
                Some(processor) => model_options = model_options.with_processor(processor),
                None => {
                    return Promise::reject(&error_value(format!("unknown model processor {:?}", name)));
                }
            }
        }
        if let Err(e) = self.listen(&model_options.name) {
            return Promise::reject(&e);
        }

        let attachment = self.scene.add_model(model_options);
        self.scene.ensure_started();
        future_to_promise(async move {
            let content = attachment.await.map_err(error_value)?;
            to_js(&ModelResult::from(&content))
        })
    }
}

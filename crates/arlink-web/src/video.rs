//! HTML video elements as frame sources for video surfaces

use arlink_scene::surface::{write_video_frame, VideoSurface};
use bevy::prelude::*;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlVideoElement};

/// `HAVE_CURRENT_DATA`
const READY_CURRENT_DATA: u16 = 2;
/// `HAVE_FUTURE_DATA`
const READY_FUTURE_DATA: u16 = 3;

struct VideoFeed {
    element: HtmlVideoElement,
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

/// Video elements keyed by the surface they draw into. Shared with the
/// promise callbacks that register new feeds, so this lives as a non-send
/// resource.
#[derive(Clone, Default)]
pub(crate) struct VideoFeeds(Rc<RefCell<HashMap<Entity, VideoFeed>>>);

impl VideoFeeds {
    pub fn register(&self, surface: Entity, element: HtmlVideoElement) -> Result<(), JsValue> {
        let canvas: HtmlCanvasElement = document()?.create_element("canvas")?.dyn_into()?;
        let context: CanvasRenderingContext2d = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
            .dyn_into()?;

        self.0.borrow_mut().insert(
            surface,
            VideoFeed {
                element,
                canvas,
                context,
            },
        );
        Ok(())
    }
}

/// Add frame upload to an app. Not a plugin: the feeds are not `Send`.
pub(crate) fn install(app: &mut App, feeds: VideoFeeds) {
    app.insert_non_send_resource(feeds)
        .add_systems(Update, upload_video_frames);
}

fn document() -> Result<web_sys::Document, JsValue> {
    web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))
}

/// Element for `addVideo`: the caller's own, or a new muted looping one
pub(crate) fn video_element(src: Option<&str>, element: Option<HtmlVideoElement>) -> Result<HtmlVideoElement, JsValue> {
    if let Some(element) = element {
        return Ok(element);
    }

    let video: HtmlVideoElement = document()?.create_element("video")?.dyn_into()?;
    video.set_cross_origin(Some("anonymous"));
    video.set_muted(true);
    video.set_loop(true);
    video.set_autoplay(true);
    video.set_attribute("playsinline", "")?;
    if let Some(src) = src {
        video.set_src(src);
    }
    Ok(video)
}

/// Resolve once the element can play, or fail on its error event
pub(crate) async fn wait_until_playable(video: &HtmlVideoElement) -> Result<(), JsValue> {
    if video.ready_state() >= READY_FUTURE_DATA {
        return Ok(());
    }

    let (tx, rx) = oneshot::channel::<Result<(), JsValue>>();
    let tx = Rc::new(RefCell::new(Some(tx)));

    let ready = tx.clone();
    let oncanplay = Closure::wrap(Box::new(move |_: web_sys::Event| {
        if let Some(tx) = ready.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
    }) as Box<dyn FnMut(web_sys::Event)>);

    let failed = tx.clone();
    let src = video.src();
    let onerror = Closure::wrap(Box::new(move |_: web_sys::Event| {
        if let Some(tx) = failed.borrow_mut().take() {
            let _ = tx.send(Err(JsValue::from_str(&format!("failed to load video {}", src))));
        }
    }) as Box<dyn FnMut(web_sys::Event)>);

    video.add_event_listener_with_callback("canplay", oncanplay.as_ref().unchecked_ref())?;
    video.add_event_listener_with_callback("error", onerror.as_ref().unchecked_ref())?;

    let result = rx
        .await
        .unwrap_or_else(|_| Err(JsValue::from_str("video element dropped")));

    let _ = video.remove_event_listener_with_callback("canplay", oncanplay.as_ref().unchecked_ref());
    let _ = video.remove_event_listener_with_callback("error", onerror.as_ref().unchecked_ref());
    result
}

/// Copy the current frame of every playing feed into its surface texture
fn upload_video_frames(
    feeds: NonSend<VideoFeeds>,
    surfaces: Query<&VideoSurface>,
    mut images: ResMut<Assets<Image>>,
) {
    let mut feeds = feeds.0.borrow_mut();

    feeds.retain(|entity, _| surfaces.contains(*entity));

    for (entity, feed) in feeds.iter() {
        let Ok(surface) = surfaces.get(*entity) else {
            continue;
        };
        if feed.element.ready_state() < READY_CURRENT_DATA {
            continue;
        }

        let width = feed.element.video_width();
        let height = feed.element.video_height();
        if width == 0 || height == 0 {
            continue;
        }
        if feed.canvas.width() != width || feed.canvas.height() != height {
            feed.canvas.set_width(width);
            feed.canvas.set_height(height);
        }

        if let Err(e) = feed
            .context
            .draw_image_with_html_video_element(&feed.element, 0.0, 0.0)
        {
            tracing::warn!(?entity, error = ?e, "Failed to draw video frame");
            continue;
        }

        match feed
            .context
            .get_image_data(0.0, 0.0, width as f64, height as f64)
        {
            Ok(frame) => {
                write_video_frame(&mut images, &surface.image, width, height, frame.data().0);
            }
            Err(e) => {
                // Cross-origin video without CORS taints the canvas
                tracing::warn!(?entity, error = ?e, "Failed to read video frame");
            }
        }
    }
}

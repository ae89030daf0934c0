//! DOM custom-event listeners feeding the session channel

use arlink_core::wire::decode_event;
use arlink_core::{ListenTarget, MarkerName, SessionChannel, TopicConfig, TopicKind};
use std::collections::HashSet;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CustomEvent, Event, EventTarget};

/// Listeners registered for one session, at most one set per marker
pub(crate) struct MarkerListeners {
    target: EventTarget,
    topics: TopicConfig,
    channel: SessionChannel,
    registered: HashSet<MarkerName>,
}

impl MarkerListeners {
    pub fn new(topics: TopicConfig, channel: SessionChannel) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let target: EventTarget = match topics.target {
            ListenTarget::Window => window.into(),
            ListenTarget::Document => window
                .document()
                .ok_or_else(|| JsValue::from_str("no document"))?
                .into(),
        };

        Ok(Self {
            target,
            topics,
            channel,
            registered: HashSet::new(),
        })
    }

    /// Listen to every topic of `marker`, once
    pub fn ensure(&mut self, marker: &MarkerName) -> Result<(), JsValue> {
        if self.registered.contains(marker) {
            return Ok(());
        }

        for (kind, topic) in self.topics.topics_for(self.channel.session(), marker) {
            let channel = self.channel.clone();
            let marker = marker.clone();

            let listener = Closure::wrap(Box::new(move |event: Event| {
                forward(&channel, kind, &marker, &event);
            }) as Box<dyn FnMut(Event)>);
            self.target
                .add_event_listener_with_callback(&topic, listener.as_ref().unchecked_ref())?;
            // Listeners live as long as the page
            listener.forget();

            tracing::debug!(%topic, "Listening for tracker events");
        }

        self.registered.insert(marker.clone());
        Ok(())
    }
}

fn forward(channel: &SessionChannel, kind: TopicKind, marker: &MarkerName, event: &Event) {
    let detail = event
        .dyn_ref::<CustomEvent>()
        .map(|event| event.detail())
        .filter(|detail| !detail.is_undefined() && !detail.is_null())
        .and_then(|detail| js_sys::JSON::stringify(&detail).ok())
        .and_then(|json| json.as_string());

    match decode_event(kind, marker.clone(), detail.as_deref()) {
        Ok(tracker_event) => {
            channel.publish(tracker_event);
        }
        Err(e) => {
            tracing::warn!(%marker, topic = kind.label(), error = %e, "Ignoring undecodable tracker event");
        }
    }
}

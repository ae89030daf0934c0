//! Per-session tracker event channel
//!
//! One [`SessionChannel`] exists per tracker instance. Producers (DOM event
//! listeners, the replay harness) publish [`TrackerEvent`]s into it from
//! callbacks; the render loop drains it once per frame. Events for a marker
//! nobody has subscribed to are dropped at publish time.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use crate::marker::{MarkerDimensions, MarkerName};

/// Identifier scoping all topics to one tracker instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notifications emitted by the external tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// Flat 4x4 pose of the marker relative to the camera
    PoseUpdate { marker: MarkerName, matrix: Vec<f32> },
    TrackingLost { marker: MarkerName },
    MarkerDimensions {
        marker: MarkerName,
        dimensions: MarkerDimensions,
    },
}

impl TrackerEvent {
    pub fn marker(&self) -> &MarkerName {
        match self {
            TrackerEvent::PoseUpdate { marker, .. }
            | TrackerEvent::TrackingLost { marker }
            | TrackerEvent::MarkerDimensions { marker, .. } => marker,
        }
    }
}

#[derive(Default)]
struct ChannelState {
    queue: VecDeque<TrackerEvent>,
    subscribers: HashMap<MarkerName, usize>,
    dropped: u64,
}

/// Typed publish/subscribe channel for one tracker session
#[derive(Clone)]
pub struct SessionChannel {
    session: SessionId,
    state: Arc<Mutex<ChannelState>>,
}

impl SessionChannel {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Register interest in a marker. The registration lasts as long as the
    /// returned [`Subscription`].
    pub fn subscribe(&self, marker: &MarkerName) -> Subscription {
        if let Ok(mut state) = self.state.lock() {
            *state.subscribers.entry(marker.clone()).or_insert(0) += 1;
        }
        tracing::debug!(session = %self.session, %marker, "Subscribed to marker");

        Subscription {
            marker: marker.clone(),
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn subscriber_count(&self, marker: &MarkerName) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.subscribers.get(marker).copied())
            .unwrap_or(0)
    }

    /// Queue an event. Returns false when no subscriber wants it.
    pub fn publish(&self, event: TrackerEvent) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        if state.subscribers.get(event.marker()).copied().unwrap_or(0) == 0 {
            state.dropped += 1;
            tracing::trace!(marker = %event.marker(), "Dropping event for unsubscribed marker");
            return false;
        }

        state.queue.push_back(event);
        true
    }

    /// Take every queued event in arrival order
    pub fn drain(&self) -> Vec<TrackerEvent> {
        match self.state.lock() {
            Ok(mut state) => state.queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Events discarded because nothing was subscribed
    pub fn dropped(&self) -> u64 {
        self.state.lock().map(|state| state.dropped).unwrap_or(0)
    }
}

/// Live interest in one marker's events
#[derive(Debug)]
pub struct Subscription {
    marker: MarkerName,
    state: Weak<Mutex<ChannelState>>,
}

impl Subscription {
    pub fn marker(&self) -> &MarkerName {
        &self.marker
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let Ok(mut guard) = state.lock() else {
            return;
        };
        if let Some(count) = guard.subscribers.get_mut(&self.marker) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                guard.subscribers.remove(&self.marker);
            }
        }
    }
}

//! Recorded tracker sessions and their playback

use arlink_core::TrackerEvent;
use arlink_scene::bridge::TrackerChannel;
use arlink_scene::{Attachment, ImageContent, ModelContent};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read session log: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Session log line {line}: {source}")]
    ParseError {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One line of a session log: a tracker event and when it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Milliseconds since the start of the recording
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: TrackerEvent,
}

/// Parse JSON lines. Blank lines and `#` comments are skipped; events are
/// ordered by time, keeping file order for equal timestamps.
pub fn parse_log(content: &str) -> Result<Vec<RecordedEvent>, ReplayError> {
    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: RecordedEvent = serde_json::from_str(line).map_err(|source| ReplayError::ParseError {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    events.sort_by_key(|event| event.at_ms);
    Ok(events)
}

pub fn load_log(path: &Path) -> Result<Vec<RecordedEvent>, ReplayError> {
    let content = std::fs::read_to_string(path)?;
    let events = parse_log(&content)?;
    tracing::info!(path = %path.display(), events = events.len(), "Loaded session log");
    Ok(events)
}

/// Playback position in a recorded session
#[derive(Resource, Debug)]
pub struct ReplayLog {
    events: Vec<RecordedEvent>,
    cursor: usize,
    epoch_ms: Option<u64>,
    looping: bool,
    passes: u32,
}

impl ReplayLog {
    pub fn new(events: Vec<RecordedEvent>, looping: bool) -> Self {
        Self {
            events,
            cursor: 0,
            epoch_ms: None,
            looping,
            passes: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.looping && self.cursor >= self.events.len()
    }

    /// Completed passes over the log
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Events whose time has come at `now_ms` on the app clock
    pub fn due(&mut self, now_ms: u64) -> Vec<TrackerEvent> {
        if self.events.is_empty() {
            return Vec::new();
        }
        let epoch = *self.epoch_ms.get_or_insert(now_ms);
        let elapsed = now_ms.saturating_sub(epoch);

        let mut due = Vec::new();
        while let Some(recorded) = self.events.get(self.cursor) {
            if recorded.at_ms > elapsed {
                break;
            }
            due.push(recorded.event.clone());
            self.cursor += 1;
        }

        if self.cursor >= self.events.len() && self.epoch_ms.is_some() {
            if self.looping {
                self.cursor = 0;
                self.epoch_ms = None;
                self.passes += 1;
            } else if self.passes == 0 {
                self.passes = 1;
                tracing::info!("Session log finished");
            }
        }
        due
    }
}

enum PendingContent {
    Model(Attachment<ModelContent>),
    Image(Attachment<ImageContent>),
}

/// Attachments made at startup, reported as they resolve
#[derive(Resource, Default)]
pub struct PendingAttachments(Vec<(String, PendingContent)>);

impl PendingAttachments {
    pub fn model(&mut self, label: impl Into<String>, attachment: Attachment<ModelContent>) {
        self.0.push((label.into(), PendingContent::Model(attachment)));
    }

    pub fn image(&mut self, label: impl Into<String>, attachment: Attachment<ImageContent>) {
        self.0.push((label.into(), PendingContent::Image(attachment)));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct ReplayPlugin {
    log: std::sync::Mutex<Option<ReplayLog>>,
    pending: std::sync::Mutex<Option<PendingAttachments>>,
}

impl ReplayPlugin {
    pub fn new(log: ReplayLog, pending: PendingAttachments) -> Self {
        Self {
            log: std::sync::Mutex::new(Some(log)),
            pending: std::sync::Mutex::new(Some(pending)),
        }
    }
}

impl Plugin for ReplayPlugin {
    fn build(&self, app: &mut App) {
        if let Some(log) = self.log.lock().ok().and_then(|mut log| log.take()) {
            app.insert_resource(log);
        }
        if let Some(pending) = self.pending.lock().ok().and_then(|mut pending| pending.take()) {
            app.insert_resource(pending);
        }
        app.add_systems(
            Update,
            (
                release_due_events.before(arlink_scene::bridge::drain_tracker_channel),
                report_attachments,
            ),
        );
    }
}

fn release_due_events(time: Res<Time>, channel: Res<TrackerChannel>, log: Option<ResMut<ReplayLog>>) {
    let Some(mut log) = log else {
        return;
    };
    if log.is_finished() {
        return;
    }

    let passes = log.passes();
    let now_ms = time.elapsed().as_millis() as u64;
    let due = log.due(now_ms);
    if log.passes() > passes && !log.is_finished() {
        tracing::debug!(passes = log.passes(), "Restarting session log");
    }
    for event in due {
        if !channel.0.publish(event.clone()) {
            tracing::trace!(marker = %event.marker(), "No attachment for replayed event");
        }
    }
}

fn report_attachments(pending: Option<ResMut<PendingAttachments>>) {
    let Some(mut pending) = pending else {
        return;
    };

    pending.0.retain_mut(|(label, content)| {
        let outcome = match content {
            PendingContent::Model(attachment) => attachment.try_take().map(|result| {
                result.map(|model| format!("mesh {:?}, animations {:?}", model.mesh, model.animations))
            }),
            PendingContent::Image(attachment) => attachment
                .try_take()
                .map(|result| result.map(|image| format!("entity {:?}", image.entity))),
        };

        match outcome {
            Some(Ok(summary)) => {
                tracing::info!(%label, %summary, "Attached");
                false
            }
            Some(Err(e)) => {
                tracing::error!(%label, error = %e, "Attachment failed");
                false
            }
            None => true,
        }
    });
}

//! Tracker DOM event names and payload decoding
//!
//! The tracker announces each marker on three topics of the form
//! `<prefix>-<session>-<marker>`. Payloads arrive as JSON (the `detail` of a
//! DOM `CustomEvent`, stringified).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::channel::{SessionId, TrackerEvent};
use crate::error::WireError;
use crate::marker::{MarkerDimensions, MarkerName};

/// Where the tracker dispatches its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenTarget {
    #[default]
    Document,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    PoseUpdate,
    TrackingLost,
    MarkerDimensions,
}

impl TopicKind {
    pub const ALL: [TopicKind; 3] = [
        TopicKind::PoseUpdate,
        TopicKind::TrackingLost,
        TopicKind::MarkerDimensions,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TopicKind::PoseUpdate => "pose-update",
            TopicKind::TrackingLost => "tracking-lost",
            TopicKind::MarkerDimensions => "marker-dimensions",
        }
    }
}

/// Topic prefixes used by the tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub pose_update: String,
    pub tracking_lost: String,
    pub marker_dimensions: String,
    pub target: ListenTarget,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            pose_update: "getMatrixGL_RH".to_string(),
            tracking_lost: "nftTrackingLost".to_string(),
            marker_dimensions: "getNFTData".to_string(),
            target: ListenTarget::default(),
        }
    }
}

impl TopicConfig {
    pub fn prefix(&self, kind: TopicKind) -> &str {
        match kind {
            TopicKind::PoseUpdate => &self.pose_update,
            TopicKind::TrackingLost => &self.tracking_lost,
            TopicKind::MarkerDimensions => &self.marker_dimensions,
        }
    }

    pub fn topic(&self, kind: TopicKind, session: &SessionId, marker: &MarkerName) -> String {
        format!("{}-{}-{}", self.prefix(kind), session, marker)
    }

    /// All three topics for one marker
    pub fn topics_for(&self, session: &SessionId, marker: &MarkerName) -> Vec<(TopicKind, String)> {
        TopicKind::ALL
            .iter()
            .map(|kind| (*kind, self.topic(*kind, session, marker)))
            .collect()
    }

    /// Recover the kind and marker from a topic name of this session
    pub fn parse(&self, topic: &str, session: &SessionId) -> Option<(TopicKind, MarkerName)> {
        TopicKind::ALL.iter().find_map(|kind| {
            let rest = topic.strip_prefix(self.prefix(*kind))?;
            let rest = rest.strip_prefix('-')?;
            let marker = rest.strip_prefix(session.as_str())?.strip_prefix('-')?;
            (!marker.is_empty()).then(|| (*kind, MarkerName::from(marker)))
        })
    }
}

/// A pose matrix as the tracker serializes it: either a plain array or a
/// typed array stringified into an object keyed by index
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlatMatrix {
    Array(Vec<f32>),
    Indexed(BTreeMap<String, f32>),
}

impl FlatMatrix {
    fn into_values(self) -> Result<Vec<f32>, WireError> {
        match self {
            FlatMatrix::Array(values) => Ok(values),
            FlatMatrix::Indexed(map) => {
                let mut indexed = map
                    .into_iter()
                    .map(|(key, value)| {
                        key.parse::<usize>()
                            .map(|index| (index, value))
                            .map_err(|_| WireError::BadIndex(key))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_by_key(|(index, _)| *index);

                // Keys must cover 0..len exactly
                if let Some(index) = indexed
                    .iter()
                    .enumerate()
                    .find_map(|(expected, (index, _))| (*index != expected).then_some(*index))
                {
                    return Err(WireError::BadIndex(index.to_string()));
                }
                Ok(indexed.into_iter().map(|(_, value)| value).collect())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PosePayload {
    #[serde(rename = "matrixGL_RH")]
    matrix: FlatMatrix,
}

/// Build a [`TrackerEvent`] from a topic kind and its JSON detail
pub fn decode_event(
    kind: TopicKind,
    marker: MarkerName,
    detail: Option<&str>,
) -> Result<TrackerEvent, WireError> {
    match kind {
        TopicKind::TrackingLost => Ok(TrackerEvent::TrackingLost { marker }),
        TopicKind::PoseUpdate => {
            let detail = detail.ok_or(WireError::MissingPayload(kind.label()))?;
            let payload: PosePayload = serde_json::from_str(detail)?;
            Ok(TrackerEvent::PoseUpdate {
                marker,
                matrix: payload.matrix.into_values()?,
            })
        }
        TopicKind::MarkerDimensions => {
            let detail = detail.ok_or(WireError::MissingPayload(kind.label()))?;
            let dimensions: MarkerDimensions = serde_json::from_str(detail)?;
            Ok(TrackerEvent::MarkerDimensions { marker, dimensions })
        }
    }
}

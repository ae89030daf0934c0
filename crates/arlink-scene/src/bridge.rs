//! Pose event bridge - tracker channel to anchor transforms
//!
//! Each frame the session channel is drained in arrival order and turned
//! into [`MarkerSignal`] messages. Pose and tracking-lost signals are applied
//! by one system so their relative order for a marker is preserved.

use arlink_core::{MarkerDimensions, MarkerName, Pose, SessionChannel, Subscription, TrackerEvent};
use bevy::prelude::*;

use crate::anchor::{Anchor, TrackingState};
use crate::ArSettings;

/// The session's tracker channel as a resource
#[derive(Resource, Clone)]
pub struct TrackerChannel(pub SessionChannel);

#[derive(Debug, Clone)]
pub enum Signal {
    Pose(Pose),
    Lost,
    Dimensions(MarkerDimensions),
}

/// A decoded tracker notification for one marker
#[derive(Message, Debug, Clone)]
pub struct MarkerSignal {
    pub marker: MarkerName,
    pub signal: Signal,
}

/// One attachment's subscription to its marker
#[derive(Component, Debug)]
pub struct MarkerSubscription {
    pub subscription: Subscription,
    pub anchor: Entity,
    /// Pose and tracking-lost signals delivered through this subscription
    pub deliveries: u64,
}

impl MarkerSubscription {
    pub fn new(subscription: Subscription, anchor: Entity) -> Self {
        Self {
            subscription,
            anchor,
            deliveries: 0,
        }
    }

    pub fn marker(&self) -> &MarkerName {
        self.subscription.marker()
    }
}

pub struct BridgePlugin;

impl Plugin for BridgePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (drain_tracker_channel, apply_pose_signals).chain(),
        );
    }
}

/// Decode queued tracker events. Malformed poses are rejected here and never
/// reach an anchor.
pub fn drain_tracker_channel(
    channel: Res<TrackerChannel>,
    settings: Res<ArSettings>,
    mut signals: MessageWriter<MarkerSignal>,
) {
    let layout = settings.0.pose.layout;

    for event in channel.0.drain() {
        match event {
            TrackerEvent::PoseUpdate { marker, matrix } => match Pose::from_slice(&matrix, layout) {
                Ok(pose) => {
                    signals.write(MarkerSignal {
                        marker,
                        signal: Signal::Pose(pose),
                    });
                }
                Err(e) => {
                    tracing::warn!(%marker, error = %e, "Rejecting malformed pose");
                }
            },
            TrackerEvent::TrackingLost { marker } => {
                tracing::debug!(%marker, "Tracking lost");
                signals.write(MarkerSignal {
                    marker,
                    signal: Signal::Lost,
                });
            }
            TrackerEvent::MarkerDimensions { marker, dimensions } => {
                if !dimensions.is_valid() {
                    tracing::warn!(%marker, ?dimensions, "Ignoring unusable marker dimensions");
                    continue;
                }
                signals.write(MarkerSignal {
                    marker,
                    signal: Signal::Dimensions(dimensions),
                });
            }
        }
    }
}

/// Apply pose and tracking-lost signals, once per subscription
pub fn apply_pose_signals(
    mut signals: MessageReader<MarkerSignal>,
    mut subscriptions: Query<&mut MarkerSubscription>,
    mut anchors: Query<(&mut Anchor, &mut Transform, &mut Visibility)>,
) {
    for signal in signals.read() {
        if matches!(signal.signal, Signal::Dimensions(_)) {
            continue;
        }

        for mut subscription in subscriptions.iter_mut() {
            if subscription.marker() != &signal.marker {
                continue;
            }
            subscription.deliveries += 1;

            let Ok((mut anchor, mut transform, mut visibility)) = anchors.get_mut(subscription.anchor) else {
                continue;
            };

            match &signal.signal {
                Signal::Pose(pose) => {
                    transform.rotation = pose.rotation_from_euler();
                    transform.translation = pose.position;
                    *visibility = Visibility::Inherited;
                    anchor.state = TrackingState::Tracked;
                    anchor.last_pose = Some(*pose);
                    anchor.pose_updates += 1;
                }
                Signal::Lost => {
                    // The stale pose stays so a visible-when-lost anchor does not jump
                    *visibility = anchor.lost_visibility();
                    anchor.state = TrackingState::Lost;
                }
                Signal::Dimensions(_) => {}
            }
        }
    }
}

//! Anchor nodes - one neutral transform parent per tracked marker

use arlink_core::{MarkerDimensions, MarkerName, Pose};
use bevy::prelude::*;
use std::collections::HashMap;

/// Tracking state of a marker as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// No pose or loss reported yet
    #[default]
    Pending,
    Tracked,
    Lost,
}

/// Component marking the root entity that follows a marker
#[derive(Component, Debug)]
pub struct Anchor {
    pub marker: MarkerName,
    /// Keep the subtree visible while the marker is lost
    pub visible_when_lost: bool,
    pub state: TrackingState,
    pub last_pose: Option<Pose>,
    /// Pose applications so far, counting each subscription separately
    pub pose_updates: u64,
}

impl Anchor {
    pub fn new(marker: MarkerName, visible_when_lost: bool) -> Self {
        Self {
            marker,
            visible_when_lost,
            state: TrackingState::Pending,
            last_pose: None,
            pose_updates: 0,
        }
    }

    /// Visibility to use whenever the marker is not being tracked
    pub fn lost_visibility(&self) -> Visibility {
        if self.visible_when_lost {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        }
    }
}

/// Marker name to anchor entity, plus the last printed size seen per marker
#[derive(Resource, Debug, Default)]
pub struct AnchorRegistry {
    anchors: HashMap<MarkerName, Entity>,
    dimensions: HashMap<MarkerName, MarkerDimensions>,
}

impl AnchorRegistry {
    pub fn get(&self, marker: &MarkerName) -> Option<Entity> {
        self.anchors.get(marker).copied()
    }

    /// Dimensions from the latest delivery for `marker`
    pub fn dimensions(&self, marker: &MarkerName) -> Option<MarkerDimensions> {
        self.dimensions.get(marker).copied()
    }

    pub fn remember_dimensions(&mut self, marker: &MarkerName, dimensions: MarkerDimensions) {
        self.dimensions.insert(marker.clone(), dimensions);
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MarkerName, Entity)> {
        self.anchors.iter().map(|(marker, entity)| (marker, *entity))
    }

    /// Anchor for `marker`, spawning it on first use.
    ///
    /// A later attachment's lost policy replaces the earlier one.
    pub fn ensure(
        &mut self,
        commands: &mut Commands,
        marker: &MarkerName,
        visible_when_lost: bool,
    ) -> Entity {
        if let Some(entity) = self.get(marker) {
            commands.queue(move |world: &mut World| {
                let Some(mut anchor) = world.get_mut::<Anchor>(entity) else {
                    return;
                };
                anchor.visible_when_lost = visible_when_lost;
                let tracked = anchor.state == TrackingState::Tracked;
                let lost_visibility = anchor.lost_visibility();
                if !tracked {
                    if let Some(mut visibility) = world.get_mut::<Visibility>(entity) {
                        *visibility = lost_visibility;
                    }
                }
            });
            return entity;
        }

        let anchor = Anchor::new(marker.clone(), visible_when_lost);
        let visibility = anchor.lost_visibility();
        let entity = commands
            .spawn((
                anchor,
                Transform::IDENTITY,
                visibility,
                Name::new(format!("anchor:{}", marker)),
            ))
            .id();

        tracing::info!(%marker, ?entity, visible_when_lost, "Created anchor");
        self.anchors.insert(marker.clone(), entity);
        entity
    }
}

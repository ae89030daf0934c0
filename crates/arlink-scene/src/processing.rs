//! Post-processing of imported models
//!
//! Once a glTF scene instance has spawned, its node hierarchy is summarised
//! into an [`ImportedModel`] and handed to a [`ModelProcessor`]. The
//! processor decides which node is the model's mesh, which nodes to discard,
//! which animation players to halt and how animations are exposed.

use arlink_core::{ArError, ModelConventions};
use bevy::prelude::*;

/// Rough classification of a spawned glTF node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Mesh,
    Light,
    Node,
}

#[derive(Debug, Clone)]
pub struct ImportedNode {
    pub entity: Entity,
    pub name: Option<String>,
    pub kind: NodeKind,
    pub animation_player: bool,
}

/// Spawned scene hierarchy of one model attachment
#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub url: String,
    /// Content entity the scene was spawned under
    pub root: Entity,
    /// Every descendant of `root`, parents before children
    pub nodes: Vec<ImportedNode>,
    /// Named animation clips in the asset, sorted
    pub animations: Vec<String>,
}

impl ImportedModel {
    pub fn find(&self, name: &str) -> Option<&ImportedNode> {
        self.nodes.iter().find(|node| node.name.as_deref() == Some(name))
    }
}

/// Animations exposed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAnimations {
    /// The conventionally named clip
    Primary(String),
    All(Vec<String>),
}

/// What to do with an imported model
#[derive(Debug, Clone)]
pub struct ProcessedModel {
    pub mesh: Entity,
    pub discard: Vec<Entity>,
    pub stop_players: Vec<Entity>,
    pub animations: ModelAnimations,
}

/// Strategy applied to every model before its attachment resolves
pub trait ModelProcessor: Send + Sync + 'static {
    fn process(&self, model: &ImportedModel) -> Result<ProcessedModel, ArError>;
}

impl<F> ModelProcessor for F
where
    F: Fn(&ImportedModel) -> Result<ProcessedModel, ArError> + Send + Sync + 'static,
{
    fn process(&self, model: &ImportedModel) -> Result<ProcessedModel, ArError> {
        self(model)
    }
}

/// Default processing for conventionally exported assets.
///
/// The node named after `root_node` is the mesh; a light named after
/// `default_light` is removed; all players are halted; the clip named
/// `primary_animation` is exposed alone when present.
#[derive(Debug, Clone, Default)]
pub struct ConventionalProcessor {
    pub conventions: ModelConventions,
}

impl ConventionalProcessor {
    pub fn new(conventions: ModelConventions) -> Self {
        Self { conventions }
    }
}

impl ModelProcessor for ConventionalProcessor {
    fn process(&self, model: &ImportedModel) -> Result<ProcessedModel, ArError> {
        let conventions = &self.conventions;

        let mesh = model
            .find(&conventions.root_node)
            .ok_or_else(|| ArError::ConventionViolation {
                url: model.url.clone(),
                expected: conventions.root_node.clone(),
            })?
            .entity;

        let discard = model
            .nodes
            .iter()
            .filter(|node| {
                node.kind == NodeKind::Light && node.name.as_deref() == Some(conventions.default_light.as_str())
            })
            .map(|node| node.entity)
            .collect();

        let animations = if model.animations.iter().any(|name| name == &conventions.primary_animation) {
            ModelAnimations::Primary(conventions.primary_animation.clone())
        } else {
            ModelAnimations::All(model.animations.clone())
        };

        Ok(ProcessedModel {
            mesh,
            discard,
            stop_players: players(model),
            animations,
        })
    }
}

/// Leaves the hierarchy as imported; the content root stands in for the mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

impl ModelProcessor for PassthroughProcessor {
    fn process(&self, model: &ImportedModel) -> Result<ProcessedModel, ArError> {
        Ok(ProcessedModel {
            mesh: model.root,
            discard: Vec::new(),
            stop_players: players(model),
            animations: ModelAnimations::All(model.animations.clone()),
        })
    }
}

fn players(model: &ImportedModel) -> Vec<Entity> {
    model
        .nodes
        .iter()
        .filter(|node| node.animation_player)
        .map(|node| node.entity)
        .collect()
}

/// Look up a processor by the name the web layer exposes
pub fn processor_by_name(name: &str, conventions: &ModelConventions) -> Option<std::sync::Arc<dyn ModelProcessor>> {
    match name {
        "conventional" => Some(std::sync::Arc::new(ConventionalProcessor::new(conventions.clone()))),
        "passthrough" => Some(std::sync::Arc::new(PassthroughProcessor)),
        _ => None,
    }
}

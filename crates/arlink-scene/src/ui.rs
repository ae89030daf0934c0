//! Debug inspector overlay listing anchors and their content

use arlink_core::{ContentOffset, MarkerName};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::anchor::{Anchor, AnchorRegistry, TrackingState};
use crate::content::Content;

/// Shared open/closed flag so hosts can toggle the inspector after start
#[derive(Resource, Debug, Clone, Default)]
pub struct InspectorToggle(Arc<AtomicBool>);

impl InspectorToggle {
    pub fn open(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One inspector row
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRow {
    pub marker: MarkerName,
    pub state: TrackingState,
    pub position: Vec3,
    /// XYZ Euler angles in degrees
    pub euler_degrees: Vec3,
    pub attachments: usize,
    pub offset: Option<ContentOffset>,
}

pub struct InspectorPlugin;

impl Plugin for InspectorPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<InspectorToggle>()
            .add_systems(EguiPrimaryContextPass, inspector_window);
    }
}

/// Rows sorted by marker name
pub fn collect_rows(
    registry: &AnchorRegistry,
    anchors: &Query<(&Anchor, Option<&Children>)>,
    contents: &Query<&Content>,
) -> Vec<AnchorRow> {
    let mut rows: Vec<AnchorRow> = registry
        .iter()
        .filter_map(|(marker, entity)| {
            let (anchor, children) = anchors.get(entity).ok()?;
            let pose = anchor.last_pose.unwrap_or(arlink_core::Pose::IDENTITY);
            let attached: Vec<&Content> = children
                .map(|children| children.iter().filter_map(|child| contents.get(child).ok()).collect())
                .unwrap_or_default();

            Some(AnchorRow {
                marker: marker.clone(),
                state: anchor.state,
                position: pose.position,
                euler_degrees: Vec3::new(
                    pose.euler.x.to_degrees(),
                    pose.euler.y.to_degrees(),
                    pose.euler.z.to_degrees(),
                ),
                attachments: attached.len(),
                offset: attached.iter().find_map(|content| content.offset),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.marker.cmp(&b.marker));
    rows
}

fn inspector_window(
    mut contexts: EguiContexts,
    toggle: Res<InspectorToggle>,
    registry: Res<AnchorRegistry>,
    anchors: Query<(&Anchor, Option<&Children>)>,
    contents: Query<&Content>,
) {
    if !toggle.is_open() {
        return;
    }
    let Ok(ctx) = contexts.ctx_mut() else { return };

    let rows = collect_rows(&registry, &anchors, &contents);
    let mut open = true;

    egui::Window::new("arlink inspector")
        .open(&mut open)
        .default_width(320.0)
        .show(ctx, |ui| {
            if rows.is_empty() {
                ui.label("No anchors yet");
                return;
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                for row in &rows {
                    render_anchor_row(ui, row);
                    ui.separator();
                }
            });
        });

    if !open {
        toggle.close();
    }
}

fn render_anchor_row(ui: &mut egui::Ui, row: &AnchorRow) {
    let state = match row.state {
        TrackingState::Pending => "waiting",
        TrackingState::Tracked => "tracked",
        TrackingState::Lost => "lost",
    };

    ui.heading(row.marker.as_str());
    egui::Grid::new(("anchor_grid", row.marker.as_str()))
        .num_columns(2)
        .spacing([10.0, 4.0])
        .show(ui, |ui| {
            ui.label("State:");
            ui.label(state);
            ui.end_row();

            ui.label("Position:");
            ui.label(format!(
                "[{:.1}, {:.1}, {:.1}]",
                row.position.x, row.position.y, row.position.z
            ));
            ui.end_row();

            ui.label("Rotation:");
            ui.label(format!(
                "X:{:.1}° Y:{:.1}° Z:{:.1}°",
                row.euler_degrees.x, row.euler_degrees.y, row.euler_degrees.z
            ));
            ui.end_row();

            ui.label("Attachments:");
            ui.label(format!("{}", row.attachments));
            ui.end_row();

            if let Some(offset) = row.offset {
                ui.label("Offset:");
                ui.label(format!("[{:.2}, {:.2}]", offset.x, offset.y));
                ui.end_row();
            }
        });
}

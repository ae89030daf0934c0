//! Scene setup - camera, lights and a transparent background

use bevy::prelude::*;

use crate::ArSettings;

/// Marker component for the camera the tracker poses are relative to
#[derive(Component)]
pub struct ArCamera;

/// Plugin for scene setup
pub struct SceneSetupPlugin;

impl Plugin for SceneSetupPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_scene);
    }
}

fn setup_scene(mut commands: Commands, settings: Res<ArSettings>) {
    let render = &settings.0.render;
    let [r, g, b, a] = render.clear_color;
    commands.insert_resource(ClearColor(Color::linear_rgba(r, g, b, a)));

    // Camera stays at the origin looking down -Z; anchors move instead
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: render.fov_degrees.to_radians(),
            near: render.near,
            far: render.far,
            ..default()
        }),
        Transform::IDENTITY,
        ArCamera,
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 400.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            illuminance: 5000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(0.0, 200.0, 100.0).looking_at(Vec3::new(0.0, 0.0, -300.0), Vec3::Y),
    ));

    // Warm fill from behind the camera
    commands.spawn((
        PointLight {
            intensity: 100_000_000.0,
            range: render.far,
            shadows_enabled: false,
            color: Color::srgb(1.0, 0.95, 0.9),
            ..default()
        },
        Transform::from_xyz(-100.0, 100.0, 50.0),
    ));

    tracing::debug!(fov = render.fov_degrees, near = render.near, far = render.far, "Scene set up");
}

//! Textured planes for video and image content

use arlink_core::ContentConfig;
use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use std::f32::consts::PI;

/// Component on a video plane; its image receives decoded frames
#[derive(Component, Debug, Clone)]
pub struct VideoSurface {
    pub image: Handle<Image>,
}

/// Rectangle sized to the configured surface aspect ratio, facing +Z
pub fn surface_mesh(config: &ContentConfig) -> Mesh {
    let (width, height) = config.surface_size();
    Mesh::from(Rectangle::new(width, height))
}

pub fn surface_transform(config: &ContentConfig, scale: f32) -> Transform {
    let transform = Transform::from_scale(Vec3::splat(scale));
    if config.flip_surface {
        transform.with_rotation(Quat::from_rotation_y(PI))
    } else {
        transform
    }
}

/// Black base with the texture as emission, so scene lighting does not tint it
pub fn emissive_material(texture: Handle<Image>) -> StandardMaterial {
    StandardMaterial {
        base_color: Color::BLACK,
        emissive: LinearRgba::WHITE,
        emissive_texture: Some(texture),
        perceptual_roughness: 1.0,
        double_sided: true,
        cull_mode: None,
        ..default()
    }
}

/// Placeholder texture until the first frame arrives
pub fn blank_video_image() -> Image {
    Image::new_fill(
        Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 255],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    )
}

/// Replace a video texture with an RGBA8 frame. Returns false when the frame
/// is the wrong size for its dimensions or the image is gone.
pub fn write_video_frame(
    images: &mut Assets<Image>,
    handle: &Handle<Image>,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
) -> bool {
    if width == 0 || height == 0 || rgba.len() != (width as usize) * (height as usize) * 4 {
        tracing::warn!(width, height, len = rgba.len(), "Discarding malformed video frame");
        return false;
    }

    let Some(image) = images.get_mut(handle) else {
        return false;
    };

    *image = Image::new(
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        rgba,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use arlink_core::{MatrixLayout, Pose};
    use bevy::mesh::VertexAttributeValues;

    #[test]
    fn test_surface_transform_flip() {
        let mut config = ContentConfig::default();
        let plain = surface_transform(&config, 2.0);
        assert_eq!(plain.rotation, Quat::IDENTITY);
        assert_eq!(plain.scale, Vec3::splat(2.0));

        config.flip_surface = true;
        let flipped = surface_transform(&config, 2.0);
        assert!(flipped.rotation.abs_diff_eq(Quat::from_rotation_y(PI), 1e-6));
        assert_eq!(flipped.translation, Vec3::ZERO);
    }

    /// Unit normal of a surface placed under an anchor at `marker_pose`
    fn world_normal(config: &ContentConfig, marker_pose: Mat4) -> Vec3 {
        let mesh = surface_mesh(config);
        let Some(VertexAttributeValues::Float32x3(normals)) = mesh.attribute(Mesh::ATTRIBUTE_NORMAL) else {
            panic!("surface mesh has no normals");
        };
        let local = Vec3::from(normals[0]);
        assert!(normals.iter().all(|n| Vec3::from(*n).abs_diff_eq(local, 1e-6)));

        let pose = Pose::from_slice(&marker_pose.to_cols_array(), MatrixLayout::ColumnMajor).unwrap();
        let surface = surface_transform(config, 1.0);
        (pose.rotation_from_euler() * surface.rotation * local).normalize()
    }

    #[test]
    fn test_unflipped_surface_faces_camera() {
        // The tracker reports a marker facing the camera with its +Z towards
        // the viewer, in front of a camera at the origin looking down -Z
        let facing = Mat4::from_translation(Vec3::new(0.0, 0.0, -300.0));
        let towards_camera = (Vec3::ZERO - facing.w_axis.truncate()).normalize();

        let mut config = ContentConfig::default();
        assert!(!config.flip_surface);
        assert!(world_normal(&config, facing).dot(towards_camera) > 0.99);

        // Tilted marker: the front face still points at the camera side
        let tilted = facing * Mat4::from_rotation_x(0.6);
        assert!(world_normal(&config, tilted).dot(towards_camera) > 0.5);

        config.flip_surface = true;
        assert!(world_normal(&config, facing).dot(towards_camera) < -0.99);
    }

    #[test]
    fn test_emissive_material() {
        let material = emissive_material(Handle::default());
        assert_eq!(material.base_color, Color::BLACK);
        assert!(material.emissive_texture.is_some());
        assert!(!material.unlit);
        assert!(material.cull_mode.is_none());
    }

    #[test]
    fn test_write_video_frame() {
        let mut images = Assets::<Image>::default();
        let handle = images.add(blank_video_image());

        assert!(write_video_frame(&mut images, &handle, 2, 1, vec![255; 8]));
        let image = images.get(&handle).unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 1);

        assert!(!write_video_frame(&mut images, &handle, 2, 2, vec![255; 8]));
        assert_eq!(images.get(&handle).unwrap().height(), 1);
    }
}

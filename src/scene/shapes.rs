//! Procedural meshes for demo scenes and tests.

use glam::Vec3;

/// Corners and triangle list of an axis-aligned box with outward (CCW)
/// faces.
#[must_use]
pub fn box_geometry(center: Vec3, half_extents: Vec3) -> (Vec<Vec3>, Vec<u32>) {
    let vertices = (0..8)
        .map(|i| {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            center + sign * half_extents
        })
        .collect();

    #[rustfmt::skip]
    let indices = vec![
        0, 2, 3, 0, 3, 1, // -z
        4, 5, 7, 4, 7, 6, // +z
        0, 4, 6, 0, 6, 2, // -x
        1, 3, 7, 1, 7, 5, // +x
        0, 1, 5, 0, 5, 4, // -y
        2, 6, 7, 2, 7, 3, // +y
    ];
    (vertices, indices)
}

/// Horizontal quad at height `y` facing up.
#[must_use]
pub fn ground_geometry(
    center: Vec3,
    half_x: f32,
    half_z: f32,
) -> (Vec<Vec3>, Vec<u32>) {
    let vertices = vec![
        center + Vec3::new(-half_x, 0.0, -half_z),
        center + Vec3::new(half_x, 0.0, -half_z),
        center + Vec3::new(half_x, 0.0, half_z),
        center + Vec3::new(-half_x, 0.0, half_z),
    ];
    (vertices, vec![0, 2, 1, 0, 3, 2])
}

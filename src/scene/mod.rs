//! Tagged scene geometry.
//!
//! Every object carries a [`SemanticTag`], an instance id and the list of
//! passes its material participates in. Segmentation renderers draw only the
//! objects listing their [`PassId`].

mod shapes;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use rustc_hash::FxHasher;
pub use shapes::{box_geometry, ground_geometry};
use wgpu::util::DeviceExt;

use crate::registry::SemanticTag;

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(0);

/// Largest instance id that maps to a unique instance color.
pub const MAX_UNIQUE_INSTANCE: u32 = u16::MAX as u32;

/// Identifier of a render pass that materials can opt into.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassId(u64);

impl PassId {
    /// Derive an identifier from a pass name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Debug for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassId({:016x})", self.0)
    }
}

/// Handle of an object in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

/// Vertex and index buffers of one mesh (positions only, `u32` indices).
pub struct GpuMesh {
    /// `[f32; 3]` positions.
    pub vertex_buffer: wgpu::Buffer,
    /// Triangle list indices.
    pub index_buffer: wgpu::Buffer,
    /// Number of indices.
    pub index_count: u32,
}

/// A mesh plus its labeling metadata.
pub struct SceneObject {
    /// Semantic class.
    pub tag: SemanticTag,
    /// Instance id within the class.
    pub instance_id: u32,
    passes: Vec<PassId>,
    /// GPU geometry.
    pub mesh: GpuMesh,
}

impl SceneObject {
    /// True if the object's material takes part in `pass`.
    pub fn participates_in(&self, pass: PassId) -> bool {
        self.passes.contains(&pass)
    }
}

/// Flat list of tagged objects.
pub struct Scene {
    /// Unique per scene in the process.
    id: u64,
    objects: Vec<SceneObject>,
    /// Bumped on every mutation.
    revision: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            id: NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed),
            objects: Vec::new(),
            revision: 0,
        }
    }
}

impl Scene {
    /// Empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide identity. Two scenes never share an id, so cached
    /// per-object data keyed on `(id, revision)` cannot leak between them.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Upload a mesh. Empty meshes are skipped.
    pub fn add_mesh(
        &mut self,
        device: &wgpu::Device,
        tag: SemanticTag,
        instance_id: u32,
        passes: &[PassId],
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Option<ObjectId> {
        if vertices.is_empty() || indices.is_empty() {
            log::warn!("skipping empty {tag} mesh (instance {instance_id})");
            return None;
        }
        if instance_id > MAX_UNIQUE_INSTANCE {
            log::warn!(
                "{tag} instance {instance_id} exceeds {MAX_UNIQUE_INSTANCE}; \
                 its instance color wraps"
            );
        }

        let positions: Vec<[f32; 3]> =
            vertices.iter().map(Vec3::to_array).collect();
        let vertex_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{tag} {instance_id} Vertices")),
                contents: bytemuck::cast_slice(&positions),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{tag} {instance_id} Indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let id = ObjectId(self.objects.len());
        self.objects.push(SceneObject {
            tag,
            instance_id,
            passes: passes.to_vec(),
            mesh: GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        });
        self.revision += 1;
        Some(id)
    }

    /// Upload an axis-aligned box.
    pub fn add_box(
        &mut self,
        device: &wgpu::Device,
        tag: SemanticTag,
        instance_id: u32,
        passes: &[PassId],
        center: Vec3,
        half_extents: Vec3,
    ) -> Option<ObjectId> {
        let (vertices, indices) = box_geometry(center, half_extents);
        self.add_mesh(device, tag, instance_id, passes, &vertices, &indices)
    }

    /// Remove every object.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.revision += 1;
    }

    /// All objects in insertion order.
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// Object by handle.
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0)
    }

    /// Mutation counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_ids_compare_by_name() {
        assert_eq!(
            PassId::new("SegmentationPass"),
            PassId::new("SegmentationPass")
        );
        assert_ne!(PassId::new("SegmentationPass"), PassId::new("Forward"));
    }

    #[test]
    fn scenes_at_equal_revisions_stay_distinct() {
        let mut a = Scene::new();
        let mut b = Scene::new();
        a.clear();
        b.clear();
        assert_eq!(a.revision(), b.revision());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clear_empties_and_bumps_revision() {
        let mut scene = Scene::new();
        let id = scene.id();
        scene.clear();
        assert!(scene.objects().is_empty());
        assert_eq!(scene.revision(), 1);
        assert_eq!(scene.id(), id);
    }
}

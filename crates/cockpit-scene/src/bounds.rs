//! Axis-aligned bounds of a scene subtree

use bevy::camera::primitives::MeshAabb;
use bevy::math::Affine3A;
use bevy::prelude::*;

use crate::controls::CockpitCamera;

/// Axis-aligned box in a single coordinate frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Contains nothing; extending it with any point yields that point
    pub const EMPTY: Bounds = Bounds {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Extend by a local box placed into this frame by `to_frame`
    pub fn extend_box(&mut self, to_frame: Affine3A, min: Vec3, max: Vec3) {
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            );
            self.extend(to_frame.transform_point3(corner));
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }
        self.max - self.min
    }

    /// Length of the min-max diagonal, zero when empty
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }
}

/// Scene nodes the framing code walks. The cockpit camera is excluded so the
/// model query never aliases the camera transform.
pub type NodeQuery<'w, 's> = Query<
    'w,
    's,
    (
        &'static mut Transform,
        Option<&'static Mesh3d>,
        Option<&'static Children>,
    ),
    Without<CockpitCamera>,
>;

/// Bounds of every mesh under `root`, expressed in the frame of `root`'s parent
/// (the root's own transform is applied).
pub fn subtree_bounds(root: Entity, nodes: &NodeQuery, meshes: &Assets<Mesh>) -> Bounds {
    let mut bounds = Bounds::EMPTY;
    if let Ok((transform, _, _)) = nodes.get(root) {
        accumulate(root, transform.compute_affine(), nodes, meshes, &mut bounds);
    }
    bounds
}

fn accumulate(
    entity: Entity,
    to_frame: Affine3A,
    nodes: &NodeQuery,
    meshes: &Assets<Mesh>,
    bounds: &mut Bounds,
) {
    let Ok((_, mesh, children)) = nodes.get(entity) else {
        return;
    };

    if let Some(mesh) = mesh.and_then(|handle| meshes.get(&handle.0)) {
        if let Some(aabb) = mesh.compute_aabb() {
            let center = Vec3::from(aabb.center);
            let half = Vec3::from(aabb.half_extents);
            bounds.extend_box(to_frame, center - half, center + half);
        }
    }

    if let Some(children) = children {
        for child in children.iter() {
            if let Ok((child_transform, _, _)) = nodes.get(child) {
                let child_frame = to_frame * child_transform.compute_affine();
                accumulate(child, child_frame, nodes, meshes, bounds);
            }
        }
    }
}

//! Recenter a model at the origin and scale it to a canonical size

use bevy::prelude::*;

use crate::bounds::{subtree_bounds, Bounds, NodeQuery};

/// Move `bounds` (given in the frame `transform` lives in) onto the origin and
/// scale uniformly so the diagonal becomes `target_diagonal`.
///
/// Translation happens first and the factor comes from the pre-scale
/// diagonal, so the scale is applied about the already-centered origin.
/// A zero or non-finite diagonal leaves the scale at exactly 1. Rotation is
/// never touched. Returns the bounds after the change.
pub fn normalize_transform(transform: &mut Transform, bounds: Bounds, target_diagonal: f32) -> Bounds {
    if bounds.is_empty() {
        return bounds;
    }

    let center = bounds.center();
    let factor = scale_factor(bounds.diagonal(), target_diagonal);

    transform.translation = (transform.translation - center) * factor;
    transform.scale *= factor;

    Bounds::new((bounds.min - center) * factor, (bounds.max - center) * factor)
}

/// Uniform factor mapping `diagonal` onto `target`; 1 when undefined
pub fn scale_factor(diagonal: f32, target: f32) -> f32 {
    if diagonal > 0.0 && diagonal.is_finite() {
        let factor = target / diagonal;
        if factor.is_finite() && factor > 0.0 {
            return factor;
        }
    }
    1.0
}

/// Normalize the subtree below `root` in place and return its recomputed
/// bounds. `None` if `root` is not a scene node.
pub fn normalize_subtree(
    root: Entity,
    nodes: &mut NodeQuery,
    meshes: &Assets<Mesh>,
    target_diagonal: f32,
) -> Option<Bounds> {
    let before = subtree_bounds(root, nodes, meshes);
    {
        let (mut transform, _, _) = nodes.get_mut(root).ok()?;
        normalize_transform(&mut transform, before, target_diagonal);
    }
    Some(subtree_bounds(root, nodes, meshes))
}

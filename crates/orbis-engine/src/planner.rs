//! Surface path planning.
//!
//! The planner is a pure function of the terrain and the endpoints: it
//! subdivides the chord between two surface points and re-projects each
//! sample onto the terrain, yielding a surface-following polyline. Normalized
//! linear interpolation keeps the math to adds, multiplies, and square
//! roots, which is what keeps two participants' plans bit-identical.

use orbis_core::math::Vec3;

use crate::terrain::{project_to_surface, TerrainField};

/// Target chord length of one path segment, in world units.
const SEGMENT_LENGTH: f64 = 12.0;

/// Upper bound on planned segments for a single move.
const MAX_SEGMENTS: usize = 32;

/// Plan a surface path from `start` to `end` (both projected to the surface
/// first). The returned points exclude the start and include the final
/// destination, ordered along the path.
pub fn plan_surface_path(terrain: &dyn TerrainField, start: Vec3, end: Vec3) -> Vec<Vec3> {
    let from = project_to_surface(terrain, start);
    let to = project_to_surface(terrain, end);

    let chord = from.distance(to);
    if chord <= f64::EPSILON {
        return vec![to];
    }

    let segments = ((chord / SEGMENT_LENGTH).ceil() as usize).clamp(1, MAX_SEGMENTS);

    let from_dir = from.normalized_or_up();
    let to_dir = to.normalized_or_up();

    // Antipodal endpoints make the interpolated direction vanish; nudge the
    // midpoint sideways so the path picks one hemisphere deterministically.
    let detour = if from_dir.add(to_dir).length_squared() <= 1e-9 {
        Some(pick_detour_axis(from_dir))
    } else {
        None
    };

    let mut points = Vec::with_capacity(segments);
    for i in 1..=segments {
        let t = i as f64 / segments as f64;
        let mut dir = from_dir.lerp(to_dir, t);
        if let Some(axis) = detour {
            // Blend in the detour axis, strongest at the midpoint.
            let bulge = 1.0 - (2.0 * t - 1.0) * (2.0 * t - 1.0);
            dir = dir.add(axis * bulge);
        }
        let dir = dir.normalized_or_up();
        points.push(dir * terrain.radius(dir));
    }
    points
}

/// A deterministic axis orthogonal to `dir` for antipodal detours.
fn pick_detour_axis(dir: Vec3) -> Vec3 {
    let candidate = dir.cross(Vec3::UNIT_Y);
    candidate
        .try_normalized()
        .unwrap_or_else(|| dir.cross(Vec3::new(1.0, 0.0, 0.0)).normalized_or_up())
}

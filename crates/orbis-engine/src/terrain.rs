//! Terrain surface queries.
//!
//! A terrain field maps a unit direction to a surface radius. It is
//! immutable input to the simulation: nothing in the core mutates it, and if
//! terrain editing is ever added the mutation must arrive as a command.

use orbis_core::math::Vec3;

/// Pure function from a unit direction to the surface radius along it.
pub trait TerrainField: Send + Sync {
    fn radius(&self, dir: Vec3) -> f64;
}

/// A perfectly round planet.
#[derive(Debug, Clone, Copy)]
pub struct UniformSphere {
    pub radius: f64,
}

impl UniformSphere {
    pub fn new(radius: f64) -> Self {
        assert!(radius > 0.0, "sphere radius must be positive");
        Self { radius }
    }
}

impl TerrainField for UniformSphere {
    fn radius(&self, _dir: Vec3) -> f64 {
        self.radius
    }
}

/// A sphere with deterministic polynomial undulation.
///
/// The bump term is a low-order polynomial of the direction components, so
/// the field needs no trigonometry and evaluates bit-identically everywhere.
#[derive(Debug, Clone, Copy)]
pub struct RollingTerrain {
    pub base_radius: f64,
    pub amplitude: f64,
}

impl RollingTerrain {
    pub fn new(base_radius: f64, amplitude: f64) -> Self {
        assert!(
            base_radius > amplitude.abs(),
            "terrain amplitude must not reach the planet core"
        );
        Self {
            base_radius,
            amplitude,
        }
    }
}

impl TerrainField for RollingTerrain {
    fn radius(&self, dir: Vec3) -> f64 {
        let ridges = dir.x * dir.y + dir.y * dir.z + dir.z * dir.x;
        let basins = dir.x * dir.x * dir.z;
        self.base_radius + self.amplitude * (ridges + 0.5 * basins)
    }
}

/// Project an arbitrary point onto the terrain surface along its radial.
///
/// Degenerate points at the planet core project to the up-axis surface
/// point rather than producing NaN.
pub fn project_to_surface(terrain: &dyn TerrainField, point: Vec3) -> Vec3 {
    let dir = point.normalized_or_up();
    dir * terrain.radius(dir)
}

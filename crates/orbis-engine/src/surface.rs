//! Canonical state projection and content hashing.
//!
//! [`project`] reduces a [`WorldModel`] to exactly its authoritative fields
//! under the canonical encoding: floats as fixed-precision decimal strings
//! with normalized negative zero, booleans as 0/1, units and waypoints in
//! declared key order, maps as id-sorted lists. The projection is a pure
//! function: projecting an unchanged world twice yields byte-identical
//! output, which is what makes [`hash`] a meaningful equality witness
//! between two participants.
//!
//! The surface types themselves are the render-field allowlist: they have no
//! place to put a mesh, a particle buffer, or a selection glow, so excluded
//! state cannot leak into the hash by construction.

use serde::{Deserialize, Serialize};

use orbis_core::canon::{canon_bool, canon_f64};
use orbis_core::math::{Quat, Vec3};
use orbis_core::rng::RngState;

use crate::world::{Unit, Waypoint, WaypointState, WorldModel};

// ---------------------------------------------------------------------------
// Surface types
// ---------------------------------------------------------------------------

/// Canonical projection of the full authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceState {
    pub tick: u64,
    pub rng: RngState,
    pub id_counter: u64,
    pub selected_unit_id: Option<u64>,
    /// Units sorted by id ascending.
    pub units: Vec<SurfaceUnit>,
}

/// Canonical projection of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceUnit {
    pub id: u64,
    pub position: [String; 3],
    pub quaternion: [String; 4],
    pub velocity: [String; 3],
    pub speed: String,
    pub health: u32,
    pub paused: u8,
    pub waypoints: Vec<SurfaceWaypoint>,
    pub path_closed: u8,
    pub target_waypoint_id: Option<u64>,
    pub last_waypoint_id: Option<u64>,
    pub commands: Vec<String>,
    pub current_command_index: u32,
}

/// Canonical projection of one waypoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceWaypoint {
    pub id: u64,
    pub position: [String; 3],
    pub state: String,
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn canon_vec3(v: Vec3) -> [String; 3] {
    [canon_f64(v.x), canon_f64(v.y), canon_f64(v.z)]
}

fn canon_quat(q: Quat) -> [String; 4] {
    [
        canon_f64(q.x),
        canon_f64(q.y),
        canon_f64(q.z),
        canon_f64(q.w),
    ]
}

fn waypoint_state_name(state: WaypointState) -> &'static str {
    match state {
        WaypointState::Neutral => "neutral",
        WaypointState::Approaching => "approaching",
        WaypointState::Left => "left",
    }
}

fn project_waypoint(w: &Waypoint) -> SurfaceWaypoint {
    SurfaceWaypoint {
        id: w.id,
        position: canon_vec3(w.position),
        state: waypoint_state_name(w.state).to_owned(),
    }
}

fn project_unit(u: &Unit) -> SurfaceUnit {
    SurfaceUnit {
        id: u.id.0,
        position: canon_vec3(u.position),
        quaternion: canon_quat(u.orientation),
        velocity: canon_vec3(u.velocity),
        speed: canon_f64(u.speed),
        health: u.health,
        paused: canon_bool(u.paused),
        waypoints: u.waypoints.iter().map(project_waypoint).collect(),
        path_closed: canon_bool(u.path_closed),
        target_waypoint_id: u.target_waypoint_id,
        last_waypoint_id: u.last_waypoint_id,
        commands: u.commands.iter().map(|c| c.to_string()).collect(),
        current_command_index: u.current_command_index,
    }
}

/// Project the world onto its canonical authoritative surface.
pub fn project(world: &WorldModel) -> SurfaceState {
    SurfaceState {
        tick: world.tick(),
        rng: world.rng_state(),
        id_counter: world.id_counter(),
        selected_unit_id: world.selected_unit_id().map(|id| id.0),
        units: world.units().map(project_unit).collect(),
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// The canonical byte encoding fed to the hash.
pub fn canonical_bytes(surface: &SurfaceState) -> Vec<u8> {
    serde_json::to_vec(surface)
        .expect("surface state is a closed tree of JSON-serializable fields")
}

/// BLAKE3 hex digest of the canonical encoding. Depends only on the bytes,
/// never on iteration order or memory addresses.
pub fn hash(surface: &SurfaceState) -> String {
    blake3::hash(&canonical_bytes(surface)).to_hex().to_string()
}

/// Convenience: project and hash in one step.
pub fn world_hash(world: &WorldModel) -> String {
    hash(&project(world))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The authoritative world model.
//!
//! [`WorldModel`] is the single mutable aggregate holding everything that
//! affects future ticks: the unit table (in id order), the selection, the
//! seeded RNG, and the id allocator. It is also the single place where
//! commands change that state -- [`WorldModel::apply`] dispatches one
//! command, [`WorldModel::advance`] runs one tick.
//!
//! Soft failures (commands targeting unknown units, unrecognized wire tags)
//! are logged and dropped. Internal invariant breaches (duplicate unit id,
//! a target waypoint missing from its own list) abort the tick with a
//! diagnostic snapshot in the panic payload: they indicate a bug, not a
//! runtime condition.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use orbis_core::command::{Command, CommandId, CommandKind, CommandQueue};
use orbis_core::id::{IdAllocator, UnitId};
use orbis_core::math::{Quat, Vec3};
use orbis_core::rng::{RngState, SeededRng};

use crate::planner::plan_surface_path;
use crate::terrain::{project_to_surface, TerrainField};

/// Default movement speed cap, world units per second.
pub const DEFAULT_SPEED: f64 = 8.0;

/// Default unit health.
pub const DEFAULT_HEALTH: u32 = 100;

/// Minimum waypoint count for a closed (cyclic) path.
pub const MIN_CYCLE_POINTS: usize = 3;

// ---------------------------------------------------------------------------
// Waypoint
// ---------------------------------------------------------------------------

/// Logical state of one waypoint along a unit's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointState {
    Neutral,
    Approaching,
    Left,
}

/// One point of a unit's path. Waypoint ids are borrowed from the command
/// that produced them: a `Move` destination carries its command's numeric
/// id, intermediate planner points and `SetPath` points draw fresh ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    pub id: u64,
    pub position: Vec3,
    pub state: WaypointState,
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// Authoritative state of one unit. Render concerns (meshes, particles,
/// selection glow) live entirely outside this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: UnitId,
    /// Position on the terrain surface.
    pub position: Vec3,
    #[serde(rename = "quaternion")]
    pub orientation: Quat,
    pub velocity: Vec3,
    /// Speed cap, world units per second.
    pub speed: f64,
    pub health: u32,
    pub paused: bool,
    pub waypoints: Vec<Waypoint>,
    pub path_closed: bool,
    pub target_waypoint_id: Option<u64>,
    pub last_waypoint_id: Option<u64>,
    /// Ids of commands applied to this unit, in application order.
    pub commands: Vec<CommandId>,
    /// Index into `commands` of the command currently executing. Equal to
    /// `commands.len()` when nothing is pending.
    pub current_command_index: u32,
}

// ---------------------------------------------------------------------------
// WorldModel
// ---------------------------------------------------------------------------

/// The authoritative entity table plus everything it owns.
pub struct WorldModel {
    tick: u64,
    units: BTreeMap<UnitId, Unit>,
    selected_unit_id: Option<UnitId>,
    rng: SeededRng,
    ids: IdAllocator,
    terrain: Arc<dyn TerrainField>,
}

impl WorldModel {
    /// A fresh world at tick 0 with an empty unit table.
    pub fn new(seed: u32, terrain: Arc<dyn TerrainField>) -> Self {
        Self {
            tick: 0,
            units: BTreeMap::new(),
            selected_unit_id: None,
            rng: SeededRng::new(seed),
            ids: IdAllocator::new(),
            terrain,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Units in id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn selected_unit_id(&self) -> Option<UnitId> {
        self.selected_unit_id
    }

    pub fn rng_state(&self) -> RngState {
        self.rng.state()
    }

    pub fn id_counter(&self) -> u64 {
        self.ids.state()
    }

    /// Mutable access to the id allocator, for the input factory. Entity ids
    /// and command ids draw from this single counter.
    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    // -- tick protocol ------------------------------------------------------

    /// Run one tick: advance the counter, apply this tick's commands in
    /// flush order, then step every unit in id order.
    pub fn advance(&mut self, dt_seconds: f64, queue: &mut CommandQueue) {
        self.tick += 1;
        let commands = queue.flush(self.tick);
        // Command ids were drawn from the issuer's allocator. Observing them
        // advances this participant's counter past every minted id before
        // any entity allocation this tick, which is what keeps spectators
        // and remote peers allocating the same unit ids as the issuer.
        if let Some(max_raw) = commands.iter().map(|c| c.id.raw()).max() {
            if max_raw + 1 > self.ids.state() {
                self.ids.set_state(max_raw + 1);
            }
        }
        for cmd in &commands {
            self.apply(cmd);
        }
        let ids: Vec<UnitId> = self.units.keys().copied().collect();
        for id in ids {
            self.step_unit(id, dt_seconds);
        }
        debug!(tick = self.tick, units = self.units.len(), "tick completed");
    }

    /// Dispatch a single command. Commands addressing unknown units are
    /// warn-logged and dropped; unknown wire tags likewise. Neither aborts
    /// the tick.
    pub fn apply(&mut self, cmd: &Command) {
        match &cmd.kind {
            CommandKind::Spawn { position } => self.apply_spawn(cmd.id, *position),
            CommandKind::Select { unit_id } => {
                if self.units.contains_key(unit_id) {
                    self.selected_unit_id = Some(*unit_id);
                } else {
                    warn_missing_unit("Select", *unit_id);
                }
            }
            CommandKind::Deselect => {
                self.selected_unit_id = None;
            }
            CommandKind::Move { unit_id, position } => self.apply_move(cmd, *unit_id, *position),
            CommandKind::SetPath { unit_id, points } => {
                self.apply_set_path(cmd, *unit_id, points);
            }
            CommandKind::ClosePath { unit_id } => self.apply_close_path(cmd, *unit_id),
            CommandKind::Stop { unit_id } => self.apply_stop(cmd, *unit_id),
            CommandKind::MoveDir { unit_id, direction } => {
                self.apply_move_dir(cmd, *unit_id, *direction);
            }
            CommandKind::Despawn { unit_id } => self.apply_despawn(*unit_id),
            CommandKind::Unknown { tag } => {
                warn!(id = %cmd.id, tag = %tag, "dropping command with unknown tag");
            }
        }
    }

    // -- command semantics --------------------------------------------------

    fn apply_spawn(&mut self, cmd_id: CommandId, position: Vec3) {
        let id = UnitId(self.ids.next());
        let position = project_to_surface(self.terrain.as_ref(), position);
        let up = position.normalized_or_up();

        // Random initial heading in the tangent plane. Consumes the core RNG
        // so every participant spawns the unit facing the same way.
        let (t1, t2) = tangent_basis(up);
        let a = self.rng.next_f64() * 2.0 - 1.0;
        let b = self.rng.next_f64() * 2.0 - 1.0;
        let heading = t1 * a + t2 * b;
        let orientation = Quat::look_rotation(heading.try_normalized().unwrap_or(t1), up);

        let unit = Unit {
            id,
            position,
            orientation,
            velocity: Vec3::ZERO,
            speed: DEFAULT_SPEED,
            health: DEFAULT_HEALTH,
            paused: false,
            waypoints: Vec::new(),
            path_closed: false,
            target_waypoint_id: None,
            last_waypoint_id: None,
            commands: vec![cmd_id],
            current_command_index: 0,
        };
        if self.units.insert(id, unit).is_some() {
            self.abort_tick(&format!("duplicate unit id {id}"));
        }
        debug!(unit = %id, "spawned unit");
    }

    fn apply_move(&mut self, cmd: &Command, unit_id: UnitId, position: Vec3) {
        let Some(start) = self.units.get(&unit_id).map(|u| u.position) else {
            warn_missing_unit("Move", unit_id);
            return;
        };

        let points = plan_surface_path(self.terrain.as_ref(), start, position);
        let count = points.len();
        let mut waypoints = Vec::with_capacity(count);
        for (i, p) in points.into_iter().enumerate() {
            // The destination borrows the Move command's numeric id;
            // intermediate planner points draw fresh ids.
            let wp_id = if i + 1 == count {
                cmd.id.raw()
            } else {
                self.ids.next()
            };
            waypoints.push(Waypoint {
                id: wp_id,
                position: p,
                state: if i == 0 {
                    WaypointState::Approaching
                } else {
                    WaypointState::Neutral
                },
            });
        }

        let Some(unit) = self.units.get_mut(&unit_id) else {
            return;
        };
        unit.target_waypoint_id = waypoints.first().map(|w| w.id);
        unit.waypoints = waypoints;
        unit.path_closed = false;
        // The old anchor waypoint is gone with the old list.
        unit.last_waypoint_id = None;
        unit.paused = false;
        record_command(unit, cmd.id);
    }

    fn apply_set_path(&mut self, cmd: &Command, unit_id: UnitId, points: &[Vec3]) {
        if !self.units.contains_key(&unit_id) {
            warn_missing_unit("SetPath", unit_id);
            return;
        }

        let terrain = Arc::clone(&self.terrain);
        let mut waypoints = Vec::with_capacity(points.len());
        for p in points {
            waypoints.push(Waypoint {
                id: self.ids.next(),
                position: project_to_surface(terrain.as_ref(), *p),
                state: WaypointState::Neutral,
            });
        }
        if let Some(first) = waypoints.first_mut() {
            first.state = WaypointState::Approaching;
        }

        let Some(unit) = self.units.get_mut(&unit_id) else {
            return;
        };
        unit.target_waypoint_id = waypoints.first().map(|w| w.id);
        unit.waypoints = waypoints;
        unit.path_closed = false;
        unit.last_waypoint_id = None;
        record_command(unit, cmd.id);
    }

    fn apply_close_path(&mut self, cmd: &Command, unit_id: UnitId) {
        let Some(unit) = self.units.get_mut(&unit_id) else {
            warn_missing_unit("ClosePath", unit_id);
            return;
        };
        if unit.waypoints.len() >= MIN_CYCLE_POINTS {
            unit.path_closed = true;
        } else {
            warn!(
                unit = %unit_id,
                points = unit.waypoints.len(),
                "ClosePath needs at least {MIN_CYCLE_POINTS} waypoints; ignored"
            );
        }
        record_command(unit, cmd.id);
    }

    fn apply_stop(&mut self, cmd: &Command, unit_id: UnitId) {
        let Some(unit) = self.units.get_mut(&unit_id) else {
            warn_missing_unit("Stop", unit_id);
            return;
        };
        unit.velocity = Vec3::ZERO;
        unit.target_waypoint_id = None;
        record_command(unit, cmd.id);
    }

    fn apply_move_dir(&mut self, cmd: &Command, unit_id: UnitId, direction: Vec3) {
        let Some(unit) = self.units.get_mut(&unit_id) else {
            warn_missing_unit("MoveDir", unit_id);
            return;
        };
        let up = unit.position.normalized_or_up();
        unit.velocity = direction
            .reject_onto(up)
            .try_normalized()
            .map_or(Vec3::ZERO, |d| d * unit.speed);
        unit.target_waypoint_id = None;
        record_command(unit, cmd.id);
    }

    fn apply_despawn(&mut self, unit_id: UnitId) {
        if self.units.remove(&unit_id).is_none() {
            warn_missing_unit("Despawn", unit_id);
            return;
        }
        if self.selected_unit_id == Some(unit_id) {
            self.selected_unit_id = None;
        }
        debug!(unit = %unit_id, "despawned unit");
    }

    // -- movement -----------------------------------------------------------

    fn step_unit(&mut self, id: UnitId, dt: f64) {
        // Take the unit out of the table for the duration of the step so the
        // terrain and invariant machinery stay freely borrowable.
        let Some(mut unit) = self.units.remove(&id) else {
            return;
        };
        if !unit.paused {
            self.integrate(&mut unit, dt);
        }
        self.units.insert(id, unit);
    }

    fn integrate(&mut self, unit: &mut Unit, dt: f64) {
        if let Some(target_id) = unit.target_waypoint_id {
            let Some(target_idx) = unit.waypoints.iter().position(|w| w.id == target_id) else {
                self.abort_tick(&format!(
                    "unit {} targets waypoint {target_id} missing from its own list",
                    unit.id
                ));
            };
            let target_pos = unit.waypoints[target_idx].position;
            let to_target = target_pos.sub(unit.position);
            let remaining = to_target.length();
            let step_len = unit.speed * dt;

            if remaining <= step_len {
                // Arrival tick: the interpolation parameter crosses the
                // target's path index within this step.
                unit.position = project_to_surface(self.terrain.as_ref(), target_pos);
                self.arrive(unit, target_idx);
            } else {
                let up = unit.position.normalized_or_up();
                let dir = to_target
                    .reject_onto(up)
                    .try_normalized()
                    .or_else(|| to_target.try_normalized())
                    .unwrap_or(Vec3::ZERO);
                unit.velocity = dir * unit.speed;
                unit.position = project_to_surface(
                    self.terrain.as_ref(),
                    unit.position.add(unit.velocity * dt),
                );
            }
        } else if unit.velocity.length_squared() > 0.0 {
            // Manual velocity (MoveDir): keep the vector tangent to the
            // surface as the unit rounds the sphere, preserving magnitude.
            let up = unit.position.normalized_or_up();
            let mag = unit.velocity.length().min(unit.speed);
            unit.velocity = unit
                .velocity
                .reject_onto(up)
                .try_normalized()
                .map_or(Vec3::ZERO, |d| d * mag);
            unit.position = project_to_surface(
                self.terrain.as_ref(),
                unit.position.add(unit.velocity * dt),
            );
        }

        if unit.velocity.length_squared() > f64::EPSILON {
            let up = unit.position.normalized_or_up();
            unit.orientation = Quat::look_rotation(unit.velocity, up);
        }
    }

    /// Handle arrival at `waypoints[target_idx]` and pick the next target.
    fn arrive(&mut self, unit: &mut Unit, target_idx: usize) {
        let arrived_id = unit.waypoints[target_idx].id;
        unit.waypoints[target_idx].state = WaypointState::Left;
        unit.last_waypoint_id = Some(arrived_id);

        // Completing the leg retires the command that created it.
        if unit
            .commands
            .get(unit.current_command_index as usize)
            .map(|c| c.raw())
            == Some(arrived_id)
        {
            unit.current_command_index =
                (unit.current_command_index + 1).min(unit.commands.len() as u32);
        }

        let len = unit.waypoints.len();
        let next_idx = if target_idx + 1 < len {
            Some(target_idx + 1)
        } else if unit.path_closed && len >= MIN_CYCLE_POINTS {
            // Wrap-around on a cyclic path: the path index jumps from the
            // end of the list back to zero. The large negative index delta
            // with a near-zero new target index is the lap signature.
            let index_delta = 0.0 - target_idx as f64;
            debug!(unit = %unit.id, index_delta, "cyclic path wrapped");
            Some(0)
        } else {
            None
        };

        match next_idx {
            Some(i) => {
                unit.waypoints[i].state = WaypointState::Approaching;
                unit.target_waypoint_id = Some(unit.waypoints[i].id);
            }
            None => {
                unit.target_waypoint_id = None;
                unit.velocity = Vec3::ZERO;
            }
        }
    }

    // -- snapshot support ---------------------------------------------------

    /// Clone the unit table in id order.
    pub fn snapshot_units(&self) -> Vec<Unit> {
        self.units.values().cloned().collect()
    }

    /// Overwrite the whole authoritative state atomically.
    pub fn restore(
        &mut self,
        tick: u64,
        rng: RngState,
        id_counter: u64,
        selected_unit_id: Option<UnitId>,
        units: Vec<Unit>,
    ) {
        self.tick = tick;
        self.rng.set_state(rng);
        self.ids.set_state(id_counter);
        self.selected_unit_id = selected_unit_id;
        self.units = units.into_iter().map(|u| (u.id, u)).collect();
    }

    // -- invariant machinery ------------------------------------------------

    fn abort_tick(&self, reason: &str) -> ! {
        let diagnostic = serde_json::json!({
            "tick": self.tick,
            "unitCount": self.units.len(),
            "idCounter": self.ids.state(),
            "selectedUnitId": self.selected_unit_id,
        });
        panic!(
            "invariant breach at tick {}: {reason}; diagnostic snapshot: {diagnostic}",
            self.tick
        );
    }
}

fn warn_missing_unit(tag: &str, unit_id: UnitId) {
    warn!(tag, unit = %unit_id, "command targets unknown unit; dropped");
}

fn record_command(unit: &mut Unit, id: CommandId) {
    unit.commands.push(id);
    unit.current_command_index = (unit.commands.len() - 1) as u32;
}

/// A deterministic orthonormal pair spanning the tangent plane at `up`.
fn tangent_basis(up: Vec3) -> (Vec3, Vec3) {
    let t1 = up
        .cross(Vec3::UNIT_Y)
        .try_normalized()
        .unwrap_or_else(|| up.cross(Vec3::new(1.0, 0.0, 0.0)).normalized_or_up());
    let t2 = up.cross(t1).normalized_or_up();
    (t1, t2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

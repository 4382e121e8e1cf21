//! Single-process session wiring.
//!
//! A [`Session`] owns one world with its queue, transport, and loop, and is
//! the unit the verify harness instantiates twice. All the pieces are
//! constructed per session -- nothing is process-global -- so a client world
//! and a spectator world can coexist in one process without interfering.

use std::sync::Arc;

use orbis_core::clock::ClockError;
use orbis_core::config::{ConfigError, SimConfig};

use crate::error::TransportError;
use crate::input::InputFactory;
use crate::simloop::{SimLoop, StepReport};
use crate::surface;
use crate::terrain::TerrainField;
use crate::transport::{Transport, TransportState};
use crate::world::WorldModel;
use orbis_core::command::CommandQueue;

/// The dev-overlay surface: transport state, last save outcome, and (in dev
/// builds of the UI) the last tick hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub transport: TransportState,
    pub tick: u64,
    pub last_tick_hash: String,
    pub last_save: Option<String>,
}

/// One world plus the plumbing that feeds it.
pub struct Session {
    config: SimConfig,
    world: WorldModel,
    queue: CommandQueue,
    transport: Box<dyn Transport>,
    sim: SimLoop,
    headless_now_ms: f64,
    last_save_status: Option<String>,
}

impl Session {
    pub fn new(
        config: SimConfig,
        terrain: Arc<dyn TerrainField>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let world = WorldModel::new(config.rng_seed, terrain);
        let queue = CommandQueue::new(config.mode);
        let sim = SimLoop::new(config.step_ms(), config.max_ticks_per_step);
        Ok(Self {
            config,
            world,
            queue,
            transport,
            sim,
            headless_now_ms: 0.0,
            last_save_status: None,
        })
    }

    pub fn connect(&mut self, now_ms: f64) -> Result<(), TransportError> {
        self.transport.connect(now_ms)
    }

    /// Frame-driven stepping against real wall time.
    pub fn step(&mut self, now_ms: f64) -> Result<StepReport, ClockError> {
        self.headless_now_ms = now_ms;
        self.sim.step(
            now_ms,
            &mut self.world,
            &mut self.queue,
            self.transport.as_mut(),
        )
    }

    /// Headless stepping: exactly one tick, with synthetic time advancing by
    /// Δ per call. Batched transports are flushed first so a command issued
    /// this tick is deliverable by its target tick.
    pub fn run_tick(&mut self) {
        self.headless_now_ms += self.config.step_ms();
        let _ = self.transport.flush();
        self.sim.run_tick(
            self.headless_now_ms,
            &mut self.world,
            &mut self.queue,
            self.transport.as_mut(),
        );
    }

    /// The single ingress for intent. Command ids draw from the same
    /// allocator as unit ids, so issuing commands is itself part of the
    /// deterministic id sequence.
    pub fn input(&mut self) -> InputFactory<'_> {
        let tick = self.world.tick();
        let delay = self.config.input_delay_ticks;
        let Session {
            world, transport, ..
        } = self;
        InputFactory::new(world.ids_mut(), transport.as_mut(), tick, delay)
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    /// Mutable world access for snapshot restore and test setup. Gameplay
    /// mutations go through commands, never through this.
    pub fn world_mut(&mut self) -> &mut WorldModel {
        &mut self.world
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Content hash of the current authoritative state.
    pub fn hash(&self) -> String {
        surface::world_hash(&self.world)
    }

    pub fn note_save_status(&mut self, status: String) {
        self.last_save_status = Some(status);
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            transport: self.transport.state(),
            tick: self.world.tick(),
            last_tick_hash: self.hash(),
            last_save: self.last_save_status.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

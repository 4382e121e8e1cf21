//! The frame-driven simulation loop.
//!
//! [`SimLoop::step`] is the bridge between irregular render frames and the
//! fixed tick sequence: it drains the transport into the command queue,
//! consults the fixed clock, and runs the planned whole number of ticks
//! before returning. It is synchronous -- all pending ticks complete before
//! the caller regains control -- and the returned [`StepReport`] carries the
//! interpolation alpha for the renderer plus frame-drop accounting.

use orbis_core::clock::{ClockError, FixedClock};
use orbis_core::command::CommandQueue;
use tracing::warn;

use crate::transport::Transport;
use crate::world::WorldModel;

/// Outcome of one frame step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Ticks executed this frame.
    pub ticks_run: u32,
    /// Render interpolation alpha in `[0, 1)`. Never authoritative.
    pub alpha: f64,
    /// Whether the catch-up cap discarded time this frame.
    pub frame_drop: bool,
}

/// Drives the accumulator, the queue, and the world tick function.
pub struct SimLoop {
    clock: FixedClock,
    step_seconds: f64,
}

impl SimLoop {
    pub fn new(step_ms: f64, max_ticks_per_step: u32) -> Self {
        Self {
            clock: FixedClock::new(step_ms).with_max_ticks_per_step(max_ticks_per_step),
            step_seconds: step_ms / 1000.0,
        }
    }

    /// Advance the simulation for one real-time frame.
    ///
    /// Order matters: received commands enter the queue before any tick of
    /// this frame runs, so a command targeting the frame's first tick is
    /// applied by it.
    pub fn step(
        &mut self,
        now_ms: f64,
        world: &mut WorldModel,
        queue: &mut CommandQueue,
        transport: &mut dyn Transport,
    ) -> Result<StepReport, ClockError> {
        pump(transport, now_ms, world, queue);

        let plan = self.clock.step(now_ms)?;
        if plan.frame_drop() {
            warn!(
                dropped_ms = plan.dropped_ms,
                "catch-up cap hit; discarding excess frame time"
            );
        }
        for _ in 0..plan.ticks {
            world.advance(self.step_seconds, queue);
        }

        Ok(StepReport {
            ticks_run: plan.ticks,
            alpha: plan.alpha,
            frame_drop: plan.frame_drop(),
        })
    }

    /// Run exactly one tick, bypassing the wall clock. This is the headless
    /// path used by the verify harness and the CLI, where ticks are driven
    /// by iteration count rather than elapsed time.
    pub fn run_tick(
        &mut self,
        now_ms: f64,
        world: &mut WorldModel,
        queue: &mut CommandQueue,
        transport: &mut dyn Transport,
    ) {
        pump(transport, now_ms, world, queue);
        world.advance(self.step_seconds, queue);
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }
}

/// Drain every received envelope into the queue. The queue is the only
/// path onward: nothing here touches the world directly.
fn pump(transport: &mut dyn Transport, now_ms: f64, world: &WorldModel, queue: &mut CommandQueue) {
    for envelope in transport.poll(now_ms) {
        let key = envelope.ordering_key();
        for cmd in envelope.commands {
            queue.enqueue(cmd, key.clone(), world.tick());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::UniformSphere;
    use crate::transport::{LoopbackTransport, Transport};
    use orbis_core::command::{Command, CommandId, CommandKind, CommandQueue, QueueMode};
    use orbis_core::math::Vec3;
    use std::sync::Arc;

    fn setup() -> (SimLoop, WorldModel, CommandQueue, LoopbackTransport) {
        let world = WorldModel::new(1, Arc::new(UniformSphere::new(100.0)));
        let queue = CommandQueue::new(QueueMode::Lockstep);
        let mut transport = LoopbackTransport::new();
        transport.connect(0.0).unwrap();
        (SimLoop::new(50.0, 5), world, queue, transport)
    }

    #[test]
    fn step_runs_whole_elapsed_ticks() {
        let (mut sim, mut world, mut queue, mut transport) = setup();
        sim.step(0.0, &mut world, &mut queue, &mut transport).unwrap();
        let report = sim
            .step(120.0, &mut world, &mut queue, &mut transport)
            .unwrap();
        assert_eq!(report.ticks_run, 2);
        assert_eq!(world.tick(), 2);
        assert!(!report.frame_drop);
    }

    #[test]
    fn commands_pumped_before_ticks_run() {
        let (mut sim, mut world, mut queue, mut transport) = setup();
        sim.step(0.0, &mut world, &mut queue, &mut transport).unwrap();

        transport
            .send(Command::new(
                CommandId::new(1),
                CommandKind::Spawn {
                    position: Vec3::new(0.0, 10.0, 0.0),
                },
                0,
                1,
            ))
            .unwrap();

        // The command targets tick 1; the same frame that runs tick 1 must
        // apply it.
        sim.step(50.0, &mut world, &mut queue, &mut transport).unwrap();
        assert_eq!(world.tick(), 1);
        assert_eq!(world.unit_count(), 1);
    }

    #[test]
    fn frame_drop_reported_after_long_pause() {
        let (mut sim, mut world, mut queue, mut transport) = setup();
        sim.step(0.0, &mut world, &mut queue, &mut transport).unwrap();
        let report = sim
            .step(10_000.0, &mut world, &mut queue, &mut transport)
            .unwrap();
        assert_eq!(report.ticks_run, 5, "capped at the configured maximum");
        assert!(report.frame_drop);
    }

    #[test]
    fn run_tick_ignores_wall_clock() {
        let (mut sim, mut world, mut queue, mut transport) = setup();
        for i in 0..10 {
            sim.run_tick(i as f64 * 50.0, &mut world, &mut queue, &mut transport);
        }
        assert_eq!(world.tick(), 10);
    }
}

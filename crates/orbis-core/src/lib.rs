//! Orbis core -- leaf components of the deterministic simulation kernel.
//!
//! This crate holds everything beneath the world model: the fixed-timestep
//! clock, the seeded random stream, the monotonic id allocator, the typed
//! command model with its tick-scheduled queue, the canonical float
//! encoding used for state hashing, and run configuration.
//!
//! Everything here is world-scoped: a simulation instance constructs its own
//! clock, RNG, allocator, and queue, so two worlds in one process (the
//! verify harness runs exactly that) never interfere.
//!
//! # Quick Start
//!
//! ```
//! use orbis_core::prelude::*;
//!
//! let mut rng = SeededRng::new(42);
//! let mut ids = IdAllocator::new();
//! let mut queue = CommandQueue::new(QueueMode::Lockstep);
//!
//! let cmd = Command::new(
//!     CommandId::new(ids.next()),
//!     CommandKind::Spawn { position: Vec3::new(0.0, 10.0, 0.0) },
//!     0,
//!     1,
//! );
//! queue.enqueue(cmd, OrderingKey { client_id: "local".into(), seq: 1 }, 0);
//!
//! assert_eq!(queue.flush(1).len(), 1);
//! assert!((0.0..1.0).contains(&rng.next_f64()));
//! ```

#![deny(unsafe_code)]

pub mod canon;
pub mod clock;
pub mod command;
pub mod config;
pub mod id;
pub mod math;
pub mod rng;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::canon::{canon_bool, canon_f64};
    pub use crate::clock::{ClockError, FixedClock, StepPlan};
    pub use crate::command::{
        Command, CommandId, CommandKind, CommandQueue, OrderingKey, QueueMode,
    };
    pub use crate::config::{ConfigError, SimConfig};
    pub use crate::id::{IdAllocator, UnitId};
    pub use crate::math::{Quat, Vec3};
    pub use crate::rng::{RngState, SeededRng};
}

//! Orbis engine -- the deterministic simulation kernel above the leaves.
//!
//! This crate assembles the core components into a running simulation: the
//! authoritative [`world::WorldModel`], the canonical [`surface`] projection
//! with content hashing, the frame-driven [`simloop::SimLoop`], the
//! [`transport`] relays (loopback and broadcast), the [`input::InputFactory`]
//! ingress, snapshot [`persist`]ence, and the [`verify`] dual-run harness.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use orbis_engine::prelude::*;
//!
//! let config = SimConfig { rng_seed: 42, ..Default::default() };
//! let mut session = Session::new(
//!     config,
//!     Arc::new(UniformSphere::new(100.0)),
//!     Box::new(LoopbackTransport::new()),
//! ).unwrap();
//! session.connect(0.0).unwrap();
//!
//! session.input().spawn(Vec3::new(0.0, 10.0, 0.0)).unwrap();
//! session.run_tick();
//!
//! assert_eq!(session.world().unit_count(), 1);
//! assert_eq!(session.hash().len(), 64);
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod input;
pub mod persist;
pub mod planner;
pub mod session;
pub mod simloop;
pub mod surface;
pub mod terrain;
pub mod transport;
pub mod verify;
pub mod world;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::error::{PersistError, TransportError};
    pub use crate::input::InputFactory;
    pub use crate::persist::{
        load, save, InMemoryRowClient, LocalStore, RemoteStore, SaveEnvelope, SnapshotStore,
    };
    pub use crate::session::{Session, SessionStatus};
    pub use crate::simloop::{SimLoop, StepReport};
    pub use crate::surface::{hash, project, world_hash, SurfaceState};
    pub use crate::terrain::{project_to_surface, RollingTerrain, TerrainField, UniformSphere};
    pub use crate::transport::{
        BroadcastHub, BroadcastTransport, Envelope, LoopbackTransport, Transport, TransportState,
    };
    pub use crate::verify::{run_dual, CommandScript, ScriptEntry, ScriptOp, VerifyReport};
    pub use crate::world::{Unit, Waypoint, WaypointState, WorldModel};
    pub use orbis_core::prelude::*;
}

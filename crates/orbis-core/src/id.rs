//! Monotonic identifier allocation.
//!
//! One [`IdAllocator`] per world hands out every identifier the simulation
//! mints: unit ids and command ids draw from the same counter, so the
//! counter value is authoritative state and travels inside snapshots. In a
//! lockstep session every participant allocates from the same logical
//! counter because all participants execute the same command stream against
//! equal starting state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default first identifier handed out by a fresh allocator.
pub const ID_BASE: u64 = 1;

// ---------------------------------------------------------------------------
// UnitId
// ---------------------------------------------------------------------------

/// Identifier of a unit entity. Strictly monotonic, never reused in a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Strictly increasing integer allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
    base: u64,
}

impl IdAllocator {
    /// Allocator starting at [`ID_BASE`].
    pub fn new() -> Self {
        Self::with_base(ID_BASE)
    }

    /// Allocator starting at a configured base.
    pub fn with_base(base: u64) -> Self {
        Self { next: base, base }
    }

    /// Return the current counter value and advance it.
    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Restore the counter to its configured base.
    pub fn reset(&mut self) {
        self.next = self.base;
    }

    /// The value the next call to [`next`](Self::next) will return.
    pub fn state(&self) -> u64 {
        self.next
    }

    /// Overwrite the counter, e.g. when restoring a snapshot.
    pub fn set_state(&mut self, next: u64) {
        self.next = next;
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

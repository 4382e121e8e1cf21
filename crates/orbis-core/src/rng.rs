//! Seeded deterministic random number stream.
//!
//! The generator is a Mulberry32-class recurrence: the internal word walks a
//! Weyl sequence (`word += WEYL_INCREMENT` per draw) and each output is a
//! stateless scramble of that word. Two consequences matter for lockstep
//! simulation:
//!
//! - The stream is a pure function of `(seed, call_count)`: the word after
//!   `n` draws is `seed + n * WEYL_INCREMENT (mod 2^32)`, so
//!   [`SeededRng::set_state`] restores any position in O(1) without
//!   replaying draws.
//! - Only fixed-width `u32` arithmetic is used (no floating-point
//!   transcendentals, no wall-clock reseeding), so output is byte-identical
//!   on every target platform.

use serde::{Deserialize, Serialize};

/// Weyl sequence increment for the Mulberry32 recurrence.
const WEYL_INCREMENT: u32 = 0x6D2B_79F5;

/// Stateless output scramble for one Weyl word.
fn scramble(word: u32) -> u32 {
    let mut t = word;
    t = (t ^ (t >> 15)).wrapping_mul(t | 1);
    t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
    t ^ (t >> 14)
}

// ---------------------------------------------------------------------------
// RngState
// ---------------------------------------------------------------------------

/// Serializable generator position: the seed plus the number of draws taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RngState {
    pub seed: u32,
    pub call_count: u64,
}

// ---------------------------------------------------------------------------
// SeededRng
// ---------------------------------------------------------------------------

/// Deterministic stream of uniform values, restorable from `(seed, call_count)`.
#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: u32,
    call_count: u64,
    word: u32,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            call_count: 0,
            word: seed,
        }
    }

    /// Next raw 32-bit draw.
    pub fn next_u32(&mut self) -> u32 {
        self.word = self.word.wrapping_add(WEYL_INCREMENT);
        self.call_count += 1;
        scramble(self.word)
    }

    /// Uniform value in `[0, 1)`.
    ///
    /// The draw is the 32-bit output divided by 2^32; the division is exact
    /// in `f64` so the result is platform-stable.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Uniform integer in `[0, n)` via the fixed-point multiply-shift
    /// reduction (no modulo bias amplification, no floating point).
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn next_u32_below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "next_u32_below requires n > 0");
        ((u64::from(self.next_u32()) * u64::from(n)) >> 32) as u32
    }

    /// Restore the generator to its initial state for `seed`.
    pub fn reset(&mut self, seed: u32) {
        self.seed = seed;
        self.call_count = 0;
        self.word = seed;
    }

    /// Current position, suitable for snapshots.
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            call_count: self.call_count,
        }
    }

    /// Jump directly to a previously captured position.
    pub fn set_state(&mut self, state: RngState) {
        self.seed = state.seed;
        self.call_count = state.call_count;
        // The Weyl walk advances by a constant per draw, so the word at any
        // call count is directly computable.
        self.word = state
            .seed
            .wrapping_add(WEYL_INCREMENT.wrapping_mul(state.call_count as u32));
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Wall-clock to fixed-tick accumulator.
//!
//! [`FixedClock::step`] converts irregular real-time frame timestamps into a
//! whole number of fixed-Δ simulation ticks plus an interpolation alpha for
//! the renderer. However wall time is chunked into frames, the long-run tick
//! count is `⌊elapsed / Δ⌋` (modulo the catch-up cap), which is what keeps
//! two participants with different frame rates on the same tick sequence.

use thiserror::Error;

/// Default cap on ticks executed per [`FixedClock::step`] call.
///
/// After a long pause (tab in background, debugger break) the accumulator
/// can hold many Δ of elapsed time; running them all at once would stall the
/// frame. The cap bounds catch-up work and the excess time is discarded and
/// reported as a frame drop.
pub const DEFAULT_MAX_TICKS_PER_STEP: u32 = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by the clock.
#[derive(Debug, Error)]
pub enum ClockError {
    /// The frame timestamp was NaN or infinite.
    #[error("non-finite frame timestamp: {value}")]
    NonFiniteTime { value: f64 },
}

// ---------------------------------------------------------------------------
// StepPlan
// ---------------------------------------------------------------------------

/// Outcome of one accumulator step: how many ticks to run now and where the
/// renderer sits between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPlan {
    /// Whole ticks to execute for this frame.
    pub ticks: u32,
    /// Interpolation alpha `accumulator / Δ` in `[0, 1)`. Render-only; must
    /// never drive authoritative computation.
    pub alpha: f64,
    /// Milliseconds discarded by the catch-up cap. Zero on a healthy frame.
    pub dropped_ms: f64,
}

impl StepPlan {
    /// Whether the catch-up cap discarded time this frame.
    pub fn frame_drop(&self) -> bool {
        self.dropped_ms > 0.0
    }
}

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

/// Fixed-timestep accumulator.
#[derive(Debug, Clone)]
pub struct FixedClock {
    step_ms: f64,
    accumulator_ms: f64,
    last_now_ms: Option<f64>,
    max_ticks_per_step: u32,
}

impl FixedClock {
    /// Create a clock with the given timestep in milliseconds.
    ///
    /// # Panics
    ///
    /// Panics if `step_ms` is not positive and finite.
    pub fn new(step_ms: f64) -> Self {
        assert!(
            step_ms > 0.0 && step_ms.is_finite(),
            "step_ms must be positive and finite, got {step_ms}"
        );
        Self {
            step_ms,
            accumulator_ms: 0.0,
            last_now_ms: None,
            max_ticks_per_step: DEFAULT_MAX_TICKS_PER_STEP,
        }
    }

    /// Override the catch-up cap (must be at least 1).
    pub fn with_max_ticks_per_step(mut self, cap: u32) -> Self {
        assert!(cap >= 1, "catch-up cap must be at least 1");
        self.max_ticks_per_step = cap;
        self
    }

    /// Consume wall time since the previous call and plan this frame's ticks.
    ///
    /// The first call only records the timestamp and plans zero ticks. Time
    /// going backwards clamps the frame delta to zero rather than erroring:
    /// browser clocks are allowed to be weird, the simulation is not.
    pub fn step(&mut self, now_ms: f64) -> Result<StepPlan, ClockError> {
        if !now_ms.is_finite() {
            return Err(ClockError::NonFiniteTime { value: now_ms });
        }

        let delta_ms = match self.last_now_ms {
            None => 0.0,
            Some(last) => (now_ms - last).max(0.0),
        };
        self.last_now_ms = Some(now_ms);
        self.accumulator_ms += delta_ms;

        let whole = (self.accumulator_ms / self.step_ms).floor() as u64;
        let ticks = whole.min(u64::from(self.max_ticks_per_step)) as u32;
        let dropped = (whole - u64::from(ticks)) as f64 * self.step_ms;

        // Carry only the sub-Δ remainder; capped-away whole ticks are
        // discarded, not deferred.
        self.accumulator_ms -= whole as f64 * self.step_ms;
        if self.accumulator_ms < 0.0 {
            self.accumulator_ms = 0.0;
        }

        Ok(StepPlan {
            ticks,
            alpha: self.alpha(),
            dropped_ms: dropped,
        })
    }

    /// Interpolation alpha `accumulator / Δ` in `[0, 1)`.
    pub fn alpha(&self) -> f64 {
        (self.accumulator_ms / self.step_ms).clamp(0.0, 1.0 - f64::EPSILON)
    }

    /// The fixed timestep in milliseconds.
    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Simulation configuration.
//!
//! One [`SimConfig`] describes a whole simulation run. The tick rate fixes Δ
//! for the lifetime of the run; changing it between runs invalidates hash
//! comparability, which is why it also travels in snapshot metadata.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::DEFAULT_MAX_TICKS_PER_STEP;
use crate::command::QueueMode;

/// Errors produced by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tick rate must be in 1..=240 Hz, got {0}")]
    InvalidTickRate(u32),
    #[error("reconnect factor must be >= 1.0 and finite, got {0}")]
    InvalidReconnectFactor(f64),
    #[error("catch-up cap must be at least 1")]
    InvalidCatchUpCap,
    #[error("input delay must be at least 1 tick")]
    InvalidInputDelay,
}

/// Recognized configuration keys with their documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation tick rate in Hz. Δ = 1000 / rate milliseconds.
    pub tick_rate_hz: u32,
    /// Broadcast transport outbound batching interval.
    pub throttle_ms: u64,
    /// Reconnect attempts before the transport enters its error state.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay.
    pub reconnect_base_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub reconnect_factor: f64,
    /// Seed for the world RNG. Required to match across participants.
    pub rng_seed: u32,
    /// Late-command policy.
    pub mode: QueueMode,
    /// Cap on ticks executed per frame (clock catch-up bound).
    pub max_ticks_per_step: u32,
    /// How many ticks ahead of the issue tick commands are scheduled.
    /// The minimum of 1 keeps a command from executing on its issue tick;
    /// broadcast sessions use a larger value to cover transport latency.
    pub input_delay_ticks: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            throttle_ms: 100,
            max_reconnect_attempts: 5,
            reconnect_base_ms: 2000,
            reconnect_factor: 1.5,
            rng_seed: 0,
            mode: QueueMode::Lockstep,
            max_ticks_per_step: DEFAULT_MAX_TICKS_PER_STEP,
            input_delay_ticks: 1,
        }
    }
}

impl SimConfig {
    /// The fixed timestep Δ in milliseconds.
    pub fn step_ms(&self) -> f64 {
        1000.0 / f64::from(self.tick_rate_hz)
    }

    /// The fixed timestep Δ in seconds, as fed to the world each tick.
    pub fn step_seconds(&self) -> f64 {
        1.0 / f64::from(self.tick_rate_hz)
    }

    /// Check every key against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 240 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate_hz));
        }
        if !(self.reconnect_factor >= 1.0 && self.reconnect_factor.is_finite()) {
            return Err(ConfigError::InvalidReconnectFactor(self.reconnect_factor));
        }
        if self.max_ticks_per_step == 0 {
            return Err(ConfigError::InvalidCatchUpCap);
        }
        if self.input_delay_ticks == 0 {
            return Err(ConfigError::InvalidInputDelay);
        }
        Ok(())
    }
}

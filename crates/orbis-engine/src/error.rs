//! Engine error types.
//!
//! Transport and persistence errors return to their direct callers and never
//! surface inside a tick. Soft conditions -- commands targeting unknown
//! entities, unrecognized wire tags -- are not errors at all: they are
//! logged at warn level and recovered locally.

use thiserror::Error;

/// Errors produced by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation requires a connected transport.
    #[error("transport is not connected (state: {state})")]
    NotConnected { state: &'static str },

    /// The underlying channel went away mid-send.
    #[error("transport disconnected")]
    Disconnected,

    /// The outbound queue is full; the caller should retry next frame.
    #[error("transport backpressure: outbound queue full ({queued} commands)")]
    Backpressure { queued: usize },

    /// Reconnection attempts are exhausted; the transport is dead.
    #[error("transport failed after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Errors produced by the persistence layer.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The payload failed its checksum or did not parse.
    #[error("corrupted save: {details}")]
    CorruptedSave { details: String },

    /// The payload was written by a newer incompatible version.
    #[error("incompatible save version {found} (this build reads {supported})")]
    IncompatibleVersion { found: String, supported: String },

    /// The backing store cannot be reached.
    #[error("storage unavailable: {details}")]
    StorageUnavailable { details: String },

    /// The remote row store rejected the credentials.
    #[error("not authenticated with the remote store")]
    NotAuthenticated,

    /// Envelope serialization failed (a bug, not an environment condition).
    #[error("failed to encode save envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

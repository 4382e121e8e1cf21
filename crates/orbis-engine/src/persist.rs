//! Snapshot persistence.
//!
//! [`save`] freezes a world into a versioned, checksummed envelope;
//! [`load`] validates and reopens one; [`SaveEnvelope::restore_into`]
//! overwrites a world atomically. Two backends share the [`SnapshotStore`]
//! interface: a process-local directory of slot files (falling back to
//! memory when the platform storage is unavailable) and an authenticated
//! remote row store reached through the [`RowClient`] seam, which treats
//! saves as opaque bytes at rest.
//!
//! Unit state in the envelope uses serde_json's exact `f64` round-trip
//! encoding -- not the 6-digit canonical hash encoding -- so a restored
//! world continues bit-identically to the run that saved it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use orbis_core::config::SimConfig;
use orbis_core::id::UnitId;
use orbis_core::rng::RngState;

use crate::error::PersistError;
use crate::world::{Unit, WorldModel};

/// Version written into every save envelope. Readers accept any envelope
/// whose major version does not exceed theirs.
pub const SAVE_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Run parameters recorded alongside the state for replay tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub seed: u32,
    pub tick_rate: u32,
    pub implementation_version: String,
}

/// The opaque-at-rest snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub version: String,
    /// Milliseconds since epoch at save time. Advisory only.
    pub saved_at: u64,
    pub tick_count: u64,
    pub rng: RngState,
    pub id_counter: u64,
    pub selected_unit_id: Option<u64>,
    /// Units sorted by id ascending.
    pub units: Vec<Unit>,
    pub metadata: SaveMetadata,
    /// BLAKE3 hex digest over every other field.
    pub checksum: String,
}

impl SaveEnvelope {
    /// Overwrite `world` with this envelope's state.
    pub fn restore_into(&self, world: &mut WorldModel) {
        world.restore(
            self.tick_count,
            self.rng,
            self.id_counter,
            self.selected_unit_id.map(UnitId),
            self.units.clone(),
        );
    }
}

/// Checksum over the envelope minus the checksum field itself.
fn compute_checksum(envelope: &SaveEnvelope) -> Result<String, PersistError> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct HashableEnvelope<'a> {
        version: &'a str,
        saved_at: u64,
        tick_count: u64,
        rng: RngState,
        id_counter: u64,
        selected_unit_id: Option<u64>,
        units: &'a [Unit],
        metadata: &'a SaveMetadata,
    }

    let hashable = HashableEnvelope {
        version: &envelope.version,
        saved_at: envelope.saved_at,
        tick_count: envelope.tick_count,
        rng: envelope.rng,
        id_counter: envelope.id_counter,
        selected_unit_id: envelope.selected_unit_id,
        units: &envelope.units,
        metadata: &envelope.metadata,
    };
    let bytes = serde_json::to_vec(&hashable)?;
    eprintln!("DEBUG_HASHABLE: {}", String::from_utf8_lossy(&bytes));
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}

/// Serialize the world into an envelope.
pub fn save(world: &WorldModel, config: &SimConfig) -> Result<Vec<u8>, PersistError> {
    let mut envelope = SaveEnvelope {
        version: SAVE_VERSION.to_owned(),
        saved_at: unix_millis(),
        tick_count: world.tick(),
        rng: world.rng_state(),
        id_counter: world.id_counter(),
        selected_unit_id: world.selected_unit_id().map(|id| id.0),
        units: world.snapshot_units(),
        metadata: SaveMetadata {
            seed: config.rng_seed,
            tick_rate: config.tick_rate_hz,
            implementation_version: env!("CARGO_PKG_VERSION").to_owned(),
        },
        checksum: String::new(),
    };
    envelope.checksum = compute_checksum(&envelope)?;
    debug!(tick = envelope.tick_count, units = envelope.units.len(), "saved world");
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse and validate an envelope: shape, version, checksum -- in that
/// order, so a corrupted version field reports as corruption rather than
/// incompatibility.
pub fn load(bytes: &[u8]) -> Result<SaveEnvelope, PersistError> {
    let envelope: SaveEnvelope =
        serde_json::from_slice(bytes).map_err(|err| PersistError::CorruptedSave {
            details: format!("envelope does not parse: {err}"),
        })?;

    let supported = major_version(SAVE_VERSION).unwrap_or(0);
    match major_version(&envelope.version) {
        Some(major) if major <= supported => {}
        Some(_) => {
            return Err(PersistError::IncompatibleVersion {
                found: envelope.version,
                supported: SAVE_VERSION.to_owned(),
            });
        }
        None => {
            return Err(PersistError::CorruptedSave {
                details: format!("unparseable version {:?}", envelope.version),
            });
        }
    }

    let expected = compute_checksum(&envelope)?;
    if expected != envelope.checksum {
        return Err(PersistError::CorruptedSave {
            details: format!(
                "checksum mismatch: recorded {} but recomputed {expected}",
                envelope.checksum
            ),
        });
    }
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Keyed storage of opaque snapshot bytes.
pub trait SnapshotStore {
    fn put(&mut self, slot: &str, bytes: &[u8]) -> Result<(), PersistError>;
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistError>;
}

fn validate_slot(slot: &str) -> Result<(), PersistError> {
    let ok = !slot.is_empty()
        && slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PersistError::StorageUnavailable {
            details: format!("invalid slot name {slot:?}"),
        })
    }
}

// ---------------------------------------------------------------------------
// LocalStore
// ---------------------------------------------------------------------------

/// Directory-of-slot-files backend. If the directory cannot be created the
/// store degrades to an in-memory map and saves last only as long as the
/// process.
pub struct LocalStore {
    root: Option<PathBuf>,
    memory: BTreeMap<String, Vec<u8>>,
}

impl LocalStore {
    pub fn open(root: &Path) -> Self {
        match fs::create_dir_all(root) {
            Ok(()) => Self {
                root: Some(root.to_owned()),
                memory: BTreeMap::new(),
            },
            Err(err) => {
                warn!(
                    path = %root.display(),
                    error = %err,
                    "local storage unavailable; falling back to in-memory saves"
                );
                Self {
                    root: None,
                    memory: BTreeMap::new(),
                }
            }
        }
    }

    /// Whether saves are actually reaching disk.
    pub fn is_persistent(&self) -> bool {
        self.root.is_some()
    }

    fn slot_path(root: &Path, slot: &str) -> PathBuf {
        root.join(format!("{slot}.save.json"))
    }
}

impl SnapshotStore for LocalStore {
    fn put(&mut self, slot: &str, bytes: &[u8]) -> Result<(), PersistError> {
        validate_slot(slot)?;
        match &self.root {
            Some(root) => fs::write(Self::slot_path(root, slot), bytes).map_err(|err| {
                PersistError::StorageUnavailable {
                    details: err.to_string(),
                }
            }),
            None => {
                self.memory.insert(slot.to_owned(), bytes.to_vec());
                Ok(())
            }
        }
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistError> {
        validate_slot(slot)?;
        match &self.root {
            Some(root) => match fs::read(Self::slot_path(root, slot)) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(PersistError::StorageUnavailable {
                    details: err.to_string(),
                }),
            },
            None => Ok(self.memory.get(slot).cloned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote row store
// ---------------------------------------------------------------------------

/// The remote row-store seam. Implementations enforce per-user row
/// isolation server-side; the engine only ever addresses its own user's
/// rows and treats the bytes as opaque.
pub trait RowClient {
    fn put_row(&mut self, user_id: &str, key: &str, bytes: &[u8]) -> Result<(), PersistError>;
    fn get_row(&self, user_id: &str, key: &str) -> Result<Option<Vec<u8>>, PersistError>;
}

/// Authenticated snapshot storage over a [`RowClient`].
pub struct RemoteStore<C: RowClient> {
    client: C,
    user_id: String,
    authenticated: bool,
}

impl<C: RowClient> RemoteStore<C> {
    pub fn new(client: C, user_id: &str) -> Self {
        Self {
            client,
            user_id: user_id.to_owned(),
            authenticated: false,
        }
    }

    /// Mark the session authenticated. Real deployments verify the token
    /// with the row-store service; the seam only cares that unauthenticated
    /// access is refused client-side too.
    pub fn authenticate(&mut self, token: &str) -> Result<(), PersistError> {
        if token.is_empty() {
            return Err(PersistError::NotAuthenticated);
        }
        self.authenticated = true;
        Ok(())
    }
}

impl<C: RowClient> SnapshotStore for RemoteStore<C> {
    fn put(&mut self, slot: &str, bytes: &[u8]) -> Result<(), PersistError> {
        validate_slot(slot)?;
        if !self.authenticated {
            return Err(PersistError::NotAuthenticated);
        }
        self.client.put_row(&self.user_id, slot, bytes)
    }

    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, PersistError> {
        validate_slot(slot)?;
        if !self.authenticated {
            return Err(PersistError::NotAuthenticated);
        }
        self.client.get_row(&self.user_id, slot)
    }
}

/// In-process row store used by tests and the verify harness.
pub struct InMemoryRowClient {
    rows: BTreeMap<(String, String), Vec<u8>>,
    available: bool,
}

impl Default for InMemoryRowClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRowClient {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            available: true,
        }
    }

    /// Simulate a backend outage.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }
}

impl RowClient for InMemoryRowClient {
    fn put_row(&mut self, user_id: &str, key: &str, bytes: &[u8]) -> Result<(), PersistError> {
        if !self.available {
            return Err(PersistError::StorageUnavailable {
                details: "row store offline".to_owned(),
            });
        }
        self.rows
            .insert((user_id.to_owned(), key.to_owned()), bytes.to_vec());
        Ok(())
    }

    fn get_row(&self, user_id: &str, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        if !self.available {
            return Err(PersistError::StorageUnavailable {
                details: "row store offline".to_owned(),
            });
        }
        Ok(self
            .rows
            .get(&(user_id.to_owned(), key.to_owned()))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

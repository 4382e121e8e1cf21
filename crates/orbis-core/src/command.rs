//! Typed commands and the tick-scheduled command queue.
//!
//! Every mutation of authoritative state is expressed as a [`Command`]
//! scheduled for a future tick. Commands are minted by the input factory,
//! travel through a transport, and wait in the [`CommandQueue`] until
//! [`CommandQueue::flush`] hands them to the world at their target tick in a
//! globally agreed order. The queue is the only legal path into command
//! application; nothing else may construct a command-in-flight.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::id::UnitId;
use crate::math::Vec3;

// ---------------------------------------------------------------------------
// CommandId
// ---------------------------------------------------------------------------

/// Command identifier, derived from the world's id allocator.
///
/// Serialized as the string `"cmd-<n>"`. The numeric part is meaningful:
/// waypoints created by a `Move` command borrow it as their waypoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The allocator value this id was minted from.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Parse the wire form `"cmd-<n>"`.
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("cmd-")?;
        digits.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

impl Serialize for CommandId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CommandId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CommandId::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("malformed command id: {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// The closed set of command tags and their payloads.
///
/// New operations extend this set. `Unknown` is never constructed locally;
/// it is produced only when decoding a wire command whose tag this build
/// does not recognize, so that a mixed-version peer group can stay in
/// lockstep while the odd peer drops the tag it cannot apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CommandKind {
    /// Mark a unit as selected.
    Select { unit_id: UnitId },
    /// Clear the selection.
    Deselect,
    /// Replace the unit's destination; the world plans the waypoint list.
    Move { unit_id: UnitId, position: Vec3 },
    /// Atomically replace the unit's waypoint list with explicit points.
    SetPath { unit_id: UnitId, points: Vec<Vec3> },
    /// Mark the unit's waypoint list cyclic (requires at least 3 points).
    ClosePath { unit_id: UnitId },
    /// Create a unit at the given position (projected to the surface).
    Spawn { position: Vec3 },
    /// Zero the unit's velocity and detach it from its path.
    Stop { unit_id: UnitId },
    /// Direct velocity control for manual testing.
    MoveDir { unit_id: UnitId, direction: Vec3 },
    /// Remove a unit from the world.
    Despawn { unit_id: UnitId },
    /// Wire tag not in this build's closed set; logged and dropped by apply.
    Unknown { tag: String },
}

impl CommandKind {
    /// The tag string used on the wire.
    pub fn tag(&self) -> &str {
        match self {
            CommandKind::Select { .. } => "Select",
            CommandKind::Deselect => "Deselect",
            CommandKind::Move { .. } => "Move",
            CommandKind::SetPath { .. } => "SetPath",
            CommandKind::ClosePath { .. } => "ClosePath",
            CommandKind::Spawn { .. } => "Spawn",
            CommandKind::Stop { .. } => "Stop",
            CommandKind::MoveDir { .. } => "MoveDir",
            CommandKind::Despawn { .. } => "Despawn",
            CommandKind::Unknown { tag } => tag,
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A scheduled, serializable operation against the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    #[serde(flatten)]
    pub kind: CommandKind,
    /// Tick at which the command was issued.
    pub issued_tick: u64,
    /// Tick at which the command must execute; always `> issued_tick`.
    pub target_tick: u64,
}

impl Command {
    /// Construct a command. Scheduling a command for its own issue tick (or
    /// earlier) is a caller bug, not a runtime condition.
    ///
    /// # Panics
    ///
    /// Panics if `target_tick <= issued_tick`.
    pub fn new(id: CommandId, kind: CommandKind, issued_tick: u64, target_tick: u64) -> Self {
        assert!(
            target_tick > issued_tick,
            "command {id} scheduled for tick {target_tick} at or before its issue tick {issued_tick}"
        );
        Self {
            id,
            kind,
            issued_tick,
            target_tick,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderingKey
// ---------------------------------------------------------------------------

/// Transport-assigned ordering metadata for a command.
///
/// Within one tick, commands execute sorted by client id (lexicographic)
/// then sequence number -- the globally agreed cross-client order. The
/// transport assigns these; they are stripped from the command itself
/// before it reaches the world.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderingKey {
    pub client_id: String,
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// What to do with a command whose target tick has already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Drop late commands (default). A late command means the lockstep
    /// schedule was already violated; executing it now would diverge from
    /// peers that executed it on time.
    Lockstep,
    /// Re-schedule late commands to the next tick. Single-player friendly.
    Relaxed,
}

#[derive(Debug, Clone)]
struct QueuedCommand {
    cmd: Command,
    key: OrderingKey,
    issue_index: u64,
}

/// Tick-scheduled FIFO of typed commands with deterministic flush order.
#[derive(Debug)]
pub struct CommandQueue {
    entries: Vec<QueuedCommand>,
    issue_counter: u64,
    mode: QueueMode,
}

impl CommandQueue {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            entries: Vec::new(),
            issue_counter: 0,
            mode,
        }
    }

    /// Schedule a command. `current_tick` is the last completed tick; a
    /// command whose target tick is not in the future is late and handled
    /// per the queue mode. Returns whether the command was accepted.
    pub fn enqueue(&mut self, mut cmd: Command, key: OrderingKey, current_tick: u64) -> bool {
        if cmd.target_tick <= current_tick {
            match self.mode {
                QueueMode::Lockstep => {
                    warn!(
                        id = %cmd.id,
                        tag = cmd.kind.tag(),
                        target_tick = cmd.target_tick,
                        current_tick,
                        "dropping late command in lockstep mode"
                    );
                    return false;
                }
                QueueMode::Relaxed => {
                    cmd.target_tick = current_tick + 1;
                }
            }
        }
        let issue_index = self.issue_counter;
        self.issue_counter += 1;
        self.entries.push(QueuedCommand {
            cmd,
            key,
            issue_index,
        });
        true
    }

    /// Remove and return exactly the commands targeting `tick`, in the
    /// deterministic execution order: `(client_id, seq)` primary, issuance
    /// index as the stable tiebreaker within a batch.
    pub fn flush(&mut self, tick: u64) -> Vec<Command> {
        let mut due: Vec<QueuedCommand> = Vec::new();
        let mut rest: Vec<QueuedCommand> = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.cmd.target_tick == tick {
                due.push(entry);
            } else {
                rest.push(entry);
            }
        }
        self.entries = rest;

        due.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.issue_index.cmp(&b.issue_index))
        });
        due.into_iter().map(|entry| entry.cmd).collect()
    }

    /// Number of commands waiting for a future tick.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Discard all pending commands.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(id: u64, target_tick: u64) -> Command {
        Command::new(
            CommandId::new(id),
            CommandKind::Deselect,
            target_tick - 1,
            target_tick,
        )
    }

    fn key(client: &str, seq: u64) -> OrderingKey {
        OrderingKey {
            client_id: client.to_owned(),
            seq,
        }
    }

    #[test]
    fn command_id_wire_roundtrip() {
        let id = CommandId::new(42);
        assert_eq!(id.to_string(), "cmd-42");
        assert_eq!(CommandId::parse("cmd-42"), Some(id));
        assert_eq!(CommandId::parse("42"), None);
        assert_eq!(CommandId::parse("cmd-x"), None);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cmd-42\"");
        let back: CommandId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    #[should_panic(expected = "at or before its issue tick")]
    fn target_tick_must_follow_issue_tick() {
        let _ = Command::new(CommandId::new(1), CommandKind::Deselect, 5, 5);
    }

    #[test]
    fn flush_returns_only_matching_tick() {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        queue.enqueue(cmd(1, 3), key("a", 1), 0);
        queue.enqueue(cmd(2, 4), key("a", 2), 0);
        queue.enqueue(cmd(3, 3), key("a", 3), 0);

        let flushed = queue.flush(3);
        assert_eq!(
            flushed.iter().map(|c| c.id.raw()).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(queue.pending_count(), 1);

        // A second flush of the same tick yields nothing: apply-at-most-once.
        assert!(queue.flush(3).is_empty());
    }

    #[test]
    fn flush_orders_by_client_then_seq() {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        // Enqueue in scrambled arrival order.
        queue.enqueue(cmd(10, 2), key("bbb", 1), 0);
        queue.enqueue(cmd(11, 2), key("aaa", 2), 0);
        queue.enqueue(cmd(12, 2), key("aaa", 1), 0);
        queue.enqueue(cmd(13, 2), key("bbb", 2), 0);

        let order: Vec<u64> = queue.flush(2).iter().map(|c| c.id.raw()).collect();
        assert_eq!(order, vec![12, 11, 10, 13]);
    }

    #[test]
    fn same_key_preserves_issue_order() {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        // One envelope carrying several commands shares an ordering key.
        queue.enqueue(cmd(1, 2), key("a", 7), 0);
        queue.enqueue(cmd(2, 2), key("a", 7), 0);
        queue.enqueue(cmd(3, 2), key("a", 7), 0);

        let order: Vec<u64> = queue.flush(2).iter().map(|c| c.id.raw()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn lockstep_drops_late_commands() {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        assert!(!queue.enqueue(cmd(1, 3), key("a", 1), 5));
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn relaxed_reschedules_late_commands() {
        let mut queue = CommandQueue::new(QueueMode::Relaxed);
        assert!(queue.enqueue(cmd(1, 3), key("a", 1), 5));
        assert!(queue.flush(6).iter().any(|c| c.id.raw() == 1));
    }

    #[test]
    fn reset_clears_pending() {
        let mut queue = CommandQueue::new(QueueMode::Lockstep);
        queue.enqueue(cmd(1, 2), key("a", 1), 0);
        queue.reset();
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn command_json_shape_is_tag_and_payload() {
        let c = Command::new(
            CommandId::new(9),
            CommandKind::Move {
                unit_id: UnitId(4),
                position: Vec3::new(1.0, 2.0, 3.0),
            },
            1,
            2,
        );
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["id"], "cmd-9");
        assert_eq!(value["type"], "Move");
        assert_eq!(value["payload"]["unit_id"], 4);
        assert_eq!(value["issued_tick"], 1);
        assert_eq!(value["target_tick"], 2);

        let back: Command = serde_json::from_value(value).unwrap();
        assert_eq!(back, c);
    }
}

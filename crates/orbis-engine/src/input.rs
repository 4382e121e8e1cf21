//! The single ingress for user intent.
//!
//! [`InputFactory`] is the only place commands are constructed. UI handlers,
//! AI, and scripted tests all call these methods; each one stamps a fresh id
//! from the world's allocator, schedules the command a fixed number of ticks
//! ahead, and hands it to the transport. Because every participant's input
//! flows through this one funnel onto the shared command stream, all
//! participants apply the same commands at the same ticks -- that is the
//! whole lockstep story.
//!
//! The factory is a borrowed view, not a stored object: it holds references
//! into the session for exactly one burst of input and carries no state of
//! its own.

use orbis_core::command::{Command, CommandId, CommandKind};
use orbis_core::id::{IdAllocator, UnitId};
use orbis_core::math::Vec3;

use crate::error::TransportError;
use crate::transport::Transport;

/// Converts human-scale calls into commands-via-transport.
pub struct InputFactory<'a> {
    ids: &'a mut IdAllocator,
    transport: &'a mut dyn Transport,
    issued_tick: u64,
    delay_ticks: u64,
}

impl<'a> InputFactory<'a> {
    /// `delay_ticks` is how far ahead of the current tick commands are
    /// scheduled; the minimum of 1 keeps a command from executing on its
    /// own issue tick.
    pub fn new(
        ids: &'a mut IdAllocator,
        transport: &'a mut dyn Transport,
        issued_tick: u64,
        delay_ticks: u64,
    ) -> Self {
        assert!(delay_ticks >= 1, "commands must target a future tick");
        Self {
            ids,
            transport,
            issued_tick,
            delay_ticks,
        }
    }

    fn emit(&mut self, kind: CommandKind) -> Result<CommandId, TransportError> {
        let id = CommandId::new(self.ids.next());
        let cmd = Command::new(
            id,
            kind,
            self.issued_tick,
            self.issued_tick + self.delay_ticks,
        );
        self.transport.send(cmd)?;
        Ok(id)
    }

    pub fn spawn(&mut self, position: Vec3) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Spawn { position })
    }

    pub fn select_unit(&mut self, unit_id: UnitId) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Select { unit_id })
    }

    pub fn deselect(&mut self) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Deselect)
    }

    pub fn issue_move(
        &mut self,
        unit_id: UnitId,
        position: Vec3,
    ) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Move { unit_id, position })
    }

    pub fn set_path(
        &mut self,
        unit_id: UnitId,
        points: Vec<Vec3>,
    ) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::SetPath { unit_id, points })
    }

    pub fn close_path(&mut self, unit_id: UnitId) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::ClosePath { unit_id })
    }

    pub fn stop(&mut self, unit_id: UnitId) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Stop { unit_id })
    }

    pub fn move_dir(
        &mut self,
        unit_id: UnitId,
        direction: Vec3,
    ) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::MoveDir { unit_id, direction })
    }

    pub fn despawn(&mut self, unit_id: UnitId) -> Result<CommandId, TransportError> {
        self.emit(CommandKind::Despawn { unit_id })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

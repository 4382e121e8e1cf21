//! Command relay transports.
//!
//! A transport carries command envelopes between participants. Two variants
//! share one contract: [`LoopbackTransport`] is the zero-latency, loss-free
//! single-process relay; [`BroadcastTransport`] batches outbound commands and
//! fans them out over a named in-process channel ([`BroadcastHub`]) with the
//! stable wire encoding, reconnect backoff, and receive-side validation.
//!
//! Receiving is a poll: the sim loop drains [`Transport::poll`] into the
//! command queue each frame. The polled design replaces callback sinks and
//! timer chains with explicit state -- reconnection is a state with a
//! next-attempt timestamp, not a scheduled closure.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use orbis_core::command::{Command, CommandId, CommandKind, OrderingKey};
use orbis_core::config::SimConfig;

use crate::error::TransportError;

/// Upper bound on commands waiting in an outbound batch before the
/// transport reports backpressure.
const MAX_OUTBOUND: usize = 1024;

// ---------------------------------------------------------------------------
// TransportState
// ---------------------------------------------------------------------------

/// Connection lifecycle: `Disconnected → Connecting → Connected`, with
/// `Error` as the terminal state after reconnect exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl TransportState {
    pub fn name(self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One received batch of commands with its routing metadata already
/// validated and stripped down to what the queue needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub client_id: String,
    pub seq: u64,
    pub ts_millis: u64,
    pub commands: Vec<Command>,
}

impl Envelope {
    /// The deterministic sort key shared by every command in the batch.
    pub fn ordering_key(&self) -> OrderingKey {
        OrderingKey {
            client_id: self.client_id.clone(),
            seq: self.seq,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Shared contract of the command relays.
pub trait Transport {
    fn state(&self) -> TransportState;

    /// Begin (or re-begin) connecting. For the in-process variants this
    /// completes synchronously when the peer side is reachable.
    fn connect(&mut self, now_ms: f64) -> Result<(), TransportError>;

    /// Drop the connection deliberately.
    fn disconnect(&mut self);

    /// Accept a command for delivery. Commands sent before the transport is
    /// connected are buffered and delivered on transition to connected.
    fn send(&mut self, cmd: Command) -> Result<(), TransportError>;

    /// Drive timers (throttle flush, reconnect backoff) and return every
    /// envelope received since the last poll, ordered by `(client_id, seq)`.
    fn poll(&mut self, now_ms: f64) -> Vec<Envelope>;

    /// Force immediate transmission of any batched commands.
    fn flush(&mut self) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// LoopbackTransport
// ---------------------------------------------------------------------------

/// Client id used by the loopback relay.
pub const LOOPBACK_CLIENT_ID: &str = "local";

/// Synchronous single-process relay: `send` makes the command available to
/// the very next `poll`. Zero latency, loss-free.
pub struct LoopbackTransport {
    state: TransportState,
    seq: u64,
    ready: Vec<Envelope>,
    buffered: Vec<Command>,
    last_now_ms: f64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            state: TransportState::Disconnected,
            seq: 0,
            ready: Vec::new(),
            buffered: Vec::new(),
            last_now_ms: 0.0,
        }
    }

    fn enqueue_ready(&mut self, commands: Vec<Command>) {
        self.seq += 1;
        self.ready.push(Envelope {
            client_id: LOOPBACK_CLIENT_ID.to_owned(),
            seq: self.seq,
            ts_millis: self.last_now_ms.max(0.0) as u64,
            commands,
        });
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn connect(&mut self, now_ms: f64) -> Result<(), TransportError> {
        self.last_now_ms = now_ms;
        self.state = TransportState::Connected;
        // Release anything sent while disconnected, preserving send order.
        let buffered = std::mem::take(&mut self.buffered);
        for cmd in buffered {
            self.enqueue_ready(vec![cmd]);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state = TransportState::Disconnected;
    }

    fn send(&mut self, cmd: Command) -> Result<(), TransportError> {
        match self.state {
            TransportState::Connected => {
                self.enqueue_ready(vec![cmd]);
                Ok(())
            }
            TransportState::Disconnected | TransportState::Connecting => {
                if self.buffered.len() >= MAX_OUTBOUND {
                    return Err(TransportError::Backpressure {
                        queued: self.buffered.len(),
                    });
                }
                self.buffered.push(cmd);
                Ok(())
            }
            TransportState::Error => Err(TransportError::NotConnected {
                state: self.state.name(),
            }),
        }
    }

    fn poll(&mut self, now_ms: f64) -> Vec<Envelope> {
        self.last_now_ms = now_ms;
        std::mem::take(&mut self.ready)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        // Loopback delivery is already immediate.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire encoding
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    client_id: String,
    seq: u64,
    ts_millis: u64,
    commands: Vec<WireCommand>,
}

#[derive(Serialize, Deserialize)]
struct WireCommand {
    id: String,
    #[serde(rename = "type")]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    #[serde(rename = "issuedTick")]
    issued_tick: u64,
    #[serde(rename = "targetTick")]
    target_tick: u64,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    meta: Option<WireMeta>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeta {
    client_id: String,
    seq: u64,
    ts: u64,
}

fn encode_envelope(env: &Envelope) -> Vec<u8> {
    let commands = env
        .commands
        .iter()
        .map(|cmd| {
            let kind_value = serde_json::to_value(&cmd.kind)
                .expect("command kinds are a closed set of JSON-serializable variants");
            let tag = kind_value
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_owned();
            let payload = kind_value.get("payload").cloned();
            WireCommand {
                id: cmd.id.to_string(),
                tag,
                payload,
                issued_tick: cmd.issued_tick,
                target_tick: cmd.target_tick,
                meta: Some(WireMeta {
                    client_id: env.client_id.clone(),
                    seq: env.seq,
                    ts: env.ts_millis,
                }),
            }
        })
        .collect();
    let wire = WireEnvelope {
        client_id: env.client_id.clone(),
        seq: env.seq,
        ts_millis: env.ts_millis,
        commands,
    };
    serde_json::to_vec(&wire).expect("wire envelope is JSON-serializable")
}

/// Decode one received envelope. A malformed envelope is an error (dropped
/// whole by the caller); a malformed or unrecognized command inside an
/// otherwise valid envelope degrades to a warn (skipped or tagged Unknown).
/// The `_meta` block is stripped here: the queue sees only the envelope key.
fn decode_envelope(bytes: &[u8]) -> Result<Envelope, serde_json::Error> {
    let wire: WireEnvelope = serde_json::from_slice(bytes)?;
    let mut commands = Vec::with_capacity(wire.commands.len());
    for raw in wire.commands {
        let Some(id) = CommandId::parse(&raw.id) else {
            warn!(id = %raw.id, "skipping command with malformed id");
            continue;
        };
        if raw.target_tick <= raw.issued_tick {
            warn!(
                id = %raw.id,
                issued = raw.issued_tick,
                target = raw.target_tick,
                "skipping command with non-future target tick"
            );
            continue;
        }
        let mut kind_value = serde_json::Map::new();
        kind_value.insert("type".to_owned(), serde_json::Value::String(raw.tag.clone()));
        if let Some(payload) = raw.payload {
            kind_value.insert("payload".to_owned(), payload);
        }
        let kind = match serde_json::from_value::<CommandKind>(kind_value.into()) {
            Ok(kind) => kind,
            // Forward compatibility: a tag this build does not know still
            // flows to the world, which logs and drops it.
            Err(_) => CommandKind::Unknown { tag: raw.tag },
        };
        commands.push(Command::new(id, kind, raw.issued_tick, raw.target_tick));
    }
    Ok(Envelope {
        client_id: wire.client_id,
        seq: wire.seq,
        ts_millis: wire.ts_millis,
        commands,
    })
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

struct HubShared {
    peers: Vec<(u64, Sender<Vec<u8>>)>,
    next_peer: u64,
    online: bool,
}

/// A named in-process broadcast channel. Every published envelope fans out
/// to every subscribed endpoint, the publisher included -- one uniform
/// receive path means every participant applies every command the same way.
#[derive(Clone)]
pub struct BroadcastHub {
    name: String,
    shared: Arc<Mutex<HubShared>>,
}

impl BroadcastHub {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            shared: Arc::new(Mutex::new(HubShared {
                peers: Vec::new(),
                next_peer: 1,
                online: true,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulate channel outage/recovery. Offline hubs refuse subscriptions
    /// and publishes, which is what drives transports into their reconnect
    /// state machine.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Publish raw envelope bytes to every subscriber.
    pub fn publish(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let mut shared = self.lock();
        if !shared.online {
            return Err(TransportError::Disconnected);
        }
        shared
            .peers
            .retain(|(_, tx)| tx.send(bytes.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Result<(u64, Receiver<Vec<u8>>), TransportError> {
        let mut shared = self.lock();
        if !shared.online {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = shared.next_peer;
        shared.next_peer += 1;
        shared.peers.push((id, tx));
        Ok((id, rx))
    }

    fn unsubscribe(&self, peer: u64) {
        self.lock().peers.retain(|(id, _)| *id != peer);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubShared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// BroadcastTransport
// ---------------------------------------------------------------------------

/// Reconnect state machine: a timer attribute, not a callback chain.
#[derive(Debug, Clone, Copy)]
struct ReconnectPlan {
    attempts_made: u32,
    next_attempt_ms: f64,
    next_delay_ms: f64,
}

/// Batched fan-out relay over a [`BroadcastHub`].
pub struct BroadcastTransport {
    client_id: String,
    hub: BroadcastHub,
    state: TransportState,
    subscription: Option<(u64, Receiver<Vec<u8>>)>,
    outbound: Vec<Command>,
    seq: u64,
    throttle_ms: f64,
    last_flush_ms: f64,
    last_now_ms: f64,
    reconnect: Option<ReconnectPlan>,
    max_reconnect_attempts: u32,
    reconnect_base_ms: f64,
    reconnect_factor: f64,
}

impl BroadcastTransport {
    /// A new endpoint on `hub` with a fresh session client id (UUID v4).
    pub fn new(hub: BroadcastHub, config: &SimConfig) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            hub,
            state: TransportState::Disconnected,
            subscription: None,
            outbound: Vec::new(),
            seq: 0,
            throttle_ms: config.throttle_ms as f64,
            last_flush_ms: 0.0,
            last_now_ms: 0.0,
            reconnect: None,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_base_ms: config.reconnect_base_ms as f64,
            reconnect_factor: config.reconnect_factor,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn try_attach(&mut self, now_ms: f64) -> bool {
        match self.hub.subscribe() {
            Ok(sub) => {
                self.subscription = Some(sub);
                self.state = TransportState::Connected;
                self.reconnect = None;
                self.last_flush_ms = now_ms;
                debug!(client = %self.client_id, hub = %self.hub.name(), "transport connected");
                true
            }
            Err(_) => false,
        }
    }

    fn schedule_reconnect(&mut self, now_ms: f64) {
        self.state = TransportState::Connecting;
        self.subscription = None;
        self.reconnect = Some(ReconnectPlan {
            attempts_made: 0,
            next_attempt_ms: now_ms + self.reconnect_base_ms,
            next_delay_ms: self.reconnect_base_ms * self.reconnect_factor,
        });
    }

    fn drive_reconnect(&mut self, now_ms: f64) {
        let Some(mut plan) = self.reconnect else {
            return;
        };
        if now_ms < plan.next_attempt_ms {
            return;
        }
        if self.try_attach(now_ms) {
            return;
        }
        plan.attempts_made += 1;
        if plan.attempts_made >= self.max_reconnect_attempts {
            warn!(
                client = %self.client_id,
                attempts = plan.attempts_made,
                "reconnect attempts exhausted; transport entering error state"
            );
            self.state = TransportState::Error;
            self.reconnect = None;
            return;
        }
        plan.next_attempt_ms = now_ms + plan.next_delay_ms;
        plan.next_delay_ms *= self.reconnect_factor;
        self.reconnect = Some(plan);
    }

    /// Write the current batch to the hub. On transient failure the batch is
    /// re-prepended so order is preserved across the retry.
    fn flush_outbound(&mut self, now_ms: f64) -> Result<(), TransportError> {
        if self.outbound.is_empty() {
            self.last_flush_ms = now_ms;
            return Ok(());
        }
        let batch = std::mem::take(&mut self.outbound);
        self.seq += 1;
        let envelope = Envelope {
            client_id: self.client_id.clone(),
            seq: self.seq,
            ts_millis: now_ms.max(0.0) as u64,
            commands: batch,
        };
        match self.hub.publish(encode_envelope(&envelope)) {
            Ok(()) => {
                self.last_flush_ms = now_ms;
                Ok(())
            }
            Err(err) => {
                // Un-spend the sequence number and restore the batch at the
                // front so a later flush preserves order.
                self.seq -= 1;
                let mut restored = envelope.commands;
                restored.append(&mut self.outbound);
                self.outbound = restored;
                self.schedule_reconnect(now_ms);
                Err(err)
            }
        }
    }
}

impl Transport for BroadcastTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn connect(&mut self, now_ms: f64) -> Result<(), TransportError> {
        self.last_now_ms = now_ms;
        if self.state == TransportState::Connected {
            return Ok(());
        }
        if self.try_attach(now_ms) {
            Ok(())
        } else {
            self.schedule_reconnect(now_ms);
            Err(TransportError::Disconnected)
        }
    }

    fn disconnect(&mut self) {
        if let Some((peer, _)) = self.subscription.take() {
            self.hub.unsubscribe(peer);
        }
        self.state = TransportState::Disconnected;
        self.reconnect = None;
    }

    fn send(&mut self, cmd: Command) -> Result<(), TransportError> {
        if self.state == TransportState::Error {
            return Err(TransportError::ReconnectExhausted {
                attempts: self.max_reconnect_attempts,
            });
        }
        if self.outbound.len() >= MAX_OUTBOUND {
            return Err(TransportError::Backpressure {
                queued: self.outbound.len(),
            });
        }
        // Batched regardless of state: pre-connect sends are simply held
        // until the first connected flush.
        self.outbound.push(cmd);
        Ok(())
    }

    fn poll(&mut self, now_ms: f64) -> Vec<Envelope> {
        self.last_now_ms = now_ms;
        self.drive_reconnect(now_ms);

        if self.state == TransportState::Connected
            && !self.outbound.is_empty()
            && now_ms - self.last_flush_ms >= self.throttle_ms
        {
            // Failure here already re-prepended the batch and scheduled a
            // reconnect; nothing further to do this frame.
            let _ = self.flush_outbound(now_ms);
        }

        let mut envelopes = Vec::new();
        if let Some((_, rx)) = &self.subscription {
            while let Ok(bytes) = rx.try_recv() {
                match decode_envelope(&bytes) {
                    Ok(env) => envelopes.push(env),
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable envelope");
                    }
                }
            }
        }
        envelopes.sort_by(|a, b| {
            a.client_id
                .cmp(&b.client_id)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        envelopes
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if self.state != TransportState::Connected {
            return Err(TransportError::NotConnected {
                state: self.state.name(),
            });
        }
        self.flush_outbound(self.last_now_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_core::id::UnitId;
    use orbis_core::math::Vec3;

    fn cmd(id: u64) -> Command {
        Command::new(
            CommandId::new(id),
            CommandKind::Spawn {
                position: Vec3::new(0.0, 10.0, 0.0),
            },
            0,
            1,
        )
    }

    fn config() -> SimConfig {
        SimConfig {
            throttle_ms: 100,
            max_reconnect_attempts: 3,
            reconnect_base_ms: 1000,
            reconnect_factor: 1.5,
            ..Default::default()
        }
    }

    // -- loopback ------------------------------------------------------------

    #[test]
    fn loopback_send_is_visible_on_next_poll() {
        let mut t = LoopbackTransport::new();
        t.connect(0.0).unwrap();
        t.send(cmd(1)).unwrap();
        t.send(cmd(2)).unwrap();

        let envs = t.poll(1.0);
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].client_id, LOOPBACK_CLIENT_ID);
        assert!(envs[0].seq < envs[1].seq);
        assert!(t.poll(2.0).is_empty(), "poll drains");
    }

    #[test]
    fn loopback_buffers_sends_before_connect() {
        let mut t = LoopbackTransport::new();
        t.send(cmd(1)).unwrap();
        t.send(cmd(2)).unwrap();
        assert!(t.poll(0.0).is_empty(), "nothing delivered while disconnected");

        t.connect(1.0).unwrap();
        let envs = t.poll(1.0);
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].commands[0].id.raw(), 1);
        assert_eq!(envs[1].commands[0].id.raw(), 2);
    }

    // -- wire encoding -------------------------------------------------------

    #[test]
    fn wire_roundtrip_preserves_commands() {
        let env = Envelope {
            client_id: "client-a".to_owned(),
            seq: 7,
            ts_millis: 12345,
            commands: vec![
                cmd(1),
                Command::new(
                    CommandId::new(2),
                    CommandKind::Move {
                        unit_id: UnitId(4),
                        position: Vec3::new(1.0, 2.0, 3.0),
                    },
                    3,
                    5,
                ),
            ],
        };
        let bytes = encode_envelope(&env);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn wire_meta_is_present_and_stripped() {
        let env = Envelope {
            client_id: "client-a".to_owned(),
            seq: 3,
            ts_millis: 99,
            commands: vec![cmd(1)],
        };
        let bytes = encode_envelope(&env);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["commands"][0]["_meta"]["clientId"], "client-a");
        assert_eq!(value["commands"][0]["_meta"]["seq"], 3);

        // Decoding yields plain commands with the meta folded into the
        // envelope key, not the command.
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.ordering_key().client_id, "client-a");
        assert_eq!(decoded.ordering_key().seq, 3);
    }

    #[test]
    fn unknown_wire_tag_decodes_to_unknown_kind() {
        let raw = serde_json::json!({
            "clientId": "c",
            "seq": 1,
            "tsMillis": 0,
            "commands": [{
                "id": "cmd-9",
                "type": "TeleportHome",
                "payload": {"anything": true},
                "issuedTick": 0,
                "targetTick": 1
            }]
        });
        let decoded = decode_envelope(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(
            decoded.commands[0].kind,
            CommandKind::Unknown {
                tag: "TeleportHome".to_owned()
            }
        );
    }

    #[test]
    fn malformed_commands_are_skipped_not_fatal() {
        let raw = serde_json::json!({
            "clientId": "c",
            "seq": 1,
            "tsMillis": 0,
            "commands": [
                {"id": "not-a-command-id", "type": "Deselect", "issuedTick": 0, "targetTick": 1},
                {"id": "cmd-2", "type": "Deselect", "issuedTick": 5, "targetTick": 5},
                {"id": "cmd-3", "type": "Deselect", "issuedTick": 0, "targetTick": 1}
            ]
        });
        let decoded = decode_envelope(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert_eq!(decoded.commands.len(), 1);
        assert_eq!(decoded.commands[0].id.raw(), 3);
    }

    // -- broadcast -----------------------------------------------------------

    #[test]
    fn broadcast_fans_out_to_all_endpoints() {
        let hub = BroadcastHub::new("match-1");
        let mut a = BroadcastTransport::new(hub.clone(), &config());
        let mut b = BroadcastTransport::new(hub.clone(), &config());
        a.connect(0.0).unwrap();
        b.connect(0.0).unwrap();

        a.send(cmd(1)).unwrap();
        a.flush().unwrap();

        let at_a = a.poll(1.0);
        let at_b = b.poll(1.0);
        assert_eq!(at_a.len(), 1, "publisher receives its own envelope");
        assert_eq!(at_b.len(), 1);
        assert_eq!(at_a[0].client_id, a.client_id());
        assert_eq!(at_a, at_b);
    }

    #[test]
    fn broadcast_throttles_until_interval_elapses() {
        let hub = BroadcastHub::new("match-2");
        let mut a = BroadcastTransport::new(hub.clone(), &config());
        let mut b = BroadcastTransport::new(hub, &config());
        a.connect(0.0).unwrap();
        b.connect(0.0).unwrap();

        a.send(cmd(1)).unwrap();
        a.poll(50.0);
        assert!(b.poll(50.0).is_empty(), "inside the throttle window");

        a.poll(120.0);
        assert_eq!(b.poll(120.0).len(), 1, "flushed after the interval");
    }

    #[test]
    fn broadcast_batches_share_one_envelope() {
        let hub = BroadcastHub::new("match-3");
        let mut a = BroadcastTransport::new(hub.clone(), &config());
        let mut b = BroadcastTransport::new(hub, &config());
        a.connect(0.0).unwrap();
        b.connect(0.0).unwrap();

        a.send(cmd(1)).unwrap();
        a.send(cmd(2)).unwrap();
        a.send(cmd(3)).unwrap();
        a.flush().unwrap();

        let envs = b.poll(1.0);
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].commands.len(), 3);
        let ids: Vec<u64> = envs[0].commands.iter().map(|c| c.id.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn incoming_envelopes_sorted_by_client_then_seq() {
        let hub = BroadcastHub::new("match-4");
        let config = config();
        let mut observer = BroadcastTransport::new(hub.clone(), &config);
        observer.connect(0.0).unwrap();

        // Publish directly in scrambled order with controlled client ids.
        for (client, seq) in [("zzz", 1), ("aaa", 2), ("aaa", 1), ("mmm", 1)] {
            let env = Envelope {
                client_id: client.to_owned(),
                seq,
                ts_millis: 0,
                commands: vec![cmd(seq)],
            };
            hub.publish(encode_envelope(&env)).unwrap();
        }

        let envs = observer.poll(1.0);
        let order: Vec<(String, u64)> = envs
            .iter()
            .map(|e| (e.client_id.clone(), e.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                ("aaa".to_owned(), 1),
                ("aaa".to_owned(), 2),
                ("mmm".to_owned(), 1),
                ("zzz".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn corrupt_envelope_is_dropped_whole() {
        let hub = BroadcastHub::new("match-5");
        let mut t = BroadcastTransport::new(hub.clone(), &config());
        t.connect(0.0).unwrap();
        hub.publish(b"not json at all".to_vec()).unwrap();
        assert!(t.poll(1.0).is_empty());
    }

    #[test]
    fn send_failure_reprepends_batch_and_preserves_order() {
        let hub = BroadcastHub::new("match-6");
        let mut a = BroadcastTransport::new(hub.clone(), &config());
        let mut b = BroadcastTransport::new(hub.clone(), &config());
        a.connect(0.0).unwrap();
        b.connect(0.0).unwrap();

        a.send(cmd(1)).unwrap();
        hub.set_online(false);
        assert!(a.flush().is_err());
        assert_eq!(a.state(), TransportState::Connecting);

        // More commands queue behind the failed batch.
        a.send(cmd(2)).unwrap();
        hub.set_online(true);

        // Reconnect timer: base 1000 ms after the failure at t=0.
        a.poll(1001.0);
        assert_eq!(a.state(), TransportState::Connected);
        a.flush().unwrap();

        let envs = b.poll(1001.0);
        let ids: Vec<u64> = envs
            .iter()
            .flat_map(|e| e.commands.iter().map(|c| c.id.raw()))
            .collect();
        assert_eq!(ids, vec![1, 2], "failed batch precedes later sends");
    }

    #[test]
    fn reconnect_exhaustion_enters_error_state() {
        let hub = BroadcastHub::new("match-7");
        hub.set_online(false);
        let mut t = BroadcastTransport::new(hub, &config());
        assert!(t.connect(0.0).is_err());
        assert_eq!(t.state(), TransportState::Connecting);

        // Attempts at 1000, then +1500, then +2250 (factor 1.5, capped at 3).
        let mut now = 0.0;
        for _ in 0..3 {
            now += 10_000.0;
            t.poll(now);
        }
        assert_eq!(t.state(), TransportState::Error);
        assert!(matches!(
            t.send(cmd(1)),
            Err(TransportError::ReconnectExhausted { attempts: 3 })
        ));
    }

    #[test]
    fn backoff_delays_grow_by_the_configured_factor() {
        let hub = BroadcastHub::new("match-8");
        hub.set_online(false);
        let mut t = BroadcastTransport::new(hub.clone(), &config());
        let _ = t.connect(0.0);

        // First retry is not due before base (1000 ms).
        t.poll(500.0);
        assert_eq!(t.state(), TransportState::Connecting);

        // Due at 1000; hub still offline, next delay 1500.
        t.poll(1000.0);
        assert_eq!(t.state(), TransportState::Connecting);

        // Not due at 2400 (< 1000 + 1500).
        hub.set_online(true);
        t.poll(2400.0);
        assert_eq!(t.state(), TransportState::Connecting);

        // Due at 2500.
        t.poll(2500.0);
        assert_eq!(t.state(), TransportState::Connected);
    }

    #[test]
    fn backpressure_when_outbound_is_full() {
        let hub = BroadcastHub::new("match-9");
        let mut t = BroadcastTransport::new(hub, &config());
        t.connect(0.0).unwrap();
        for i in 0..MAX_OUTBOUND {
            t.send(cmd(i as u64 + 1)).unwrap();
        }
        assert!(matches!(
            t.send(cmd(9999)),
            Err(TransportError::Backpressure { .. })
        ));
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use message_io::network::{Endpoint, NetEvent, SendStatus, Transport};
use message_io::node::{self, NodeHandler};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::Error;
use crate::network::common::{
    bytes_to_latin1, latin1_to_bytes, FabricConfig, PartyId, PartyTable, DATA_TAG, READY_TAG,
};

struct FragmentEntry {
    total: usize,
    chunks: HashMap<usize, Vec<u8>>,
}

/// One party's handle on the messaging fabric: a UDP socket bound to its
/// port in the static table, one outbound endpoint per peer, and the
/// round/fragment buffers. A background thread pumps raw datagrams from
/// the socket into a channel; everything else runs on the caller's thread.
pub struct Participant {
    node_id: PartyId,
    peers: Vec<PartyId>,
    handler: NodeHandler<()>,
    endpoints: HashMap<PartyId, Endpoint>,
    incoming: mpsc::Receiver<Vec<u8>>,
    /// Messages received ahead of the round currently being awaited,
    /// keyed by (round_id, sender). Forward-only.
    msg_buffer: HashMap<(u64, PartyId), Value>,
    /// Partial reassemblies keyed by message uid; an entry is removed the
    /// instant its message completes.
    fragments: HashMap<String, FragmentEntry>,
    ready_seen: HashSet<PartyId>,
    cfg: FabricConfig,
}

impl Participant {
    pub fn new(node_id: PartyId, table: &PartyTable) -> Result<Self, Error> {
        Self::with_config(node_id, table, FabricConfig::default())
    }

    pub fn with_config(
        node_id: PartyId,
        table: &PartyTable,
        cfg: FabricConfig,
    ) -> Result<Self, Error> {
        let port = table
            .port(node_id)
            .ok_or_else(|| Error::Network(format!("party {node_id} is not in the party table")))?;

        let (handler, listener) = node::split::<()>();

        let listen_addr = format!("127.0.0.1:{port}");
        handler
            .network()
            .listen(Transport::Udp, listen_addr.as_str())
            .map_err(|e| Error::Network(format!("cannot bind udp port {port}: {e}")))?;

        let mut peers = Vec::new();
        let mut endpoints = HashMap::new();
        for (pid, peer_port) in table.entries() {
            if pid == node_id {
                continue;
            }
            let peer_addr = format!("127.0.0.1:{peer_port}");
            let (endpoint, _) = handler
                .network()
                .connect(Transport::Udp, peer_addr.as_str())
                .map_err(|e| Error::Network(format!("cannot reach party {pid}: {e}")))?;
            endpoints.insert(pid, endpoint);
            peers.push(pid);
        }

        let (tx, incoming) = mpsc::channel::<Vec<u8>>();
        thread::spawn(move || {
            listener.for_each(move |event| {
                if let NetEvent::Message(_, bytes) = event.network() {
                    let _ = tx.send(bytes.to_vec());
                }
            });
        });

        debug!("party {node_id} listening on udp port {port}");

        Ok(Participant {
            node_id,
            peers,
            handler,
            endpoints,
            incoming,
            msg_buffer: HashMap::new(),
            fragments: HashMap::new(),
            ready_seen: HashSet::new(),
            cfg,
        })
    }

    pub fn node_id(&self) -> PartyId {
        self.node_id
    }

    pub fn peers(&self) -> &[PartyId] {
        &self.peers
    }

    /// Transient statuses (a would-block, or the pending error a refused
    /// datagram leaves on a connected UDP socket) are absorbed and
    /// retried a few times before surfacing as a network error.
    fn send_raw(&self, target: PartyId, bytes: &[u8]) -> Result<(), Error> {
        const SEND_RETRIES: usize = 3;
        let endpoint = self
            .endpoints
            .get(&target)
            .ok_or_else(|| Error::Network(format!("unknown peer {target}")))?;
        let mut attempt = 0;
        loop {
            match self.handler.network().send(*endpoint, bytes) {
                SendStatus::Sent => return Ok(()),
                status => {
                    attempt += 1;
                    if attempt >= SEND_RETRIES {
                        return Err(Error::Network(format!(
                            "send to party {target} failed: {status:?}"
                        )));
                    }
                    debug!(
                        "[{}] send to {target} returned {status:?}, retrying",
                        self.node_id
                    );
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Ships one serialized payload to every target, fragmenting under a
    /// fresh uid when it exceeds the per-datagram limit.
    fn transmit(&self, targets: &[PartyId], bytes: &[u8]) -> Result<(), Error> {
        if bytes.len() <= self.cfg.max_payload {
            for target in targets {
                self.send_raw(*target, bytes)?;
            }
            return Ok(());
        }

        let uid = Uuid::new_v4().to_string();
        let total = (bytes.len() + self.cfg.max_payload - 1) / self.cfg.max_payload;
        for (i, chunk) in bytes.chunks(self.cfg.max_payload).enumerate() {
            let fragment = json!({
                "__frag": true,
                "uid": uid,
                "i": i,
                "n": total,
                "d": bytes_to_latin1(chunk),
            });
            let fragment_bytes = serde_json::to_vec(&fragment)
                .map_err(|e| Error::BadFormat(format!("fragment encode: {e}")))?;
            for target in targets {
                self.send_raw(*target, &fragment_bytes)?;
            }
        }
        Ok(())
    }

    fn round_payload(&self, value: Value, round: u64) -> Result<Vec<u8>, Error> {
        let payload = json!({
            "t": DATA_TAG,
            "r": round,
            "src": self.node_id,
            "val": value,
        });
        serde_json::to_vec(&payload).map_err(|e| Error::BadFormat(format!("payload encode: {e}")))
    }

    /// Sends a round-tagged value to every peer.
    pub fn broadcast(&self, value: Value, round: u64) -> Result<(), Error> {
        let bytes = self.round_payload(value, round)?;
        self.transmit(&self.peers, &bytes)
    }

    /// Sends a round-tagged value to a single peer.
    pub fn send_to(&self, target: PartyId, value: Value, round: u64) -> Result<(), Error> {
        let bytes = self.round_payload(value, round)?;
        self.transmit(&[target], &bytes)
    }

    /// Feeds one raw datagram through fragment reassembly. Returns the
    /// completed logical message, if any. Undecodable datagrams are
    /// logged and dropped.
    fn handle_datagram(&mut self, bytes: &[u8]) -> Option<Value> {
        let msg: Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!("[{}] dropping non-json datagram: {e}", self.node_id);
                return None;
            }
        };

        if msg.get("__frag").and_then(Value::as_bool) != Some(true) {
            return Some(msg);
        }

        let uid = msg.get("uid").and_then(Value::as_str)?.to_string();
        let idx = msg.get("i").and_then(Value::as_u64)? as usize;
        let total = msg.get("n").and_then(Value::as_u64)? as usize;
        let chunk = match latin1_to_bytes(msg.get("d").and_then(Value::as_str)?) {
            Ok(c) => c,
            Err(e) => {
                warn!("[{}] dropping bad fragment chunk: {e}", self.node_id);
                return None;
            }
        };

        let entry = self
            .fragments
            .entry(uid.clone())
            .or_insert_with(|| FragmentEntry {
                total,
                chunks: HashMap::new(),
            });
        entry.chunks.entry(idx).or_insert(chunk);
        if entry.chunks.len() < entry.total {
            return None;
        }

        let entry = self.fragments.remove(&uid)?;
        let mut full = Vec::new();
        for i in 0..entry.total {
            full.extend_from_slice(entry.chunks.get(&i)?);
        }
        match serde_json::from_slice(&full) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(
                    "[{}] reassembled message {uid} is not valid json: {e}",
                    self.node_id
                );
                None
            }
        }
    }

    /// Buffers a completed message without a current-round context: READY
    /// packets feed the barrier, everything round-tagged is kept for a
    /// later `receive_round`.
    fn stash(&mut self, mut msg: Value) {
        if msg.get("t").and_then(Value::as_str) == Some(READY_TAG) {
            if let Some(src) = msg.get("src").and_then(Value::as_u64) {
                self.ready_seen.insert(src as usize);
            }
            return;
        }
        let round = msg.get("r").and_then(Value::as_u64);
        let src = msg.get("src").and_then(Value::as_u64);
        if let (Some(round), Some(src)) = (round, src) {
            let val = msg.get_mut("val").map(Value::take).unwrap_or(Value::Null);
            self.msg_buffer.entry((round, src as usize)).or_insert(val);
        }
    }

    /// Waits until every peer has delivered a complete message for
    /// `round`, returning the payloads keyed by sender.
    pub fn receive_round(&mut self, round: u64) -> Result<HashMap<PartyId, Value>, Error> {
        let peers = self.peers.clone();
        self.receive_from(round, &peers)
    }

    /// Like [`Participant::receive_round`] but for an explicit sender set.
    /// Future rounds are forward-buffered, stale rounds and READY packets
    /// are dropped.
    pub fn receive_from(
        &mut self,
        round: u64,
        expected: &[PartyId],
    ) -> Result<HashMap<PartyId, Value>, Error> {
        let mut collected = HashMap::new();
        for pid in expected {
            if let Some(val) = self.msg_buffer.remove(&(round, *pid)) {
                collected.insert(*pid, val);
            }
        }

        let poll = Duration::from_millis(self.cfg.recv_timeout_ms);
        let deadline = self
            .cfg
            .recv_deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        while collected.len() < expected.len() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::Timeout(round));
                }
            }
            let bytes = match self.incoming.recv_timeout(poll) {
                Ok(bytes) => bytes,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(Error::Network("listener thread stopped".into()))
                }
            };
            let Some(mut msg) = self.handle_datagram(&bytes) else {
                continue;
            };

            if msg.get("t").and_then(Value::as_str) == Some(READY_TAG) {
                if let Some(src) = msg.get("src").and_then(Value::as_u64) {
                    self.ready_seen.insert(src as usize);
                }
                continue;
            }
            let (Some(r), Some(src)) = (
                msg.get("r").and_then(Value::as_u64),
                msg.get("src").and_then(Value::as_u64),
            ) else {
                continue;
            };
            let src = src as usize;
            let val = msg.get_mut("val").map(Value::take).unwrap_or(Value::Null);
            if r == round {
                if expected.contains(&src) && !collected.contains_key(&src) {
                    collected.insert(src, val);
                }
            } else if r > round {
                self.msg_buffer.entry((r, src)).or_insert(val);
            }
            // r < round: stale, dropped silently
        }
        Ok(collected)
    }

    /// Resends READY on a fixed cadence until every peer has been seen at
    /// least once. Round traffic observed meanwhile is forward-buffered.
    pub fn barrier(&mut self) -> Result<(), Error> {
        debug!("[{}] waiting at barrier", self.node_id);
        let interval = Duration::from_millis(self.cfg.barrier_interval_ms);
        let ready = serde_json::to_vec(&json!({ "t": READY_TAG, "src": self.node_id }))
            .map_err(|e| Error::BadFormat(format!("ready encode: {e}")))?;

        while self.ready_seen.len() < self.peers.len() {
            for pid in self.peers.clone() {
                if let Err(e) = self.send_raw(pid, &ready) {
                    warn!("[{}] barrier send to {pid} failed: {e}", self.node_id);
                }
            }
            let end = Instant::now() + interval;
            while self.ready_seen.len() < self.peers.len() {
                let now = Instant::now();
                if now >= end {
                    break;
                }
                match self.incoming.recv_timeout(end - now) {
                    Ok(bytes) => {
                        if let Some(msg) = self.handle_datagram(&bytes) {
                            self.stash(msg);
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => break,
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        return Err(Error::Network("listener thread stopped".into()))
                    }
                }
            }
        }
        debug!("[{}] barrier cleared", self.node_id);
        Ok(())
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.handler.stop();
    }
}

use std::fs;

use log::debug;
use serde::Deserialize;

use crate::error::Error;

pub type PartyId = usize;

/// Tag of an ordinary round message: `{t, r, src, val}`.
pub const DATA_TAG: &str = "DATA";
/// Tag of a barrier packet: `{t, src}`, not tied to any round.
pub const READY_TAG: &str = "READY";

/// Application-level fragmentation threshold for a single datagram.
pub const MAX_UDP_PAYLOAD: usize = 32 * 1024;

pub const DEFAULT_BASE_PORT: u16 = 5000;
pub const DEFAULT_PARTY_COUNT: usize = 4;

/// Static table mapping party id to its loopback UDP port.
#[derive(Debug, Clone)]
pub struct PartyTable {
    ports: Vec<u16>,
}

impl PartyTable {
    pub fn new(num_parties: usize, base_port: u16) -> Self {
        PartyTable {
            ports: (0..num_parties).map(|i| base_port + i as u16).collect(),
        }
    }

    pub fn port(&self, id: PartyId) -> Option<u16> {
        self.ports.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (PartyId, u16)> + '_ {
        self.ports.iter().copied().enumerate()
    }
}

impl Default for PartyTable {
    fn default() -> Self {
        PartyTable::new(DEFAULT_PARTY_COUNT, DEFAULT_BASE_PORT)
    }
}

/// Fabric tuning knobs, loadable from the `[fabric]` section of
/// `party_config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Socket poll timeout inside a receive loop.
    pub recv_timeout_ms: u64,
    /// Optional hard deadline for one `receive_round` call; `None` loops
    /// until the expected sender set is satisfied.
    pub recv_deadline_ms: Option<u64>,
    /// READY resend cadence while waiting at the barrier.
    pub barrier_interval_ms: u64,
    /// Per-datagram payload limit before fragmentation kicks in.
    pub max_payload: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        FabricConfig {
            recv_timeout_ms: 1000,
            recv_deadline_ms: None,
            barrier_interval_ms: 500,
            max_payload: MAX_UDP_PAYLOAD,
        }
    }
}

/// Protocol switches, loadable from the `[protocol]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtocolOptions {
    /// Log instead of raise when the offline MAC check leaves a non-zero
    /// residue. Off by default; the check aborts the run.
    pub ignore_mac_check: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartyConfigFile {
    pub fabric: FabricConfig,
    pub protocol: ProtocolOptions,
}

/// Loads the optional TOML configuration, falling back to defaults when
/// the file is absent or unreadable.
pub fn load_config(path: &str) -> PartyConfigFile {
    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                debug!("could not parse {path}: {e}; using defaults");
                PartyConfigFile::default()
            }
        },
        Err(_) => {
            debug!("no configuration file at {path}; using defaults");
            PartyConfigFile::default()
        }
    }
}

/// Encodes raw chunk bytes as a JSON-safe string, one char per byte.
pub fn bytes_to_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`bytes_to_latin1`].
pub fn latin1_to_bytes(text: &str) -> Result<Vec<u8>, Error> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code < 256 {
                Ok(code as u8)
            } else {
                Err(Error::BadFormat(format!(
                    "fragment chunk contains non latin-1 char U+{code:04X}"
                )))
            }
        })
        .collect()
}

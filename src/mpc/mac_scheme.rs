//! Information-theoretic MAC layer over additive shares.
//!
//! The commit step uses trusted-committer MAC distribution: the global key
//! `alpha = sum(alpha_i)` is reconstructed at the committer so it can
//! compute `alpha * value` itself. This is an honest-but-curious baseline;
//! a VOLE-based commit can replace it without touching the verifier.

use std::collections::HashMap;
use std::ops::{Add, Sub};

use log::debug;
use num_traits::Zero;
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::mpc::galois_ring::GrElement;
use crate::mpc::utils::{gr_from_value, gr_to_value, open_sum};
use crate::network::common::PartyId;
use crate::network::participant::Participant;

/// A value share paired with its MAC share. Across all parties
/// `sum(val_i) = x` and `sum(mac_i) = alpha * x`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedShare {
    pub val: GrElement,
    pub mac: GrElement,
}

impl AuthenticatedShare {
    pub fn new(val: GrElement, mac: GrElement) -> Self {
        AuthenticatedShare { val, mac }
    }

    /// Multiplication of both components by a public ring scalar.
    pub fn scalar_mul(&self, scalar: &GrElement) -> AuthenticatedShare {
        AuthenticatedShare {
            val: &self.val * scalar,
            mac: &self.mac * scalar,
        }
    }

    /// Absorbs a publicly known offset `d`: every party adds
    /// `alpha_i * d` to its MAC share, the owner also adds `d` to its
    /// value share. Keeps `sum(mac_i) = alpha * (x + d)`.
    pub fn add_public(
        &self,
        offset: &GrElement,
        alpha_share: &GrElement,
        owner: bool,
    ) -> AuthenticatedShare {
        let val = if owner {
            &self.val + offset
        } else {
            self.val.clone()
        };
        AuthenticatedShare {
            val,
            mac: &self.mac + &(alpha_share * offset),
        }
    }
}

impl Add for AuthenticatedShare {
    type Output = AuthenticatedShare;

    fn add(self, rhs: AuthenticatedShare) -> AuthenticatedShare {
        AuthenticatedShare {
            val: self.val + rhs.val,
            mac: self.mac + rhs.mac,
        }
    }
}

impl Sub for AuthenticatedShare {
    type Output = AuthenticatedShare;

    fn sub(self, rhs: AuthenticatedShare) -> AuthenticatedShare {
        AuthenticatedShare {
            val: self.val - rhs.val,
            mac: self.mac - rhs.mac,
        }
    }
}

/// Networked MAC scheme: owns the fabric handle, a per-party key share
/// and a running round counter for its own messages.
pub struct MacScheme {
    pub party: Participant,
    pub alpha_share: GrElement,
    round_counter: u64,
}

impl MacScheme {
    pub fn new(party: Participant) -> Self {
        debug!("[{}] sampling mac key share", party.node_id());
        MacScheme {
            party,
            alpha_share: GrElement::random(),
            round_counter: 0,
        }
    }

    pub fn into_party(self) -> Participant {
        self.party
    }

    fn next_round(&mut self) -> u64 {
        self.round_counter += 1;
        self.round_counter
    }

    /// Distributes an authenticated sharing of a single secret held by
    /// `src_id`. The committer collects the key shares, reconstructs
    /// `alpha`, deals value and MAC shares so the sums match, and
    /// broadcasts the per-party map; each receiver takes its own entry.
    pub fn commit(
        &mut self,
        value: Option<&GrElement>,
        src_id: PartyId,
    ) -> Result<AuthenticatedShare, Error> {
        let me = self.party.node_id();
        let key_round = self.next_round();
        let deal_round = self.next_round();

        if me != src_id {
            self.party
                .send_to(src_id, gr_to_value(&self.alpha_share), key_round)?;

            let incoming = self.party.receive_from(deal_round, &[src_id])?;
            let map = incoming
                .get(&src_id)
                .and_then(Value::as_object)
                .ok_or_else(|| Error::BadFormat("commit payload is not a share map".into()))?;
            let entry = map
                .get(&me.to_string())
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    Error::BadFormat(format!("commit payload has no entry for party {me}"))
                })?;
            let val = gr_from_value(
                entry
                    .get("v")
                    .ok_or_else(|| Error::BadFormat("commit entry lacks value share".into()))?,
            )?;
            let mac = gr_from_value(
                entry
                    .get("m")
                    .ok_or_else(|| Error::BadFormat("commit entry lacks mac share".into()))?,
            )?;
            return Ok(AuthenticatedShare::new(val, mac));
        }

        let value =
            value.ok_or_else(|| Error::ShapeMismatch("committer must provide a value".into()))?;

        let mut alpha = self.alpha_share.clone();
        for (_, share) in self.party.receive_round(key_round)? {
            alpha = alpha + gr_from_value(&share)?;
        }

        let peers: Vec<PartyId> = self.party.peers().to_vec();
        let mut val_shares: HashMap<PartyId, GrElement> = HashMap::new();
        let mut running = GrElement::zero();
        for pid in &peers {
            let share = GrElement::random();
            running = running + share.clone();
            val_shares.insert(*pid, share);
        }
        val_shares.insert(me, value - &running);

        let mac_value = alpha * value.clone();
        let mut mac_shares: HashMap<PartyId, GrElement> = HashMap::new();
        let mut running = GrElement::zero();
        for pid in &peers {
            let share = GrElement::random();
            running = running + share.clone();
            mac_shares.insert(*pid, share);
        }
        mac_shares.insert(me, mac_value - running);

        let mut payload = Map::new();
        for (pid, val_share) in &val_shares {
            payload.insert(
                pid.to_string(),
                json!({
                    "v": val_share.to_base64(),
                    "m": mac_shares[pid].to_base64(),
                }),
            );
        }
        self.party.broadcast(Value::Object(payload), deal_round)?;

        Ok(AuthenticatedShare::new(
            val_shares.remove(&me).unwrap_or_else(GrElement::zero),
            mac_shares.remove(&me).unwrap_or_else(GrElement::zero),
        ))
    }

    /// Opens an authenticated share and checks the MAC: every party
    /// broadcasts its value share, sums to the public `x`, then
    /// broadcasts `sigma_i = mac_i - alpha_i * x`; the sum must vanish
    /// coefficient-wise.
    pub fn open_and_verify(&mut self, share: &AuthenticatedShare) -> Result<GrElement, Error> {
        let open_round = self.next_round();
        let check_round = self.next_round();

        let x = open_sum(&mut self.party, &share.val, open_round)?;

        let sigma = &share.mac - &(&self.alpha_share * &x);
        let total = open_sum(&mut self.party, &sigma, check_round)?;

        if total.is_zero() {
            debug!("[{}] mac check passed", self.party.node_id());
            Ok(x)
        } else {
            Err(Error::MacCheckFailed)
        }
    }
}

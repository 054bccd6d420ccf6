//! Online phase: log-depth verification of a shared inner-product claim.
//!
//! The claim `c = <a, b>` is folded round by round under public coins
//! until the vectors are scalars, then settled by one opened equation.
//! The per-round sub-inner products are bilinear, so they cannot be read
//! off the additive shares locally; the prover (party 0 by default)
//! reconstructs the vectors up front and deals additive shares of the
//! round values `q_0`, `q_1` and the mixed term. Soundness does not rest
//! on the prover: a false claim survives the public coins with
//! probability on the order of `log2(M) / 2^64`.

use log::{debug, info};
use nalgebra::DVector;
use num_traits::{One, Zero};
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::mpc::additive_sharing::{AdditiveSecretSharing, SecretShare};
use crate::mpc::galois_ring::GrElement;
use crate::mpc::public_params::PublicParameters;
use crate::mpc::utils::{
    gr_from_value, gr_vec_from_value, gr_vec_to_value, open_sum, par_dot, public_coin,
};
use crate::network::participant::Participant;

const ROUND_COLLECT_A: u64 = 100_500;
const ROUND_COLLECT_B: u64 = 100_501;
const ROUND_COIN_BASE: u64 = 101_000;
const ROUND_PROOF_BASE: u64 = 103_000;
const ROUND_C_HAT: u64 = 105_000;
const ROUND_BLINDS: u64 = 105_001;
const ROUND_OPEN_A: u64 = 105_002;
const ROUND_OPEN_B: u64 = 105_003;
const ROUND_CHALLENGE: u64 = 109_000;

fn entry_field(entry: &Map<String, Value>, key: &str) -> Result<GrElement, Error> {
    gr_from_value(
        entry
            .get(key)
            .ok_or_else(|| Error::BadFormat(format!("proof entry lacks `{key}`")))?,
    )
}

pub struct InnerProductVerifier {
    pub party: Participant,
    pub params: PublicParameters,
}

impl InnerProductVerifier {
    pub fn new(party: Participant, params: PublicParameters) -> Self {
        InnerProductVerifier { party, params }
    }

    /// Collects every party's share vectors at the prover and returns the
    /// reconstructed full vectors there; other parties return empty
    /// vectors after shipping their shares.
    fn collect_at_prover(
        &mut self,
        curr_a: &DVector<GrElement>,
        curr_b: &DVector<GrElement>,
    ) -> Result<(DVector<GrElement>, DVector<GrElement>), Error> {
        let prover = self.params.prover_id;
        let m = curr_a.len();
        if self.party.node_id() != prover {
            self.party
                .send_to(prover, gr_vec_to_value(curr_a.as_slice()), ROUND_COLLECT_A)?;
            self.party
                .send_to(prover, gr_vec_to_value(curr_b.as_slice()), ROUND_COLLECT_B)?;
            return Ok((DVector::from_vec(vec![]), DVector::from_vec(vec![])));
        }

        let mut full_a = curr_a.clone();
        for (_, value) in self.party.receive_round(ROUND_COLLECT_A)? {
            let shares = gr_vec_from_value(&value)?;
            if shares.len() != m {
                return Err(Error::ShapeMismatch(format!(
                    "peer sent {} a-shares, expected {m}",
                    shares.len()
                )));
            }
            for k in 0..m {
                full_a[k] = &full_a[k] + &shares[k];
            }
        }
        let mut full_b = curr_b.clone();
        for (_, value) in self.party.receive_round(ROUND_COLLECT_B)? {
            let shares = gr_vec_from_value(&value)?;
            if shares.len() != m {
                return Err(Error::ShapeMismatch(format!(
                    "peer sent {} b-shares, expected {m}",
                    shares.len()
                )));
            }
            for k in 0..m {
                full_b[k] = &full_b[k] + &shares[k];
            }
        }
        Ok((full_a, full_b))
    }

    /// Prover side of one round: true sub-inner products and mixed term
    /// of the reconstructed vectors, dealt as additive shares through a
    /// broadcast map. Returns the prover's own shares.
    fn deal_proof(
        &mut self,
        round: u64,
        full_a: &DVector<GrElement>,
        full_b: &DVector<GrElement>,
    ) -> Result<(GrElement, GrElement, GrElement), Error> {
        let half = full_a.len() / 2;
        let a_left = full_a.rows(0, half).into_owned();
        let a_right = full_a.rows(half, half).into_owned();
        let b_left = full_b.rows(0, half).into_owned();
        let b_right = full_b.rows(half, half).into_owned();

        let q0 = par_dot(a_left.as_slice(), b_left.as_slice())?;
        let q1 = par_dot(a_right.as_slice(), b_right.as_slice())?;
        let cross = par_dot(a_left.as_slice(), b_right.as_slice())?
            + par_dot(a_right.as_slice(), b_left.as_slice())?;
        let mixed = &(&cross - &q0) - &q1;

        let q0_shares = AdditiveSecretSharing::share(&q0, self.params.n);
        let q1_shares = AdditiveSecretSharing::share(&q1, self.params.n);
        let mixed_shares = AdditiveSecretSharing::share(&mixed, self.params.n);

        let mut payload = Map::new();
        for pid in 0..self.params.n {
            payload.insert(
                pid.to_string(),
                json!({
                    "q0": q0_shares[pid].to_base64(),
                    "q1": q1_shares[pid].to_base64(),
                    "mx": mixed_shares[pid].to_base64(),
                }),
            );
        }
        self.party.broadcast(Value::Object(payload), round)?;

        let me = self.party.node_id();
        Ok((
            q0_shares[me].clone(),
            q1_shares[me].clone(),
            mixed_shares[me].clone(),
        ))
    }

    fn receive_proof(&mut self, round: u64) -> Result<(GrElement, GrElement, GrElement), Error> {
        let prover = self.params.prover_id;
        let me = self.party.node_id();
        let incoming = self.party.receive_from(round, &[prover])?;
        let map = incoming
            .get(&prover)
            .and_then(Value::as_object)
            .ok_or_else(|| Error::BadFormat("proof payload is not a share map".into()))?;
        let entry = map
            .get(&me.to_string())
            .and_then(Value::as_object)
            .ok_or_else(|| Error::BadFormat(format!("proof payload has no entry for {me}")))?;
        Ok((
            entry_field(entry, "q0")?,
            entry_field(entry, "q1")?,
            entry_field(entry, "mx")?,
        ))
    }

    /// Runs the verification protocol over this party's shares. Returns
    /// the opened inner-product value on success.
    pub fn run(
        &mut self,
        a_shares: &[SecretShare],
        b_shares: &[SecretShare],
        c_share: &SecretShare,
    ) -> Result<GrElement, Error> {
        let m = a_shares.len();
        if b_shares.len() != m {
            return Err(Error::ShapeMismatch(format!(
                "vector lengths differ: {} vs {}",
                m,
                b_shares.len()
            )));
        }
        if m == 0 || !m.is_power_of_two() {
            return Err(Error::ShapeMismatch(format!(
                "vector length {m} is not a power of two"
            )));
        }
        let fold_rounds = m.trailing_zeros() as usize;
        let me = self.party.node_id();
        let prover = self.params.prover_id;
        debug!("[{me}] verification start, m = {m}, {fold_rounds} fold rounds");

        let mut curr_a = DVector::from_fn(m, |i, _| a_shares[i].share.clone());
        let mut curr_b = DVector::from_fn(m, |i, _| b_shares[i].share.clone());
        let mut curr_c = c_share.share.clone();

        let blind_b = GrElement::random();
        let blind_c = GrElement::random();
        let one = GrElement::one();

        let (mut full_a, mut full_b) = self.collect_at_prover(&curr_a, &curr_b)?;

        let mut history: Vec<(GrElement, GrElement, GrElement)> = Vec::with_capacity(fold_rounds);

        for j in 0..fold_rounds {
            debug!("[{me}] round {j} calculation");
            let half = curr_a.len() / 2;
            let a_left = curr_a.rows(0, half).into_owned();
            let a_right = curr_a.rows(half, half).into_owned();
            let b_left = curr_b.rows(0, half).into_owned();
            let b_right = curr_b.rows(half, half).into_owned();

            let proof_round = ROUND_PROOF_BASE + j as u64;
            let (q0_share, q1_share, mixed_share) = if me == prover {
                self.deal_proof(proof_round, &full_a, &full_b)?
            } else {
                self.receive_proof(proof_round)?
            };

            history.push((curr_c.clone(), q0_share.clone(), q1_share.clone()));

            let r = public_coin(&mut self.party, ROUND_COIN_BASE + j as u64, true)?;
            let w_left = &one - &r;
            let w_right = r;

            curr_a = DVector::from_fn(half, |k, _| {
                (&a_left[k] * &w_left) + (&a_right[k] * &w_right)
            });
            curr_b = DVector::from_fn(half, |k, _| {
                (&b_left[k] * &w_left) + (&b_right[k] * &w_right)
            });
            if me == prover {
                let fa_left = full_a.rows(0, half).into_owned();
                let fa_right = full_a.rows(half, half).into_owned();
                let fb_left = full_b.rows(0, half).into_owned();
                let fb_right = full_b.rows(half, half).into_owned();
                full_a = DVector::from_fn(half, |k, _| {
                    (&fa_left[k] * &w_left) + (&fa_right[k] * &w_right)
                });
                full_b = DVector::from_fn(half, |k, _| {
                    (&fb_left[k] * &w_left) + (&fb_right[k] * &w_right)
                });
            }

            // claim for the folded vectors: g(r) from the dealt proof
            curr_c = (q0_share * w_left.clone())
                + (q1_share * w_right.clone())
                + (mixed_share * (w_left * w_right));
        }

        let a_final = curr_a[0].clone();
        let b_final = curr_b[0].clone();
        let c_final = curr_c;

        debug!("[{me}] computing compressed check");
        let challenge = public_coin(&mut self.party, ROUND_CHALLENGE, false)?;

        let mut c_hat = GrElement::zero();
        let mut weight = challenge.clone();
        for (claim, q0, q1) in &history {
            let residue = &(claim - q0) - q1;
            c_hat = c_hat + residue * weight.clone();
            weight = weight * challenge.clone();
        }
        c_hat = c_hat + c_final.clone() - blind_c.clone();

        let c_hat_pub = open_sum(&mut self.party, &c_hat, ROUND_C_HAT)?;

        debug!("[{me}] final opening");
        self.party.broadcast(
            json!({ "rb": blind_b.to_base64(), "rc": blind_c.to_base64() }),
            ROUND_BLINDS,
        )?;
        let mut blind_b_sum = blind_b.clone();
        let mut blind_c_sum = blind_c;
        for (_, value) in self.party.receive_round(ROUND_BLINDS)? {
            let entry = value
                .as_object()
                .ok_or_else(|| Error::BadFormat("blind payload is not an object".into()))?;
            blind_b_sum = blind_b_sum + entry_field(entry, "rb")?;
            blind_c_sum = blind_c_sum + entry_field(entry, "rc")?;
        }

        let a_pub = open_sum(&mut self.party, &a_final, ROUND_OPEN_A)?;
        let b_hat_share = b_final - blind_b;
        let b_hat_pub = open_sum(&mut self.party, &b_hat_share, ROUND_OPEN_B)?;

        let opened_claim = c_hat_pub + blind_c_sum;
        let product = a_pub * (b_hat_pub + blind_b_sum);

        if opened_claim == product {
            info!("[{me}] verification success");
            Ok(opened_claim)
        } else {
            Err(Error::VerificationFailed)
        }
    }
}

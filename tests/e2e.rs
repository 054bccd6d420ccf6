//! Four-party end-to-end scenarios over loopback UDP. Every test spawns
//! one thread per party on its own port base so the scenarios can run in
//! parallel.

use std::sync::Arc;
use std::thread;

use num_traits::{One, Zero};
use serde_json::json;

use inner_product_mpc::error::Error;
use inner_product_mpc::mpc::additive_sharing::{AdditiveSecretSharing, SecretShare};
use inner_product_mpc::mpc::galois_ring::GrElement;
use inner_product_mpc::mpc::mac_scheme::{AuthenticatedShare, MacScheme};
use inner_product_mpc::mpc::protocol::InnerProductVerifier;
use inner_product_mpc::mpc::public_params::PublicParameters;
use inner_product_mpc::network::common::PartyTable;
use inner_product_mpc::network::participant::Participant;

type Instance = Vec<(Vec<SecretShare>, Vec<SecretShare>, SecretShare)>;

/// Deals consistent per-party inputs for the claim `c = <a, b> + delta`.
fn deal_instance(n: usize, a: &[GrElement], b: &[GrElement], delta: &GrElement) -> Instance {
    let m = a.len();
    let mut claim = GrElement::zero();
    for k in 0..m {
        claim = claim + &a[k] * &b[k];
    }
    claim = claim + delta.clone();

    let a_shares: Vec<_> = a.iter().map(|x| AdditiveSecretSharing::share(x, n)).collect();
    let b_shares: Vec<_> = b.iter().map(|x| AdditiveSecretSharing::share(x, n)).collect();
    let c_shares = AdditiveSecretSharing::share(&claim, n);

    (0..n)
        .map(|pid| {
            (
                (0..m)
                    .map(|k| SecretShare::new(a_shares[k][pid].clone()))
                    .collect(),
                (0..m)
                    .map(|k| SecretShare::new(b_shares[k][pid].clone()))
                    .collect(),
                SecretShare::new(c_shares[pid].clone()),
            )
        })
        .collect()
}

fn random_vector(m: usize) -> Vec<GrElement> {
    (0..m).map(|_| GrElement::random()).collect()
}

fn run_verification(base_port: u16, instance: Instance) -> Vec<Result<GrElement, Error>> {
    let n = instance.len();
    let m = instance[0].0.len();
    let instance = Arc::new(instance);
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let instance = Arc::clone(&instance);
            thread::spawn(move || {
                let table = PartyTable::new(n, base_port);
                let mut party = Participant::new(id, &table).unwrap();
                party.barrier().unwrap();
                let params = PublicParameters::init(n, m, 0, false).unwrap();
                let (a, b, c) = instance[id].clone();
                InnerProductVerifier::new(party, params).run(&a, &b, &c)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn two_element_known_values_verify() {
    let a = vec![GrElement::from_word(2), GrElement::from_word(3)];
    let b = a.clone();
    let instance = deal_instance(4, &a, &b, &GrElement::zero());
    // the opened value is the folded claim, so only success is checked
    for result in run_verification(6100, instance) {
        assert!(result.is_ok());
    }
}

#[test]
fn two_element_tampered_claim_fails() {
    let a = vec![GrElement::from_word(2), GrElement::from_word(3)];
    let b = a.clone();
    // claim becomes 14 instead of 13
    let instance = deal_instance(4, &a, &b, &GrElement::from_word(1));
    for result in run_verification(6110, instance) {
        assert!(matches!(result, Err(Error::VerificationFailed)));
    }
}

#[test]
fn random_vectors_verify() {
    let a = random_vector(16);
    let b = random_vector(16);
    let instance = deal_instance(4, &a, &b, &GrElement::zero());
    for result in run_verification(6120, instance) {
        assert!(result.is_ok());
    }
}

#[test]
fn negated_share_coefficient_fails() {
    let a = random_vector(16);
    let b = random_vector(16);
    let mut instance = deal_instance(4, &a, &b, &GrElement::zero());

    // negate one coefficient of party 2's share of a[5]
    let share = &mut instance[2].0[5];
    let mut coeffs: Vec<u64> = share.share.coeffs().to_vec();
    coeffs[3] = coeffs[3].wrapping_neg();
    *share = SecretShare::new(GrElement::from_coeffs(&coeffs).unwrap());

    for result in run_verification(6130, instance) {
        assert!(matches!(result, Err(Error::VerificationFailed)));
    }
}

#[test]
fn tampered_claim_fails_over_many_coin_tosses() {
    let mut failures = 0;
    for trial in 0..100_usize {
        let a = random_vector(4);
        let b = random_vector(4);
        let mut instance = deal_instance(4, &a, &b, &GrElement::zero());

        // flip one coefficient of one party's claim share
        let victim = trial % 4;
        let coeff = trial % 64;
        let mut coeffs: Vec<u64> = instance[victim].2.share.coeffs().to_vec();
        coeffs[coeff] ^= 1;
        instance[victim].2 = SecretShare::new(GrElement::from_coeffs(&coeffs).unwrap());

        let results = run_verification(20_000 + (trial as u16) * 8, instance);
        if results
            .iter()
            .all(|r| matches!(r, Err(Error::VerificationFailed)))
        {
            failures += 1;
        }
    }
    assert!(failures >= 99, "only {failures}/100 tampered runs failed");
}

#[test]
#[ignore = "slow: full 1024-element instance"]
fn large_instance_verifies() {
    let a = random_vector(1024);
    let b = random_vector(1024);
    let instance = deal_instance(4, &a, &b, &GrElement::zero());
    for result in run_verification(6150, instance) {
        assert!(result.is_ok());
    }
}

#[test]
#[ignore = "slow: full 1024-element instance"]
fn large_instance_tampered_share_fails() {
    let a = random_vector(1024);
    let b = random_vector(1024);
    let mut instance = deal_instance(4, &a, &b, &GrElement::zero());

    let share = &mut instance[1].0[700];
    let mut coeffs: Vec<u64> = share.share.coeffs().to_vec();
    coeffs[0] = coeffs[0].wrapping_neg();
    *share = SecretShare::new(GrElement::from_coeffs(&coeffs).unwrap());

    for result in run_verification(6160, instance) {
        assert!(matches!(result, Err(Error::VerificationFailed)));
    }
}

#[test]
fn mac_open_verifies_honest_and_catches_forgery() {
    let n = 4;
    let handles: Vec<_> = (0..n)
        .map(|id| {
            thread::spawn(move || {
                let table = PartyTable::new(n, 6200);
                let mut party = Participant::new(id, &table).unwrap();
                party.barrier().unwrap();
                let mut mac = MacScheme::new(party);

                let value = (id == 0).then(GrElement::one);
                let honest = mac.commit(value.as_ref(), 0).unwrap();
                let opened = mac.open_and_verify(&honest).unwrap();

                let value = (id == 0).then(GrElement::one);
                let second = mac.commit(value.as_ref(), 0).unwrap();
                let forged = if id == 2 {
                    let mut coeffs: Vec<u64> = second.mac.coeffs().to_vec();
                    coeffs[0] ^= 1;
                    AuthenticatedShare::new(
                        second.val.clone(),
                        GrElement::from_coeffs(&coeffs).unwrap(),
                    )
                } else {
                    second
                };
                let check = mac.open_and_verify(&forged);
                (opened, check)
            })
        })
        .collect();

    for handle in handles {
        let (opened, check) = handle.join().unwrap();
        assert_eq!(opened, GrElement::one());
        assert!(matches!(check, Err(Error::MacCheckFailed)));
    }
}

#[test]
fn oversized_broadcast_reassembles_at_every_peer() {
    let n = 4;
    let payload: String = "inner-product".chars().cycle().take(200 * 1024).collect();
    let expected = payload.clone();
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let payload = payload.clone();
            thread::spawn(move || {
                let table = PartyTable::new(n, 6210);
                let mut party = Participant::new(id, &table).unwrap();
                party.barrier().unwrap();
                if id == 0 {
                    party.broadcast(json!(payload), 1).unwrap();
                    None
                } else {
                    let got = party.receive_from(1, &[0]).unwrap();
                    Some(got[&0].as_str().unwrap().to_string())
                }
            })
        })
        .collect();

    for handle in handles {
        if let Some(received) = handle.join().unwrap() {
            assert_eq!(received, expected);
        }
    }
}

#[test]
fn interleaved_oversized_broadcasts_stay_separate() {
    let n = 4;
    let payload_zero: String = std::iter::repeat('a').take(90_000).collect();
    let payload_one: String = std::iter::repeat('b').take(110_000).collect();
    let expect_zero = payload_zero.clone();
    let expect_one = payload_one.clone();

    let handles: Vec<_> = (0..n)
        .map(|id| {
            let payload_zero = payload_zero.clone();
            let payload_one = payload_one.clone();
            thread::spawn(move || {
                let table = PartyTable::new(n, 6220);
                let mut party = Participant::new(id, &table).unwrap();
                party.barrier().unwrap();
                match id {
                    0 => {
                        party.broadcast(json!(payload_zero), 1).unwrap();
                        let got = party.receive_from(1, &[1]).unwrap();
                        vec![got[&1].as_str().unwrap().to_string()]
                    }
                    1 => {
                        party.broadcast(json!(payload_one), 1).unwrap();
                        let got = party.receive_from(1, &[0]).unwrap();
                        vec![got[&0].as_str().unwrap().to_string()]
                    }
                    _ => {
                        let got = party.receive_from(1, &[0, 1]).unwrap();
                        vec![
                            got[&0].as_str().unwrap().to_string(),
                            got[&1].as_str().unwrap().to_string(),
                        ]
                    }
                }
            })
        })
        .collect();

    for (id, handle) in handles.into_iter().enumerate() {
        let received = handle.join().unwrap();
        match id {
            0 => assert_eq!(received, vec![expect_one.clone()]),
            1 => assert_eq!(received, vec![expect_zero.clone()]),
            _ => assert_eq!(received, vec![expect_zero.clone(), expect_one.clone()]),
        }
    }
}

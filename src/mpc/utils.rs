use num_traits::Zero;
use rayon::prelude::*;
use serde_json::Value;

use crate::error::Error;
use crate::mpc::galois_ring::GrElement;
use crate::network::participant::Participant;

/// Inner product of two ring vectors, parallelised over rayon. Operands
/// must agree in length.
pub fn par_dot(a: &[GrElement], b: &[GrElement]) -> Result<GrElement, Error> {
    if a.len() != b.len() {
        return Err(Error::ShapeMismatch(format!(
            "inner-product operands disagree in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.par_iter()
        .zip(b.par_iter())
        .map(|(x, y)| x * y)
        .reduce(GrElement::zero, |acc, term| acc + term))
}

pub fn gr_to_value(element: &GrElement) -> Value {
    Value::String(element.to_base64())
}

pub fn gr_from_value(value: &Value) -> Result<GrElement, Error> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::BadFormat("expected a ring element string".into()))?;
    GrElement::from_base64(text)
}

pub fn gr_vec_to_value(elements: &[GrElement]) -> Value {
    Value::Array(elements.iter().map(gr_to_value).collect())
}

pub fn gr_vec_from_value(value: &Value) -> Result<Vec<GrElement>, Error> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::BadFormat("expected a ring element array".into()))?;
    items.iter().map(gr_from_value).collect()
}

/// Opens a shared value: broadcast the local share on `round`, sum it
/// with every peer's share.
pub fn open_sum(
    party: &mut Participant,
    share: &GrElement,
    round: u64,
) -> Result<GrElement, Error> {
    party.broadcast(gr_to_value(share), round)?;
    let mut total = share.clone();
    for (_, value) in party.receive_round(round)? {
        total = total + gr_from_value(&value)?;
    }
    Ok(total)
}

/// Fixes a public random ring element for all parties: party 0 samples
/// and broadcasts, everyone else adopts. With `odd_constant` the sample
/// is rejected until coefficient 0 is odd.
pub fn public_coin(
    party: &mut Participant,
    round: u64,
    odd_constant: bool,
) -> Result<GrElement, Error> {
    if party.node_id() == 0 {
        let mut r = GrElement::random();
        while odd_constant && r.coeff(0) % 2 == 0 {
            r = GrElement::random();
        }
        party.broadcast(gr_to_value(&r), round)?;
        Ok(r)
    } else {
        let incoming = party.receive_from(round, &[0])?;
        let value = incoming
            .get(&0)
            .ok_or_else(|| Error::Network("coin round returned without party 0".into()))?;
        gr_from_value(value)
    }
}

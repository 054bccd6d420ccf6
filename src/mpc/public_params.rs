use std::fmt;

use crate::error::Error;
use crate::network::common::PartyId;

/// Public protocol parameters shared by all parties.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicParameters {
    /// Number of parties.
    pub n: usize,

    /// Length of the committed/verified vectors; must be a power of two.
    pub vector_len: usize,

    /// Party that reconstructs the vectors and supplies the per-round
    /// proof values (and owns the offline vector).
    pub prover_id: PartyId,

    /// Log instead of raise when the offline MAC check fails.
    pub ignore_mac_check: bool,
}

impl PublicParameters {
    pub fn init(
        n: usize,
        vector_len: usize,
        prover_id: PartyId,
        ignore_mac_check: bool,
    ) -> Result<PublicParameters, Error> {
        if n == 0 {
            return Err(Error::ShapeMismatch("party count must be positive".into()));
        }
        if prover_id >= n {
            return Err(Error::ShapeMismatch(format!(
                "prover id {prover_id} out of range for {n} parties"
            )));
        }
        if vector_len == 0 || !vector_len.is_power_of_two() {
            return Err(Error::ShapeMismatch(format!(
                "vector length {vector_len} is not a power of two"
            )));
        }
        Ok(PublicParameters {
            n,
            vector_len,
            prover_id,
            ignore_mac_check,
        })
    }

    pub fn default() -> PublicParameters {
        PublicParameters {
            n: 4,
            vector_len: 1024,
            prover_id: 0,
            ignore_mac_check: false,
        }
    }
}

impl fmt::Display for PublicParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PublicParameters {{ n: {}, vector_len: {}, prover_id: {}, ignore_mac_check: {} }}",
            self.n, self.vector_len, self.prover_id, self.ignore_mac_check
        )
    }
}

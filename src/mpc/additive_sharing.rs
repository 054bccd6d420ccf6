use std::ops::{Add, Mul, Sub};

use nalgebra::DVector;
use num_traits::Zero;

use crate::mpc::galois_ring::GrElement;

/// One party's additive share of a ring element. Summing the shares of
/// all parties reconstructs the secret.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretShare {
    pub share: GrElement,
}

impl SecretShare {
    pub fn new(share: GrElement) -> Self {
        SecretShare { share }
    }

    pub fn random() -> Self {
        SecretShare {
            share: GrElement::random(),
        }
    }

    /// Multiplication by a public ring scalar.
    pub fn scalar_mul(&self, scalar: &GrElement) -> SecretShare {
        SecretShare {
            share: &self.share * scalar,
        }
    }
}

impl Add for SecretShare {
    type Output = SecretShare;

    fn add(self, rhs: SecretShare) -> SecretShare {
        SecretShare {
            share: self.share + rhs.share,
        }
    }
}

impl Sub for SecretShare {
    type Output = SecretShare;

    fn sub(self, rhs: SecretShare) -> SecretShare {
        SecretShare {
            share: self.share - rhs.share,
        }
    }
}

impl Mul<u64> for SecretShare {
    type Output = SecretShare;

    fn mul(self, rhs: u64) -> SecretShare {
        SecretShare {
            share: self.share * GrElement::from_word(rhs),
        }
    }
}

pub struct AdditiveSecretSharing;

impl AdditiveSecretSharing {
    /// Deals `num_shares` additive shares of `secret`: the first n-1 are
    /// uniform, the last absorbs the difference.
    pub fn share(secret: &GrElement, num_shares: usize) -> DVector<GrElement> {
        let mut shares = DVector::from_fn(num_shares, |i, _| {
            if i < num_shares - 1 {
                GrElement::random()
            } else {
                GrElement::zero()
            }
        });

        let sum = shares.sum();
        shares[num_shares - 1] = secret - &sum;
        shares
    }

    pub fn reveal(shares: &DVector<GrElement>) -> GrElement {
        shares.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_reveal() {
        for _ in 0..8 {
            let secret = GrElement::random();
            let num_shares = 5;

            let shares = AdditiveSecretSharing::share(&secret, num_shares);

            assert_eq!(shares.len(), num_shares);
            assert_eq!(AdditiveSecretSharing::reveal(&shares), secret);
        }
    }

    #[test]
    fn test_shares_combine_linearly() {
        let s1 = GrElement::random();
        let s2 = GrElement::random();
        let num_shares = 4;

        let shares1 = AdditiveSecretSharing::share(&s1, num_shares);
        let shares2 = AdditiveSecretSharing::share(&s2, num_shares);

        let combined = DVector::from_fn(num_shares, |i, _| &shares1[i] + &shares2[i]);
        assert_eq!(AdditiveSecretSharing::reveal(&combined), s1 + s2);
    }

    #[test]
    fn test_scalar_mul_tracks_secret() {
        let secret = GrElement::random();
        let scalar = GrElement::random();
        let num_shares = 4;

        let shares = AdditiveSecretSharing::share(&secret, num_shares);
        let scaled = DVector::from_fn(num_shares, |i, _| &shares[i] * &scalar);

        assert_eq!(AdditiveSecretSharing::reveal(&scaled), secret * scalar);
    }

    #[test]
    fn test_share_wrapper_ops() {
        let a = SecretShare::random();
        let b = SecretShare::random();

        let sum = a.clone() + b.clone();
        assert_eq!(sum.share, &a.share + &b.share);

        let diff = a.clone() - b.clone();
        assert_eq!(diff.share, &a.share - &b.share);

        let tripled = a.clone() * 3;
        assert_eq!(tripled.share, &a.share * &GrElement::from_word(3));
    }
}

use std::ops::{Add, Mul, Neg, Sub};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;

use crate::error::Error;
use crate::mpc::galois_ring::GrElement;

/// A scalar in Z_{2^64}, liftable into the Galois ring at coefficient 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Z2kElement {
    pub value: u64,
}

impl Z2kElement {
    pub fn new(value: u64) -> Self {
        Z2kElement { value }
    }

    pub fn random() -> Self {
        Z2kElement {
            value: rand::thread_rng().gen::<u64>(),
        }
    }

    /// Little-endian 8-byte encoding, base64-encoded.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.value.to_le_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::BadFormat(format!("word base64: {e}")))?;
        if bytes.len() != 8 {
            return Err(Error::BadFormat(format!(
                "word payload is {} bytes, expected 8",
                bytes.len()
            )));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes);
        Ok(Z2kElement {
            value: u64::from_le_bytes(word),
        })
    }
}

impl From<Z2kElement> for GrElement {
    fn from(word: Z2kElement) -> GrElement {
        GrElement::from_word(word.value)
    }
}

impl Add for Z2kElement {
    type Output = Z2kElement;

    fn add(self, rhs: Z2kElement) -> Z2kElement {
        Z2kElement {
            value: self.value.wrapping_add(rhs.value),
        }
    }
}

impl Sub for Z2kElement {
    type Output = Z2kElement;

    fn sub(self, rhs: Z2kElement) -> Z2kElement {
        Z2kElement {
            value: self.value.wrapping_sub(rhs.value),
        }
    }
}

impl Neg for Z2kElement {
    type Output = Z2kElement;

    fn neg(self) -> Z2kElement {
        Z2kElement {
            value: self.value.wrapping_neg(),
        }
    }
}

impl Mul for Z2kElement {
    type Output = Z2kElement;

    fn mul(self, rhs: Z2kElement) -> Z2kElement {
        Z2kElement {
            value: self.value.wrapping_mul(rhs.value),
        }
    }
}

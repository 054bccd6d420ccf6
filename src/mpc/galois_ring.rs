use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use num_traits::{One, Zero};
use rand::Rng;

use crate::error::Error;

/// Coefficient word width k of GR(2^k, d).
pub const RING_K: u32 = 64;
/// Extension degree d of GR(2^k, d).
pub const RING_D: usize = 64;

/// Reduction rule x^64 = x^4 + x^3 + x + 1: a high coefficient is folded
/// back in by adding it at these offsets from the base index.
const REDUCER_OFFSETS: [usize; 4] = [0, 1, 3, 4];

/// An element of GR(2^64, 64): a polynomial of degree < 64 with
/// coefficients in Z_{2^64}, reduced modulo x^64 - x^4 - x^3 - x - 1.
/// Immutable value type; every operation constructs a fresh element.
#[derive(Clone, PartialEq, Eq)]
pub struct GrElement {
    coeffs: [u64; RING_D],
}

impl GrElement {
    /// Builds an element from exactly `RING_D` coefficients.
    pub fn from_coeffs(coeffs: &[u64]) -> Result<Self, Error> {
        if coeffs.len() != RING_D {
            return Err(Error::ShapeMismatch(format!(
                "ring element needs {} coefficients, got {}",
                RING_D,
                coeffs.len()
            )));
        }
        let mut out = [0u64; RING_D];
        out.copy_from_slice(coeffs);
        Ok(GrElement { coeffs: out })
    }

    /// Embeds a word at coefficient 0, zeros elsewhere.
    pub fn from_word(value: u64) -> Self {
        let mut coeffs = [0u64; RING_D];
        coeffs[0] = value;
        GrElement { coeffs }
    }

    /// Samples every coefficient independently from a cryptographically
    /// strong source.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut coeffs = [0u64; RING_D];
        for c in coeffs.iter_mut() {
            *c = rng.gen::<u64>();
        }
        GrElement { coeffs }
    }

    pub fn coeff(&self, index: usize) -> u64 {
        self.coeffs[index]
    }

    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    /// Little-endian 8-byte encoding of each coefficient, concatenated,
    /// then base64-encoded.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(RING_D * 8);
        for c in &self.coeffs {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    /// Inverse of [`GrElement::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| Error::BadFormat(format!("ring element base64: {e}")))?;
        if bytes.len() != RING_D * 8 {
            return Err(Error::BadFormat(format!(
                "ring element payload is {} bytes, expected {}",
                bytes.len(),
                RING_D * 8
            )));
        }
        let mut coeffs = [0u64; RING_D];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            coeffs[i] = u64::from_le_bytes(word);
        }
        Ok(GrElement { coeffs })
    }
}

/// Schoolbook product into a length 2d-1 accumulator, then reduction from
/// the top index down: each non-zero high coefficient is added back at the
/// reducer offsets. All coefficient arithmetic wraps mod 2^64.
fn ring_mul(a: &[u64; RING_D], b: &[u64; RING_D]) -> [u64; RING_D] {
    let mut acc = [0u64; 2 * RING_D - 1];
    for i in 0..RING_D {
        let ai = a[i];
        if ai == 0 {
            continue;
        }
        for j in 0..RING_D {
            acc[i + j] = acc[i + j].wrapping_add(ai.wrapping_mul(b[j]));
        }
    }
    for i in (RING_D..2 * RING_D - 1).rev() {
        let c = acc[i];
        if c == 0 {
            continue;
        }
        let base = i - RING_D;
        for off in REDUCER_OFFSETS {
            acc[base + off] = acc[base + off].wrapping_add(c);
        }
    }
    let mut out = [0u64; RING_D];
    out.copy_from_slice(&acc[..RING_D]);
    out
}

impl Add<&GrElement> for &GrElement {
    type Output = GrElement;

    fn add(self, rhs: &GrElement) -> GrElement {
        let mut out = self.coeffs;
        for i in 0..RING_D {
            out[i] = out[i].wrapping_add(rhs.coeffs[i]);
        }
        GrElement { coeffs: out }
    }
}

impl Add for GrElement {
    type Output = GrElement;

    fn add(self, rhs: GrElement) -> GrElement {
        &self + &rhs
    }
}

impl AddAssign for GrElement {
    fn add_assign(&mut self, rhs: GrElement) {
        for i in 0..RING_D {
            self.coeffs[i] = self.coeffs[i].wrapping_add(rhs.coeffs[i]);
        }
    }
}

impl Sub<&GrElement> for &GrElement {
    type Output = GrElement;

    fn sub(self, rhs: &GrElement) -> GrElement {
        let mut out = self.coeffs;
        for i in 0..RING_D {
            out[i] = out[i].wrapping_sub(rhs.coeffs[i]);
        }
        GrElement { coeffs: out }
    }
}

impl Sub for GrElement {
    type Output = GrElement;

    fn sub(self, rhs: GrElement) -> GrElement {
        &self - &rhs
    }
}

impl SubAssign for GrElement {
    fn sub_assign(&mut self, rhs: GrElement) {
        for i in 0..RING_D {
            self.coeffs[i] = self.coeffs[i].wrapping_sub(rhs.coeffs[i]);
        }
    }
}

impl Neg for &GrElement {
    type Output = GrElement;

    fn neg(self) -> GrElement {
        let mut out = [0u64; RING_D];
        for i in 0..RING_D {
            out[i] = self.coeffs[i].wrapping_neg();
        }
        GrElement { coeffs: out }
    }
}

impl Neg for GrElement {
    type Output = GrElement;

    fn neg(self) -> GrElement {
        -&self
    }
}

impl Mul<&GrElement> for &GrElement {
    type Output = GrElement;

    fn mul(self, rhs: &GrElement) -> GrElement {
        GrElement {
            coeffs: ring_mul(&self.coeffs, &rhs.coeffs),
        }
    }
}

impl Mul for GrElement {
    type Output = GrElement;

    fn mul(self, rhs: GrElement) -> GrElement {
        &self * &rhs
    }
}

impl MulAssign for GrElement {
    fn mul_assign(&mut self, rhs: GrElement) {
        self.coeffs = ring_mul(&self.coeffs, &rhs.coeffs);
    }
}

impl Zero for GrElement {
    fn zero() -> Self {
        GrElement {
            coeffs: [0u64; RING_D],
        }
    }

    fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }
}

impl One for GrElement {
    fn one() -> Self {
        GrElement::from_word(1)
    }
}

impl fmt::Debug for GrElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GrElement(deg={}, [{}, {}, ...])",
            RING_D, self.coeffs[0], self.coeffs[1]
        )
    }
}

impl fmt::Display for GrElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

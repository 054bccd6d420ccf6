use thiserror::Error;

/// Protocol-level error taxonomy. Everything raised below the top-level
/// runner is one of these; intermediate layers may annotate but never
/// swallow the cryptographic-check variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Ring element of the wrong length, vector length not a power of two,
    /// or inner-product operands that disagree in length.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Base64 or JSON decoding failure, including a fragment reassembly
    /// that produced a non-JSON blob.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// The summed MAC differences after an opening were non-zero.
    #[error("mac check failed: sigma is non-zero after opening")]
    MacCheckFailed,

    /// The final verifier equation does not hold coefficient-wise.
    #[error("verification failed: opened claim does not match the product")]
    VerificationFailed,

    /// Underlying socket error other than the transient would-block case.
    #[error("network error: {0}")]
    Network(String),

    /// A receive loop exceeded its configured deadline.
    #[error("timed out waiting for round {0}")]
    Timeout(u64),
}

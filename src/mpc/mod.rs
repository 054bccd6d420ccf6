pub mod additive_sharing;
pub mod galois_ring;
pub mod mac_scheme;
pub mod preprocessing;
pub mod protocol;
pub mod public_params;
pub mod utils;
pub mod z2k;

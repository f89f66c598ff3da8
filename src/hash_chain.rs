//! Hash-chain revocation verification.
//!
//! An interface token commits to the tail of an iterated SHA-256 chain. A
//! revocation publishes an earlier chain element; verification walks the
//! chain forward and checks whether the committed token is reachable.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Default number of chain elements examined when matching a revocation.
pub const DEFAULT_CHAIN_DEPTH: usize = 20;

/// Returns true iff `committed` equals `candidate` or one of the first
/// `depth - 1` iterated SHA-256 hashes of `candidate`.
///
/// The equality check is constant-time; the chain walk itself is public.
pub fn verify(candidate: &[u8], committed: &[u8], depth: usize) -> bool {
    let mut current = candidate.to_vec();
    for _ in 0..depth {
        if current.ct_eq(committed).into() {
            return true;
        }
        current = Sha256::digest(&current).to_vec();
    }
    false
}

/// One application of the chain's hash function.
pub fn chain_step(element: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(element));
    out
}

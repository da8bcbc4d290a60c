//! Key material and the secure-channel capability.
//!
//! Key pairs are generated here; the symmetric handshake itself lives behind
//! [`SecureChannel`], which the connection holds but never implements.

pub mod channel;
pub mod keys;

pub use channel::{ChannelError, SecureChannel};
pub use keys::{IdentityKeyPair, KeyPair, SignedKeyPair};

use rand_core::{CryptoRng, RngCore};

use crate::error::SessionError;

/// Fills a fixed-size buffer from `rng`, surfacing entropy failures instead of
/// panicking.
pub(crate) fn random_array<const N: usize, R>(rng: &mut R) -> Result<[u8; N], SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut buf = [0u8; N];
    rng.try_fill_bytes(&mut buf)
        .map_err(|e| SessionError::EntropyFailure(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn random_vec<R>(rng: &mut R, len: usize) -> Result<Vec<u8>, SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut buf = vec![0u8; len];
    rng.try_fill_bytes(&mut buf)
        .map_err(|e| SessionError::EntropyFailure(e.to_string()))?;
    Ok(buf)
}

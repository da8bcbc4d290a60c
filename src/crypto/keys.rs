use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::random_array;
use crate::error::SessionError;

/// DJB key-type byte prepended to Curve25519 public keys before signing.
const DJB_KEY_TYPE: u8 = 0x05;

/// X25519 key pair used for the noise static key, prekeys and per-attempt
/// ephemeral keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    public: [u8; 32],
    private: [u8; 32],
}

impl KeyPair {
    /// Generates a fresh pair from `rng`.
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Self, SessionError> {
        let mut seed = random_array::<32, R>(rng)?;
        let pair = Self::from_private(seed);
        seed.zeroize();
        Ok(pair)
    }

    pub fn from_private(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            public: *public.as_bytes(),
            private: secret.to_bytes(),
        }
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn private(&self) -> &[u8; 32] {
        &self.private
    }

    /// Public key with the DJB type prefix, as it is signed and sent on the wire.
    pub fn prefixed_public(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = DJB_KEY_TYPE;
        out[1..].copy_from_slice(&self.public);
        out
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

/// Ed25519 identity key pair; signs prekeys and identifies the device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    public: [u8; 32],
    private: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Self, SessionError> {
        let mut seed = random_array::<32, R>(rng)?;
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self {
            public: signing.verifying_key().to_bytes(),
            private: signing.to_bytes(),
        })
    }

    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.private).sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_with(&self.public, message, signature)
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .field("private", &"<redacted>")
            .finish()
    }
}

fn verify_with(public: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    match Signature::from_slice(signature) {
        Ok(sig) => verifying.verify(message, &sig).is_ok(),
        Err(_) => false,
    }
}

/// Prekey signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedKeyPair {
    pub key_pair: KeyPair,
    pub signature: Vec<u8>,
    pub key_id: u32,
}

impl SignedKeyPair {
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(
        identity: &IdentityKeyPair,
        key_id: u32,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        let key_pair = KeyPair::generate(rng)?;
        let signature = identity.sign(&key_pair.prefixed_public()).to_vec();
        Ok(Self {
            key_pair,
            signature,
            key_id,
        })
    }

    /// Checks the signature against the identity public key.
    pub fn verify(&self, identity_public: &[u8; 32]) -> bool {
        verify_with(
            identity_public,
            &self.key_pair.prefixed_public(),
            &self.signature,
        )
    }
}

//! Long-lived identity record and its bootstrap.
//!
//! [`init_credentials`] produces everything an identity needs before its first
//! handshake. Nothing here touches the network or storage; persisting the record
//! is the caller's job.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::crypto::{random_array, IdentityKeyPair, KeyPair, SignedKeyPair};
use crate::error::SessionError;

/// Smallest registration id the service accepts.
pub const MIN_REGISTRATION_ID: u16 = 1;
/// Largest registration id the service accepts.
pub const MAX_REGISTRATION_ID: u16 = 16_380;

const FIRST_SIGNED_PRE_KEY_ID: u32 = 1;

/// Credentials shared between the pairing flow and connection attempts.
pub type SharedCredentials = Arc<Mutex<AuthenticationCredentials>>;

/// Account the device is linked to (or provisionally claims during pairing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub unarchive_chats: bool,
}

/// Identity record for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationCredentials {
    pub noise_key: KeyPair,
    pub pairing_ephemeral_key_pair: KeyPair,
    pub signed_identity_key: IdentityKeyPair,
    pub signed_pre_key: SignedKeyPair,
    pub registration_id: u16,
    /// Base64 of 32 random bytes.
    pub adv_secret_key: String,
    pub me: Option<Contact>,
    pub pairing_code: Option<String>,
    pub processed_history_messages: Vec<String>,
    pub next_pre_key_id: u32,
    pub first_unuploaded_pre_key_id: u32,
    pub account_sync_counter: u32,
    pub account_settings: AccountSettings,
    pub registered: bool,
    pub last_prop_hash: Option<String>,
    pub routing_info: Option<Vec<u8>>,
}

impl AuthenticationCredentials {
    /// Records the server's confirmation that the device is linked to `me`.
    ///
    /// Clears the pairing code; it is meaningless once registration completes.
    pub fn complete_registration(&mut self, me: Contact) {
        self.me = Some(me);
        self.registered = true;
        self.pairing_code = None;
    }

    /// Whether the record satisfies the registration invariant.
    pub fn is_consistent(&self) -> bool {
        if self.registered {
            self.me.is_some() && self.pairing_code.is_none()
        } else {
            true
        }
    }

    pub fn into_shared(self) -> SharedCredentials {
        Arc::new(Mutex::new(self))
    }
}

/// Generates a fresh identity from the OS CSPRNG.
pub fn init_credentials() -> Result<AuthenticationCredentials, SessionError> {
    init_credentials_with(&mut OsRng)
}

/// Generates a fresh identity from `rng`.
///
/// Every key pair draws its own randomness; an `rng` that fails yields
/// [`SessionError::EntropyFailure`] and no partial record.
pub fn init_credentials_with<R>(rng: &mut R) -> Result<AuthenticationCredentials, SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let signed_identity_key = IdentityKeyPair::generate(rng)?;
    let signed_pre_key = SignedKeyPair::generate(&signed_identity_key, FIRST_SIGNED_PRE_KEY_ID, rng)?;
    let adv_secret = random_array::<32, R>(rng)?;

    Ok(AuthenticationCredentials {
        noise_key: KeyPair::generate(rng)?,
        pairing_ephemeral_key_pair: KeyPair::generate(rng)?,
        signed_identity_key,
        signed_pre_key,
        registration_id: generate_registration_id(rng)?,
        adv_secret_key: STANDARD.encode(adv_secret),
        me: None,
        pairing_code: None,
        processed_history_messages: Vec::new(),
        next_pre_key_id: 1,
        first_unuploaded_pre_key_id: 1,
        account_sync_counter: 0,
        account_settings: AccountSettings::default(),
        registered: false,
        last_prop_hash: None,
        routing_info: None,
    })
}

/// Uniform draw from `MIN_REGISTRATION_ID..=MAX_REGISTRATION_ID`.
fn generate_registration_id<R>(rng: &mut R) -> Result<u16, SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    // 14-bit candidates with rejection keep the draw unbiased.
    loop {
        let candidate = u16::from_be_bytes(random_array::<2, R>(rng)?) & 0x3fff;
        if (MIN_REGISTRATION_ID..=MAX_REGISTRATION_ID).contains(&candidate) {
            return Ok(candidate);
        }
    }
}

//! Pairing-code and session-id issuance for linking a device out of band.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};

use crate::credentials::{Contact, SharedCredentials};
use crate::crypto::{random_array, random_vec};
use crate::error::SessionError;
use crate::events::{EventEmitter, SessionEvent};

/// Symbols a pairing code is drawn from: no `0`, `I`, `O` or `U`.
pub const PAIRING_ALPHABET: &[u8; 32] = b"123456789ABCDEFGHJKLMNPQRSTVWXYZ";
pub const PAIRING_CODE_LEN: usize = 8;
/// Random bytes behind the session-id suffix (24 base64url characters).
const SESSION_SUFFIX_BYTES: usize = 18;
/// Placeholder display name while the link is unconfirmed.
const PROVISIONAL_NAME: &str = "~";

/// One-shot result of a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSession {
    pub code: String,
    /// `{brand}~{code}#{suffix}`; not retained anywhere else.
    pub session_id: String,
}

/// Prepares `credentials` for a registration attempt linked to `phone`.
///
/// A non-empty `custom_code` is taken verbatim; an empty one counts as absent.
/// The session id always gets fresh entropy,
/// so reusing a code never makes the id guessable.
pub fn issue_pairing_code(
    credentials: &SharedCredentials,
    events: &EventEmitter,
    brand: &str,
    phone: &str,
    custom_code: Option<&str>,
) -> Result<PairingSession, SessionError> {
    issue_pairing_code_with(&mut OsRng, credentials, events, brand, phone, custom_code)
}

pub fn issue_pairing_code_with<R>(
    rng: &mut R,
    credentials: &SharedCredentials,
    events: &EventEmitter,
    brand: &str,
    phone: &str,
    custom_code: Option<&str>,
) -> Result<PairingSession, SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let code = match custom_code {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => generate_pairing_code(rng)?,
    };
    let suffix = URL_SAFE_NO_PAD.encode(random_vec(rng, SESSION_SUFFIX_BYTES)?);
    let session_id = format!("{brand}~{code}#{suffix}");

    let snapshot = {
        let mut creds = credentials.lock();
        if creds.registered {
            return Err(SessionError::AlreadyRegistered);
        }
        creds.pairing_code = Some(code.clone());
        creds.me = Some(Contact {
            id: phone.to_string(),
            name: Some(PROVISIONAL_NAME.to_string()),
        });
        creds.clone()
    };
    events.emit(SessionEvent::CredentialsUpdated(Box::new(snapshot)));
    tracing::info!(phone, "pairing code issued");

    Ok(PairingSession { code, session_id })
}

/// Draws [`PAIRING_CODE_LEN`] symbols from [`PAIRING_ALPHABET`].
pub fn generate_pairing_code<R>(rng: &mut R) -> Result<String, SessionError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let raw = random_array::<PAIRING_CODE_LEN, R>(rng)?;
    // 256 is a multiple of the alphabet size, so the modulo stays uniform.
    Ok(raw
        .iter()
        .map(|b| PAIRING_ALPHABET[(*b as usize) % PAIRING_ALPHABET.len()] as char)
        .collect())
}
